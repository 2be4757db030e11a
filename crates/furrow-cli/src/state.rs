//! Run state kept next to the outputs.

use furrow_core::{SavedState, StateError, StateStore};
use std::path::{Path, PathBuf};

/// File name of the saved state inside an output directory.
pub const STATE_FILE: &str = "furrow-state.json";

/// Stores [`SavedState`] as pretty JSON.
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    /// Store inside an output directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(STATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonStateStore {
    fn load_previous_state(&self) -> Result<Option<SavedState>, StateError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| StateError::Encode(e.to_string()))
    }

    fn save_state(&self, state: &SavedState) -> Result<(), StateError> {
        let data =
            serde_json::to_vec_pretty(state).map_err(|e| StateError::Encode(e.to_string()))?;
        // replace atomically
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

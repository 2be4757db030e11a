//! Persistence of a run's settings and lookup caches.
//!
//! The pipeline only hands state to a [`StateStore`] and takes it back; the
//! store decides the format.

use crate::settings::Settings;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode state: {0}")]
    Encode(String),

    #[error("state store is poisoned")]
    Poisoned,
}

/// Everything needed to continue work on the same input later.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedState {
    /// Where the input came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    /// Input had a header row.
    #[serde(default)]
    pub has_header: bool,

    /// Input field delimiter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<char>,

    #[serde(default)]
    pub settings: Settings,

    /// Lookup caches by name, each mapping input value to results.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub caches: IndexMap<String, IndexMap<String, Vec<String>>>,
}

/// Loads and stores [`SavedState`].
pub trait StateStore {
    fn load_previous_state(&self) -> Result<Option<SavedState>, StateError>;

    fn save_state(&self, state: &SavedState) -> Result<(), StateError>;
}

/// Keeps state in memory.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<SavedState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load_previous_state(&self) -> Result<Option<SavedState>, StateError> {
        Ok(self.state.lock().map_err(|_| StateError::Poisoned)?.clone())
    }

    fn save_state(&self, state: &SavedState) -> Result<(), StateError> {
        *self.state.lock().map_err(|_| StateError::Poisoned)? = Some(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldRequest;

    #[test]
    fn test_memory_store() {
        let store = MemoryStateStore::new();
        assert!(store.load_previous_state().unwrap().is_none());

        let mut state = SavedState {
            input: Some("flows.csv".into()),
            has_header: true,
            settings: Settings::new().field(FieldRequest::new("country")),
            ..Default::default()
        };
        state
            .caches
            .entry("country".into())
            .or_default()
            .insert("1.2.3.4".into(), vec!["cz".into()]);
        store.save_state(&state).unwrap();

        assert_eq!(store.load_previous_state().unwrap(), Some(state));
    }

    #[test]
    fn test_state_json_shape() {
        let state = SavedState::default();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["has_header"], false);
        assert!(json.get("caches").is_none());

        let parsed: SavedState = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, state);
    }
}

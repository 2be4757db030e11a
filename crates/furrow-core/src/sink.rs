//! Output sinks: where routed rows end up.

use indexmap::IndexMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid location name: {0:?}")]
    InvalidLocation(String),

    #[error("sink state is poisoned")]
    Poisoned,
}

/// How a location is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Start fresh, discarding earlier content.
    Create,
    /// Keep earlier content.
    Append,
}

/// An open output location.
pub trait RowWriter: Send {
    fn write_row(&mut self, cells: &[String]) -> Result<(), SinkError>;

    /// Flush and release the handle.
    fn close(self: Box<Self>) -> Result<(), SinkError>;
}

/// Destination for routed rows, one stream per location.
///
/// A location may be reopened after it was closed.
pub trait OutputSink: Send + Sync {
    fn open(&self, location: &str, mode: OpenMode) -> Result<Box<dyn RowWriter>, SinkError>;

    /// Take every row of a location (header included) and remove it.
    fn drain(&self, location: &str) -> Result<Vec<Vec<String>>, SinkError>;
}

fn check_location(location: &str) -> Result<(), SinkError> {
    let bad = location.is_empty()
        || location.starts_with('.')
        || location.contains(['/', '\\'])
        || location.contains('\0');
    if bad {
        return Err(SinkError::InvalidLocation(location.to_string()));
    }
    Ok(())
}

type Store = Arc<Mutex<IndexMap<String, Vec<Vec<String>>>>>;

/// In-memory sink. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    store: Store,
    opens: Arc<Mutex<Vec<(String, OpenMode)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows written to a location so far.
    pub fn rows(&self, location: &str) -> Vec<Vec<String>> {
        self.store
            .lock()
            .map(|store| store.get(location).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Locations in first-write order.
    pub fn locations(&self) -> Vec<String> {
        self.store
            .lock()
            .map(|store| store.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every `open` call made so far.
    pub fn opens(&self) -> Vec<(String, OpenMode)> {
        self.opens.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

impl OutputSink for MemorySink {
    fn open(&self, location: &str, mode: OpenMode) -> Result<Box<dyn RowWriter>, SinkError> {
        check_location(location)?;
        {
            let mut store = self.store.lock().map_err(|_| SinkError::Poisoned)?;
            let rows = store.entry(location.to_string()).or_default();
            if mode == OpenMode::Create {
                rows.clear();
            }
        }
        self.opens
            .lock()
            .map_err(|_| SinkError::Poisoned)?
            .push((location.to_string(), mode));

        Ok(Box::new(MemoryWriter {
            location: location.to_string(),
            store: Arc::clone(&self.store),
        }))
    }

    fn drain(&self, location: &str) -> Result<Vec<Vec<String>>, SinkError> {
        let mut store = self.store.lock().map_err(|_| SinkError::Poisoned)?;
        Ok(store.shift_remove(location).unwrap_or_default())
    }
}

struct MemoryWriter {
    location: String,
    store: Store,
}

impl RowWriter for MemoryWriter {
    fn write_row(&mut self, cells: &[String]) -> Result<(), SinkError> {
        let mut store = self.store.lock().map_err(|_| SinkError::Poisoned)?;
        store
            .entry(self.location.clone())
            .or_default()
            .push(cells.to_vec());
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), SinkError> {
        Ok(())
    }
}

/// One `<location>.csv` file per location inside a directory.
#[derive(Debug, Clone)]
pub struct CsvDirectorySink {
    dir: PathBuf,
    delimiter: u8,
}

impl CsvDirectorySink {
    /// Create the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            delimiter: b',',
        })
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing a location.
    pub fn path_for(&self, location: &str) -> PathBuf {
        self.dir.join(format!("{location}.csv"))
    }
}

impl OutputSink for CsvDirectorySink {
    fn open(&self, location: &str, mode: OpenMode) -> Result<Box<dyn RowWriter>, SinkError> {
        check_location(location)?;
        let path = self.path_for(location);
        let file = match mode {
            OpenMode::Create => File::create(&path)?,
            OpenMode::Append => OpenOptions::new().create(true).append(true).open(&path)?,
        };
        tracing::trace!(path = %path.display(), ?mode, "opened output");

        let writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .from_writer(file);
        Ok(Box::new(CsvRowWriter { writer }))
    }

    fn drain(&self, location: &str) -> Result<Vec<Vec<String>>, SinkError> {
        check_location(location)?;
        let path = self.path_for(location);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_path(&path)?;
        let rows = reader
            .records()
            .map(|record| record.map(|r| r.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>, _>>()?;
        drop(reader);

        fs::remove_file(&path)?;
        Ok(rows)
    }
}

struct CsvRowWriter {
    writer: csv::Writer<File>,
}

impl RowWriter for CsvRowWriter {
    fn write_row(&mut self, cells: &[String]) -> Result<(), SinkError> {
        self.writer.write_record(cells)?;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

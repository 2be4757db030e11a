//! Output locations and the bounded pool of open handles.

use crate::sink::{OpenMode, OutputSink, RowWriter, SinkError};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Default cap on simultaneously open locations.
pub const DEFAULT_MAX_OPEN: usize = 1000;

/// Where rows that could not be fully processed are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quarantine {
    /// Computation failed.
    Invalid,
    /// A lookup could not classify the value; may succeed later.
    Unknown,
    /// An external service asked to back off.
    Deferred,
}

impl Quarantine {
    pub const ALL: [Quarantine; 3] = [Quarantine::Invalid, Quarantine::Unknown, Quarantine::Deferred];

    /// Location name. Split values can never produce it.
    pub fn location(self) -> &'static str {
        match self {
            Quarantine::Invalid => "_invalid",
            Quarantine::Unknown => "_unknown",
            Quarantine::Deferred => "_deferred",
        }
    }
}

impl fmt::Display for Quarantine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Quarantine::Invalid => "invalid",
            Quarantine::Unknown => "unknown",
            Quarantine::Deferred => "deferred",
        })
    }
}

impl FromStr for Quarantine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quarantine::ALL
            .into_iter()
            .find(|q| q.to_string() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("unknown quarantine {s:?} (expected invalid, unknown or deferred)"))
    }
}

/// Destination of a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    Output(String),
    Quarantine(Quarantine),
}

impl Location {
    /// Location for a split-column value, or `None` if nothing usable is left.
    pub fn from_split_value(value: &str) -> Option<Self> {
        let name = sanitize(value);
        (!name.is_empty()).then_some(Location::Output(name))
    }

    pub fn name(&self) -> &str {
        match self {
            Location::Output(name) => name,
            Location::Quarantine(q) => q.location(),
        }
    }
}

/// Turn a cell value into a safe location name.
///
/// Characters outside `[A-Za-z0-9 ._-]` become `_`; leading `_` and `.`
/// are stripped so a value never names a quarantine or a hidden file.
pub fn sanitize(value: &str) -> String {
    let replaced: String = value
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    replaced
        .trim_start_matches(['_', '.'])
        .trim()
        .to_string()
}

/// Bounded pool of open output handles, least recently used evicted first.
///
/// Every location remembers whether it was written before, so a reopen
/// after eviction appends instead of starting over and never repeats the
/// header.
pub struct OutputRouter {
    sink: Arc<dyn OutputSink>,
    max_open: usize,
    open: IndexMap<String, Box<dyn RowWriter>>,
    seen: IndexSet<String>,
    evictions: u64,
}

impl OutputRouter {
    pub fn new(sink: Arc<dyn OutputSink>, max_open: usize) -> Self {
        Self {
            sink,
            max_open: max_open.max(1),
            open: IndexMap::new(),
            seen: IndexSet::new(),
            evictions: 0,
        }
    }

    pub fn sink(&self) -> &Arc<dyn OutputSink> {
        &self.sink
    }

    /// Write a row, opening the location first if needed.
    ///
    /// `header` is written only when the location is created.
    pub fn write(&mut self, location: &str, header: &[String], row: &[String]) -> Result<(), SinkError> {
        let writer = self.writer(location, header)?;
        writer.write_row(row)
    }

    fn writer(&mut self, location: &str, header: &[String]) -> Result<&mut Box<dyn RowWriter>, SinkError> {
        if let Some((name, writer)) = self.open.shift_remove_entry(location) {
            // most recently used lives at the back
            self.open.insert(name, writer);
        } else {
            if self.open.len() >= self.max_open
                && let Some((evicted, writer)) = self.open.shift_remove_index(0)
            {
                tracing::trace!(location = %evicted, "evicting output handle");
                self.evictions += 1;
                writer.close()?;
            }

            let mode = if self.seen.contains(location) {
                OpenMode::Append
            } else {
                OpenMode::Create
            };
            let mut writer = self.sink.open(location, mode)?;
            if mode == OpenMode::Create && !header.is_empty() {
                writer.write_row(header)?;
            }
            self.seen.insert(location.to_string());
            self.open.insert(location.to_string(), writer);
        }

        self.open
            .get_mut(location)
            .ok_or_else(|| SinkError::InvalidLocation(location.to_string()))
    }

    /// Close one location and forget it was ever written.
    ///
    /// Used before a location is drained for reprocessing.
    pub fn forget(&mut self, location: &str) -> Result<(), SinkError> {
        self.seen.shift_remove(location);
        match self.open.shift_remove(location) {
            Some(writer) => writer.close(),
            None => Ok(()),
        }
    }

    /// Mark a location as written by an earlier run; the next write appends.
    pub fn assume_written(&mut self, location: &str) {
        self.seen.insert(location.to_string());
    }

    /// Close every open handle. All handles are closed even if one fails.
    pub fn close_all(&mut self) -> Result<(), SinkError> {
        let mut first_err = None;
        for (location, writer) in self.open.drain(..) {
            if let Err(err) = writer.close() {
                tracing::error!(location = %location, error = %err, "failed to close output");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Locations written so far, in first-write order.
    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.seen.iter().map(String::as_str)
    }

    pub fn was_written(&self, location: &str) -> bool {
        self.seen.contains(location)
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }
}

impl Drop for OutputRouter {
    fn drop(&mut self) {
        if let Err(err) = self.close_all() {
            tracing::error!(error = %err, "failed to close outputs on drop");
        }
    }
}

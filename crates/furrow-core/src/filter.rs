//! Row filters and uniqueness constraints.

use crate::field::ColumnRef;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A test applied to a single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Exact value.
    Eq(String),
    /// Cell contains the text.
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    /// Value is one of these.
    OneOf(Vec<String>),
    /// Numeric greater than.
    Gt(f64),
    /// Numeric less than.
    Lt(f64),
}

impl Predicate {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Predicate::Eq(expected) => value == expected,
            Predicate::Contains(s) => value.contains(s.as_str()),
            Predicate::StartsWith(s) => value.starts_with(s.as_str()),
            Predicate::EndsWith(s) => value.ends_with(s.as_str()),
            Predicate::OneOf(values) => values.iter().any(|v| v == value),
            Predicate::Gt(n) => parse_number(value).is_some_and(|v| v > *n),
            Predicate::Lt(n) => parse_number(value).is_some_and(|v| v < *n),
        }
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse().ok()
}

/// Keep or drop matching rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[default]
    Include,
    Exclude,
}

/// A row filter on one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: ColumnRef,
    #[serde(default)]
    pub mode: FilterMode,
    pub predicate: Predicate,
}

impl Filter {
    /// Keep only rows whose column equals `value`.
    pub fn include(column: impl Into<ColumnRef>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            mode: FilterMode::Include,
            predicate: Predicate::Eq(value.into()),
        }
    }

    /// Drop rows whose column equals `value`.
    pub fn exclude(column: impl Into<ColumnRef>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            mode: FilterMode::Exclude,
            predicate: Predicate::Eq(value.into()),
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    /// Check whether a cell lets its row through.
    pub fn passes(&self, value: &str) -> bool {
        match self.mode {
            FilterMode::Include => self.predicate.matches(value),
            FilterMode::Exclude => !self.predicate.matches(value),
        }
    }
}

/// Values claimed by one row, so they can be handed back.
pub type Claims = Vec<(usize, String)>;

/// Seen values per unique-constrained column.
///
/// A row is admitted only if none of its constrained values were seen
/// before; its values are then remembered all at once.
#[derive(Debug, Default)]
pub struct UniqueSets {
    seen: HashMap<usize, HashSet<String>>,
}

impl UniqueSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a row. `columns` are positions into `row`.
    ///
    /// Returns the claimed values, or `None` if the row is a duplicate.
    pub fn claim(&mut self, columns: &[usize], row: &[String]) -> Option<Claims> {
        let values: Claims = columns
            .iter()
            .map(|&col| (col, row.get(col).cloned().unwrap_or_default()))
            .collect();

        let duplicate = values
            .iter()
            .any(|(col, value)| self.seen.get(col).is_some_and(|set| set.contains(value)));
        if duplicate {
            return None;
        }

        for (col, value) in &values {
            self.seen.entry(*col).or_default().insert(value.clone());
        }
        Some(values)
    }

    /// Forget values claimed by a row that did not make it to an output.
    pub fn release(&mut self, claims: &Claims) {
        for (col, value) in claims {
            if let Some(set) = self.seen.get_mut(col) {
                set.remove(value);
            }
        }
    }

    pub fn len(&self, column: usize) -> usize {
        self.seen.get(&column).map_or(0, HashSet::len)
    }
}

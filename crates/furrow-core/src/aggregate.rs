//! Streaming aggregation.
//!
//! Each [`Accumulator`] is a small fold: `update(value)` returns the running
//! result. [`Aggregation`] keeps one accumulator per location, group and
//! requested function, plus a `total` group when grouping is active.

use crate::field::ColumnRef;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Label of the total row in grouped output.
pub const TOTAL_LABEL: &str = "total";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AggregateError {
    #[error("{function} needs a number, got {value:?}")]
    NotANumber {
        function: AggregateFn,
        value: String,
    },

    #[error("unknown aggregate function: {0}")]
    UnknownFunction(String),
}

/// Aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFn {
    Count,
    Sum,
    #[serde(alias = "average")]
    Avg,
    Min,
    Max,
    List,
    Set,
}

impl AggregateFn {
    pub const ALL: [AggregateFn; 7] = [
        AggregateFn::Count,
        AggregateFn::Sum,
        AggregateFn::Avg,
        AggregateFn::Min,
        AggregateFn::Max,
        AggregateFn::List,
        AggregateFn::Set,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
            AggregateFn::List => "list",
            AggregateFn::Set => "set",
        }
    }

    /// Check if this function only accepts numbers.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            AggregateFn::Sum | AggregateFn::Avg | AggregateFn::Min | AggregateFn::Max
        )
    }
}

impl fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggregateFn {
    type Err = AggregateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s == "average" {
            return Ok(AggregateFn::Avg);
        }
        AggregateFn::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or(AggregateError::UnknownFunction(s))
    }
}

/// Running state of one aggregate function.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Count(u64),
    Sum(f64),
    Avg { sum: f64, count: u64 },
    Min(Option<f64>),
    Max(Option<f64>),
    List(Vec<String>),
    Set(IndexSet<String>),
}

impl Accumulator {
    pub fn new(function: AggregateFn) -> Self {
        match function {
            AggregateFn::Count => Accumulator::Count(0),
            AggregateFn::Sum => Accumulator::Sum(0.0),
            AggregateFn::Avg => Accumulator::Avg { sum: 0.0, count: 0 },
            AggregateFn::Min => Accumulator::Min(None),
            AggregateFn::Max => Accumulator::Max(None),
            AggregateFn::List => Accumulator::List(Vec::new()),
            AggregateFn::Set => Accumulator::Set(IndexSet::new()),
        }
    }

    pub fn function(&self) -> AggregateFn {
        match self {
            Accumulator::Count(_) => AggregateFn::Count,
            Accumulator::Sum(_) => AggregateFn::Sum,
            Accumulator::Avg { .. } => AggregateFn::Avg,
            Accumulator::Min(_) => AggregateFn::Min,
            Accumulator::Max(_) => AggregateFn::Max,
            Accumulator::List(_) => AggregateFn::List,
            Accumulator::Set(_) => AggregateFn::Set,
        }
    }

    /// Check a value without touching any state.
    pub fn validate(function: AggregateFn, value: &str) -> Result<(), AggregateError> {
        if function.is_numeric() {
            number(function, value)?;
        }
        Ok(())
    }

    /// Feed one value and return the running result.
    pub fn update(&mut self, value: &str) -> Result<String, AggregateError> {
        let function = self.function();
        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::Sum(sum) => *sum += number(function, value)?,
            Accumulator::Avg { sum, count } => {
                *sum += number(function, value)?;
                *count += 1;
            }
            Accumulator::Min(min) => {
                let v = number(function, value)?;
                *min = Some(min.map_or(v, |m| m.min(v)));
            }
            Accumulator::Max(max) => {
                let v = number(function, value)?;
                *max = Some(max.map_or(v, |m| m.max(v)));
            }
            Accumulator::List(items) => items.push(value.to_string()),
            Accumulator::Set(items) => {
                items.insert(value.to_string());
            }
        }
        Ok(self.result())
    }

    /// Display form of the current result.
    ///
    /// Sums and averages are rounded to 2 decimals; full precision is kept.
    pub fn result(&self) -> String {
        match self {
            Accumulator::Count(n) => n.to_string(),
            Accumulator::Sum(sum) => format_number(round2(*sum)),
            Accumulator::Avg { sum, count } => {
                if *count == 0 {
                    String::new()
                } else {
                    format_number(round2(sum / *count as f64))
                }
            }
            Accumulator::Min(v) | Accumulator::Max(v) => v.map(format_number).unwrap_or_default(),
            Accumulator::List(items) => serde_json::to_string(items).unwrap_or_default(),
            Accumulator::Set(items) => serde_json::to_string(items).unwrap_or_default(),
        }
    }
}

fn number(function: AggregateFn, value: &str) -> Result<f64, AggregateError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| AggregateError::NotANumber {
            function,
            value: value.to_string(),
        })
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

/// A requested aggregate: function applied to a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub function: AggregateFn,
    pub column: ColumnRef,
}

impl AggregateSpec {
    pub fn new(function: AggregateFn, column: impl Into<ColumnRef>) -> Self {
        Self {
            function,
            column: column.into(),
        }
    }
}

/// A compiled aggregate column: function, position in the output row, label.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateColumn {
    pub function: AggregateFn,
    pub index: usize,
    pub name: String,
}

/// Grouped aggregation state for every output location.
#[derive(Debug, Clone)]
pub struct Aggregation {
    group_by: Option<(usize, String)>,
    columns: Vec<AggregateColumn>,
    with_total: bool,
    state: IndexMap<String, IndexMap<Option<String>, Vec<Accumulator>>>,
}

impl Aggregation {
    /// `group_by` is the grouping column's position and header name.
    pub fn new(group_by: Option<(usize, String)>, columns: Vec<AggregateColumn>) -> Self {
        let only_lists = columns.iter().all(|c| c.function == AggregateFn::List);
        let with_total = group_by.is_some() && !only_lists;
        Self {
            group_by,
            columns,
            with_total,
            state: IndexMap::new(),
        }
    }

    pub fn columns(&self) -> &[AggregateColumn] {
        &self.columns
    }

    pub fn is_grouped(&self) -> bool {
        self.group_by.is_some()
    }

    /// Whether a total row is kept next to the named groups.
    pub fn has_total(&self) -> bool {
        self.with_total
    }

    /// Header of the flushed rows.
    pub fn header(&self) -> Vec<String> {
        self.group_by
            .iter()
            .map(|(_, name)| name.clone())
            .chain(
                self.columns
                    .iter()
                    .map(|c| format!("{}({})", c.function, c.name)),
            )
            .collect()
    }

    fn values<'r>(&self, row: &'r [String]) -> Vec<&'r str> {
        self.columns
            .iter()
            .map(|c| row.get(c.index).map_or("", String::as_str))
            .collect()
    }

    /// Check a row without touching any state.
    pub fn validate(&self, row: &[String]) -> Result<(), AggregateError> {
        for (column, value) in self.columns.iter().zip(self.values(row)) {
            Accumulator::validate(column.function, value)?;
        }
        Ok(())
    }

    /// Feed a row routed to `location`.
    ///
    /// Every value is checked first, so a bad row leaves no partial update.
    pub fn update(&mut self, location: &str, row: &[String]) -> Result<(), AggregateError> {
        self.validate(row)?;
        let values = self.values(row);

        let group = self
            .group_by
            .as_ref()
            .map(|(idx, _)| row.get(*idx).cloned().unwrap_or_default());

        let groups = self.state.entry(location.to_string()).or_default();
        let mut keys = vec![group];
        if self.with_total {
            keys.push(None);
        }
        for key in keys {
            let accumulators = groups.entry(key).or_insert_with(|| {
                self.columns
                    .iter()
                    .map(|c| Accumulator::new(c.function))
                    .collect()
            });
            for (acc, value) in accumulators.iter_mut().zip(&values) {
                acc.update(value)?;
            }
        }
        Ok(())
    }

    /// Final rows per location: one per group, the total row last.
    pub fn finish(&self) -> IndexMap<String, Vec<Vec<String>>> {
        self.state
            .iter()
            .map(|(location, groups)| {
                let mut rows: Vec<Vec<String>> = groups
                    .iter()
                    .filter(|(key, _)| key.is_some() || !self.is_grouped())
                    .map(|(key, accs)| self.render(key.as_deref(), accs))
                    .collect();
                if self.is_grouped()
                    && let Some(total) = groups.get(&None)
                {
                    rows.push(self.render(Some(TOTAL_LABEL), total));
                }
                (location.clone(), rows)
            })
            .collect()
    }

    fn render(&self, group: Option<&str>, accumulators: &[Accumulator]) -> Vec<String> {
        let label = self.is_grouped().then(|| group.unwrap_or_default().to_string());
        label
            .into_iter()
            .chain(accumulators.iter().map(Accumulator::result))
            .collect()
    }
}

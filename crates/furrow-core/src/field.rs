//! Columns: detected input columns and requested computed columns.

use crate::operation::ResolvedChain;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reference to a column by 1-based position or by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    Index(usize),
    Name(String),
}

impl FromStr for ColumnRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.parse::<usize>() {
            Ok(n) => ColumnRef::Index(n),
            Err(_) => ColumnRef::Name(s.to_string()),
        })
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Index(n) => write!(f, "{n}"),
            ColumnRef::Name(name) => f.write_str(name),
        }
    }
}

impl From<usize> for ColumnRef {
    fn from(n: usize) -> Self {
        ColumnRef::Index(n)
    }
}

impl From<&str> for ColumnRef {
    fn from(s: &str) -> Self {
        ColumnRef::Name(s.to_string())
    }
}

/// A user's request for a new computed column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldRequest {
    /// Type to compute.
    pub target: String,
    /// Column to compute it from; resolved automatically when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<ColumnRef>,
    /// Type to read the source column as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    /// Parameters for parameterized hops, in path order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    /// Header name of the new column (defaults to the target type).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl FieldRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn column(mut self, column: impl Into<ColumnRef>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = Some(source_type.into());
        self
    }

    pub fn parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameters.push(parameter.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// How a computed column is produced.
#[derive(Debug, Clone)]
pub struct Computation {
    /// Id of the field feeding the chain.
    pub source_field: usize,
    pub source_type: String,
    pub target_type: String,
    /// Type sequence walked, `[source_type, ..., target_type]`.
    pub path: Vec<String>,
    pub chain: ResolvedChain,
}

/// A column of the working table.
#[derive(Debug, Clone)]
pub struct Field {
    /// Stable id: position in creation order.
    pub id: usize,
    pub name: String,
    /// Candidate types with scores, highest first.
    pub candidates: Vec<(String, u32)>,
    /// Type confirmed by the user or produced by a computation.
    pub chosen_type: Option<String>,
    /// Included in written rows.
    pub output: bool,
    pub computation: Option<Computation>,
}

impl Field {
    /// Create an input column.
    pub fn input(name: impl Into<String>, candidates: Vec<(String, u32)>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            candidates,
            chosen_type: None,
            output: true,
            computation: None,
        }
    }

    /// Create a computed column.
    pub fn computed(name: impl Into<String>, computation: Computation) -> Self {
        Self {
            id: 0,
            name: name.into(),
            candidates: vec![(computation.target_type.clone(), 0)],
            chosen_type: Some(computation.target_type.clone()),
            output: true,
            computation: Some(computation),
        }
    }

    pub fn is_computed(&self) -> bool {
        self.computation.is_some()
    }

    /// Chosen type, or the best-scoring candidate.
    pub fn best_type(&self) -> Option<&str> {
        self.chosen_type
            .as_deref()
            .or_else(|| self.candidates.first().map(|(t, _)| t.as_str()))
    }

    /// Types this column may hold: chosen type first, then candidates.
    pub fn type_candidates(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.chosen_type.iter().map(String::as_str).collect();
        for (name, _) in &self.candidates {
            if !types.contains(&name.as_str()) {
                types.push(name);
            }
        }
        types
    }
}

/// Ordered set of columns.
///
/// Input columns occupy the first ids; computed columns are appended.
/// Output order is tracked separately so re-ordering never changes ids.
#[derive(Debug, Clone, Default)]
pub struct Fields {
    fields: Vec<Field>,
    order: Vec<usize>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Input columns from header names, with no candidates yet.
    pub fn from_header<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut fields = Self::new();
        for name in names {
            fields.push(Field::input(name, Vec::new()));
        }
        fields
    }

    /// Append a field, assigning its id. Returns the id.
    pub fn push(&mut self, mut field: Field) -> usize {
        let id = self.fields.len();
        field.id = id;
        if field.is_computed() {
            field.name = self.unique_name(&field.name);
        }
        self.fields.push(field);
        self.order.push(id);
        id
    }

    fn unique_name(&self, base: &str) -> String {
        let taken = |name: &str| self.fields.iter().any(|f| f.name.eq_ignore_ascii_case(name));
        if !taken(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    pub fn get(&self, id: usize) -> Option<&Field> {
        self.fields.get(id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Field> {
        self.fields.get_mut(id)
    }

    /// Iterate in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of input columns.
    pub fn input_width(&self) -> usize {
        self.fields.iter().filter(|f| !f.is_computed()).count()
    }

    /// Computed fields in id order (dependency order).
    pub fn computed(&self) -> impl Iterator<Item = (&Field, &Computation)> {
        self.fields
            .iter()
            .filter_map(|f| f.computation.as_ref().map(|c| (f, c)))
    }

    /// Find a column by 1-based position (in output order) or by name.
    pub fn find(&self, column: &ColumnRef) -> Option<&Field> {
        match column {
            ColumnRef::Index(n) => {
                let id = *self.order.get(n.checked_sub(1)?)?;
                self.fields.get(id)
            }
            ColumnRef::Name(name) => self
                .fields
                .iter()
                .find(|f| f.name == *name)
                .or_else(|| self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))),
        }
    }

    /// Move a field to a new position in output order.
    pub fn move_field(&mut self, id: usize, position: usize) -> bool {
        let Some(current) = self.order.iter().position(|&i| i == id) else {
            return false;
        };
        let id = self.order.remove(current);
        let position = position.min(self.order.len());
        self.order.insert(position, id);
        true
    }

    /// Toggle a field in or out of written rows.
    pub fn set_output(&mut self, id: usize, output: bool) -> bool {
        match self.fields.get_mut(id) {
            Some(field) => {
                field.output = output;
                true
            }
            None => false,
        }
    }

    /// Confirm a type for an input column.
    pub fn retype(&mut self, id: usize, type_name: impl Into<String>) -> bool {
        match self.fields.get_mut(id) {
            Some(field) if !field.is_computed() => {
                field.chosen_type = Some(type_name.into());
                true
            }
            _ => false,
        }
    }

    /// Ids of written columns, in output order.
    pub fn output_ids(&self) -> Vec<usize> {
        self.order
            .iter()
            .copied()
            .filter(|&id| self.fields[id].output)
            .collect()
    }

    /// Header of written rows.
    pub fn output_header(&self) -> Vec<String> {
        self.output_ids()
            .into_iter()
            .map(|id| self.fields[id].name.clone())
            .collect()
    }

    /// Header of the input (used for quarantined rows).
    pub fn input_header(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| !f.is_computed())
            .map(|f| f.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn computation(source: usize, target: &str) -> Computation {
        Computation {
            source_field: source,
            source_type: "plaintext".into(),
            target_type: target.into(),
            path: vec!["plaintext".into(), target.into()],
            chain: ResolvedChain::default(),
        }
    }

    #[test]
    fn test_column_ref_parse() {
        assert_eq!("2".parse::<ColumnRef>().unwrap(), ColumnRef::Index(2));
        assert_eq!(
            "src ip".parse::<ColumnRef>().unwrap(),
            ColumnRef::Name("src ip".into())
        );
    }

    #[test]
    fn test_find_by_index_and_name() {
        let fields = Fields::from_header(["IP", "note"]);

        assert_eq!(fields.find(&ColumnRef::Index(1)).unwrap().name, "IP");
        assert_eq!(fields.find(&ColumnRef::Name("ip".into())).unwrap().id, 0);
        assert!(fields.find(&ColumnRef::Index(0)).is_none());
        assert!(fields.find(&ColumnRef::Index(3)).is_none());
    }

    #[test]
    fn test_computed_names_are_unique() {
        let mut fields = Fields::from_header(["country"]);
        let id = fields.push(Field::computed("country", computation(0, "country")));

        assert_eq!(fields.get(id).unwrap().name, "country_2");
        assert_eq!(fields.input_width(), 1);
        assert_eq!(fields.computed().count(), 1);
    }

    #[test]
    fn test_reorder_and_hide() {
        let mut fields = Fields::from_header(["a", "b"]);
        let c = fields.push(Field::computed("c", computation(0, "c")));

        assert!(fields.move_field(c, 0));
        assert_eq!(fields.output_header(), vec!["c", "a", "b"]);

        assert!(fields.set_output(0, false));
        assert_eq!(fields.output_header(), vec!["c", "b"]);
        assert_eq!(fields.input_header(), vec!["a", "b"]);

        // positions follow output order
        assert_eq!(fields.find(&ColumnRef::Index(1)).unwrap().name, "c");
    }

    #[test]
    fn test_type_candidates_prefer_chosen() {
        let mut field = Field::input(
            "x",
            vec![("hostname".into(), 2), ("plaintext".into(), 1)],
        );
        field.chosen_type = Some("plaintext".into());

        assert_eq!(field.best_type(), Some("plaintext"));
        assert_eq!(field.type_candidates(), vec!["plaintext", "hostname"]);
    }

    #[test]
    fn test_retype_rejects_computed() {
        let mut fields = Fields::from_header(["a"]);
        let c = fields.push(Field::computed("c", computation(0, "c")));

        assert!(fields.retype(0, "ip"));
        assert!(!fields.retype(c, "ip"));
        assert_eq!(fields.get(0).unwrap().best_type(), Some("ip"));
    }
}

//! Catalog of semantic types and the conversion edges between them.
//!
//! A [`CatalogBuilder`] collects type declarations and edges; `build()`
//! freezes them into an immutable [`Catalog`] that is shared by reference
//! with the resolver, the identifier and the processor. Disabling a group
//! happens at build time: its edges move to a separate set so the resolver
//! can tell "disabled" from "absent".

use crate::operation::Operation;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Predicate deciding whether a raw sample looks like a type.
pub type IdentifyFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Which module a type belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeGroup {
    /// Offline conversions.
    #[default]
    General,
    /// Needs an external service (whois, DNS, web).
    External,
    /// Defined by the user.
    Custom,
}

impl fmt::Display for TypeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TypeGroup::General => "general",
            TypeGroup::External => "external",
            TypeGroup::Custom => "custom",
        })
    }
}

/// Declaration of a semantic type.
#[derive(Clone)]
pub struct TypeDecl {
    /// Unique name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    pub group: TypeGroup,
    /// Intermediate type: never offered as an output column.
    pub private: bool,
    /// Turned off by configuration.
    pub disabled: bool,
    /// Header names this type usually appears under.
    pub usual_names: Vec<String>,
    /// Header hints only count on an exact match (and then count double).
    pub exact_header: bool,
    identify: Option<IdentifyFn>,
}

impl TypeDecl {
    /// Create a new general, public type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            group: TypeGroup::General,
            private: false,
            disabled: false,
            usual_names: Vec::new(),
            exact_header: false,
            identify: None,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn group(mut self, group: TypeGroup) -> Self {
        self.group = group;
        self
    }

    /// Mark as intermediate.
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn usual_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.usual_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn exact_header(mut self) -> Self {
        self.exact_header = true;
        self
    }

    /// Attach a sample-based identification predicate.
    pub fn identify<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.identify = Some(Arc::new(f));
        self
    }

    /// Run the identification predicate, if any.
    pub fn matches_sample(&self, sample: &str) -> Option<bool> {
        self.identify.as_ref().map(|f| f(sample))
    }

    pub fn has_predicate(&self) -> bool {
        self.identify.is_some()
    }

    /// Whether the identifier should consider this type at all.
    pub fn is_guessable(&self) -> bool {
        !self.private && !self.disabled && (self.identify.is_some() || !self.usual_names.is_empty())
    }
}

impl fmt::Debug for TypeDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDecl")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("private", &self.private)
            .field("disabled", &self.disabled)
            .field("usual_names", &self.usual_names)
            .field("exact_header", &self.exact_header)
            .field("identify", &self.identify.is_some())
            .finish()
    }
}

/// A directed edge source → target carrying an operation.
#[derive(Debug, Clone)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub operation: Operation,
    /// Always positive.
    pub weight: u32,
}

impl Edge {
    /// Weight used for distance computations; equivalences cost nothing.
    pub fn effective_weight(&self) -> u32 {
        if self.operation.is_equivalent() {
            0
        } else {
            self.weight
        }
    }
}

/// Errors raised while building a catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("type already registered: {0}")]
    DuplicateType(String),

    #[error("edge {from} -> {to} already registered")]
    ConflictingEdge { from: String, to: String },

    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("edge {from} -> {to} must have a positive weight")]
    ZeroWeight { from: String, to: String },
}

/// Collects types and edges before freezing them into a [`Catalog`].
#[derive(Default)]
pub struct CatalogBuilder {
    types: IndexMap<String, TypeDecl>,
    edges: IndexMap<(String, String), Edge>,
    disabled_groups: IndexSet<TypeGroup>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type node.
    pub fn register(&mut self, decl: TypeDecl) -> Result<&mut Self, CatalogError> {
        if self.types.contains_key(&decl.name) {
            return Err(CatalogError::DuplicateType(decl.name));
        }
        self.types.insert(decl.name.clone(), decl);
        Ok(self)
    }

    /// Register an edge with the default weight of 1.
    pub fn register_edge(
        &mut self,
        source: &str,
        target: &str,
        operation: Operation,
    ) -> Result<&mut Self, CatalogError> {
        self.register_weighted_edge(source, target, operation, 1)
    }

    /// Register an edge with an explicit weight.
    pub fn register_weighted_edge(
        &mut self,
        source: &str,
        target: &str,
        operation: Operation,
        weight: u32,
    ) -> Result<&mut Self, CatalogError> {
        for name in [source, target] {
            if !self.types.contains_key(name) {
                return Err(CatalogError::UnknownType(name.to_string()));
            }
        }
        if weight == 0 {
            return Err(CatalogError::ZeroWeight {
                from: source.to_string(),
                to: target.to_string(),
            });
        }
        let key = (source.to_string(), target.to_string());
        if self.edges.contains_key(&key) {
            return Err(CatalogError::ConflictingEdge {
                from: key.0,
                to: key.1,
            });
        }
        self.edges.insert(
            key,
            Edge {
                source: source.to_string(),
                target: target.to_string(),
                operation,
                weight,
            },
        );
        Ok(self)
    }

    /// Disable every type of a group, and every edge touching one.
    pub fn disable_group(&mut self, group: TypeGroup) -> &mut Self {
        self.disabled_groups.insert(group);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Freeze the catalog.
    pub fn build(self) -> Catalog {
        let mut types = self.types;
        for decl in types.values_mut() {
            if self.disabled_groups.contains(&decl.group) {
                decl.disabled = true;
            }
        }

        let mut edges = IndexMap::new();
        let mut disabled_edges = IndexMap::new();
        for (key, edge) in self.edges {
            let touches_disabled = [&edge.source, &edge.target]
                .into_iter()
                .any(|name| types.get(name).is_some_and(|t| t.disabled));
            if touches_disabled {
                disabled_edges.insert(key, edge);
            } else {
                edges.insert(key, edge);
            }
        }

        if !disabled_edges.is_empty() {
            tracing::debug!(
                groups = ?self.disabled_groups,
                edges = disabled_edges.len(),
                "disabled catalog edges"
            );
        }

        Catalog {
            types,
            edges,
            disabled_edges,
        }
    }
}

/// Immutable catalog of types and conversion edges.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    types: IndexMap<String, TypeDecl>,
    edges: IndexMap<(String, String), Edge>,
    disabled_edges: IndexMap<(String, String), Edge>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    /// Get a type declaration by name.
    pub fn get(&self, name: &str) -> Option<&TypeDecl> {
        self.types.get(name)
    }

    /// Position of a type in declaration order.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.types.get_index_of(name)
    }

    pub fn type_at(&self, index: usize) -> Option<&TypeDecl> {
        self.types.get_index(index).map(|(_, decl)| decl)
    }

    /// Iterate over all types in declaration order.
    pub fn types(&self) -> impl Iterator<Item = &TypeDecl> {
        self.types.values()
    }

    /// Types the identifier scores, in declaration order.
    pub fn guessable_types(&self) -> impl Iterator<Item = &TypeDecl> {
        self.types.values().filter(|t| t.is_guessable())
    }

    /// Active edges in registration order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Edges removed because they touch a disabled group.
    pub fn disabled_edges(&self) -> impl Iterator<Item = &Edge> {
        self.disabled_edges.values()
    }

    /// Get the active edge between two types.
    pub fn edge(&self, source: &str, target: &str) -> Option<&Edge> {
        self.edges.get(&(source.to_string(), target.to_string()))
    }

    /// Get an edge, active or disabled.
    pub fn any_edge(&self, source: &str, target: &str) -> Option<&Edge> {
        let key = (source.to_string(), target.to_string());
        self.edges.get(&key).or_else(|| self.disabled_edges.get(&key))
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.types.get(name).is_some_and(|t| t.disabled)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

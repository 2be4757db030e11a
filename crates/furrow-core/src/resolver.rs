//! Resolving conversion paths through the catalog.
//!
//! Path weight is hop count (edge weights default to 1, equivalences count
//! 0). Distances are computed backward from the target with a plain
//! O(V²) Dijkstra; ties go to the type declared first, so every query is
//! reproducible.

use crate::catalog::{Catalog, Edge};
use crate::operation::{ConvertError, Operation, ResolvedChain, Step};
use indexmap::IndexMap;

/// Default cap on path length before a walk is treated as a loop.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Errors raised while resolving a path.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("no conversion path from '{from}' to '{to}'")]
    NoPath { from: String, to: String },

    #[error("conversion path from '{from}' to '{to}' exists but is disabled")]
    Disabled { from: String, to: String },

    #[error("conversion {from} -> {to} needs a parameter: {prompt}")]
    MissingParameter {
        from: String,
        to: String,
        prompt: String,
    },

    #[error("conversion {from} -> {to} rejected its parameter")]
    Parameter {
        from: String,
        to: String,
        #[source]
        source: ConvertError,
    },
}

/// A resolved sequence of edges from a start type to a target type.
#[derive(Debug, Clone)]
pub struct ConversionPath {
    /// Node sequence `[start, ..., target]`.
    pub nodes: Vec<String>,
    /// Edges in traversal order.
    pub hops: Vec<Edge>,
    /// Sum of effective edge weights.
    pub weight: u32,
}

impl ConversionPath {
    pub fn start(&self) -> &str {
        &self.nodes[0]
    }

    pub fn target(&self) -> &str {
        &self.nodes[self.nodes.len() - 1]
    }

    /// Parameterized hops along the path, in order.
    pub fn parameterized_hops(&self) -> impl Iterator<Item = &Edge> {
        self.hops
            .iter()
            .filter(|hop| matches!(hop.operation, Operation::Parameterized(_)))
    }

    /// Turn the path into concrete steps.
    ///
    /// Parameterized hops take the supplied parameters in order; when the
    /// caller runs out, the operation's own default is used.
    pub fn resolve(&self, parameters: &[String]) -> Result<ResolvedChain, ResolveError> {
        let mut supplied = parameters.iter();
        let mut chain = ResolvedChain::default();

        for hop in &self.hops {
            match &hop.operation {
                Operation::Map(f) => chain.steps.push(Step::Map(f.clone())),
                Operation::Expand(f) => chain.steps.push(Step::Expand(f.clone())),
                Operation::Equivalent => {}
                Operation::Parameterized(op) => {
                    let parameter = supplied
                        .next()
                        .cloned()
                        .or_else(|| op.default_parameter())
                        .ok_or_else(|| ResolveError::MissingParameter {
                            from: hop.source.clone(),
                            to: hop.target.clone(),
                            prompt: op.prompt().to_string(),
                        })?;

                    let choices = op.choices();
                    if !choices.is_empty() && !choices.contains(&parameter) {
                        return Err(ResolveError::Parameter {
                            from: hop.source.clone(),
                            to: hop.target.clone(),
                            source: ConvertError::Parameter {
                                parameter,
                                reason: format!("expected one of: {}", choices.join(", ")),
                            },
                        });
                    }

                    let step = op
                        .resolve(&parameter)
                        .map_err(|source| ResolveError::Parameter {
                            from: hop.source.clone(),
                            to: hop.target.clone(),
                            source,
                        })?;
                    chain.steps.push(step);
                    chain.parameters.push(parameter);
                }
            }
        }

        Ok(chain)
    }
}

/// Shortest-path tree rooted at a target, indexed by catalog position.
struct Tree {
    dist: Vec<Option<u32>>,
    next: Vec<Option<usize>>,
}

/// Resolver for conversion paths.
pub struct Resolver<'a> {
    catalog: &'a Catalog,
    max_depth: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Set the maximum path length.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    /// Minimum weight from every type that can reach `target`.
    ///
    /// Ordered by distance, then declaration order. With `ignore_private`,
    /// intermediate types are still traversed but left out of the result.
    pub fn shortest_distances(&self, target: &str, ignore_private: bool) -> IndexMap<String, u32> {
        let Some(target_idx) = self.catalog.index_of(target) else {
            return IndexMap::new();
        };
        let tree = self.tree(target_idx, false);

        let mut reached: Vec<(u32, usize)> = tree
            .dist
            .iter()
            .enumerate()
            .filter_map(|(idx, dist)| dist.map(|d| (d, idx)))
            .collect();
        reached.sort_unstable();

        reached
            .into_iter()
            .filter_map(|(dist, idx)| {
                let decl = self.catalog.type_at(idx)?;
                if ignore_private && decl.private {
                    return None;
                }
                Some((decl.name.clone(), dist))
            })
            .collect()
    }

    /// Node sequence `[start, ..., target]`.
    pub fn shortest_path(&self, target: &str, start: &str) -> Result<Vec<String>, ResolveError> {
        let target_idx = self.index(target)?;
        let start_idx = self.index(start)?;

        if start_idx == target_idx {
            return Ok(vec![start.to_string()]);
        }

        let tree = self.tree(target_idx, false);
        if tree.dist[start_idx].is_none() {
            return Err(self.unreachable(start, target, start_idx, target_idx));
        }

        let mut path = vec![start.to_string()];
        let mut current = start_idx;
        while current != target_idx {
            if path.len() > self.max_depth {
                tracing::error!(
                    from = start,
                    to = target,
                    max_depth = self.max_depth,
                    "path walk exceeded depth cap, treating as no path"
                );
                return Err(self.no_path(start, target));
            }
            let Some(next) = tree.next[current] else {
                tracing::error!(from = start, to = target, "broken shortest-path tree");
                return Err(self.no_path(start, target));
            };
            let decl = self
                .catalog
                .type_at(next)
                .ok_or_else(|| self.no_path(start, target))?;
            path.push(decl.name.clone());
            current = next;
        }

        Ok(path)
    }

    /// Full conversion path including the edges to walk.
    pub fn plan(&self, start: &str, target: &str) -> Result<ConversionPath, ResolveError> {
        let nodes = self.shortest_path(target, start)?;
        let mut hops = Vec::with_capacity(nodes.len().saturating_sub(1));

        for pair in nodes.windows(2) {
            let edge = self.catalog.edge(&pair[0], &pair[1]).ok_or_else(|| {
                tracing::error!(from = %pair[0], to = %pair[1], "path references a missing edge");
                self.no_path(start, target)
            })?;
            hops.push(edge.clone());
        }

        let weight = hops.iter().map(Edge::effective_weight).sum();
        Ok(ConversionPath {
            nodes,
            hops,
            weight,
        })
    }

    /// Types a user may ask to compute from `start`.
    ///
    /// Leaves out private and disabled types, and types reached only by a
    /// final equivalence hop (aliases are not conversions).
    pub fn reachable_targets(&self, start: &str) -> Vec<String> {
        let Some(start_idx) = self.catalog.index_of(start) else {
            return Vec::new();
        };

        self.catalog
            .types()
            .enumerate()
            .filter(|(idx, decl)| *idx != start_idx && !decl.private && !decl.disabled)
            .filter_map(|(idx, decl)| {
                let tree = self.tree(idx, false);
                tree.dist[start_idx]?;
                let last = self.last_hop(&tree, start_idx, idx)?;
                let edge = self.catalog.type_at(last).and_then(|prev| {
                    self.catalog.edge(&prev.name, &decl.name)
                })?;
                (!edge.operation.is_equivalent()).then(|| decl.name.clone())
            })
            .collect()
    }

    fn last_hop(&self, tree: &Tree, start: usize, target: usize) -> Option<usize> {
        let mut current = start;
        for _ in 0..=self.max_depth {
            let next = tree.next[current]?;
            if next == target {
                return Some(current);
            }
            current = next;
        }
        None
    }

    fn index(&self, name: &str) -> Result<usize, ResolveError> {
        self.catalog
            .index_of(name)
            .ok_or_else(|| ResolveError::UnknownType(name.to_string()))
    }

    fn no_path(&self, start: &str, target: &str) -> ResolveError {
        ResolveError::NoPath {
            from: start.to_string(),
            to: target.to_string(),
        }
    }

    /// Decide between "disabled" and "absent" for an unreachable pair.
    fn unreachable(&self, start: &str, target: &str, start_idx: usize, target_idx: usize) -> ResolveError {
        if self.tree(target_idx, true).dist[start_idx].is_some() {
            tracing::warn!(from = start, to = target, "conversion path is disabled");
            ResolveError::Disabled {
                from: start.to_string(),
                to: target.to_string(),
            }
        } else {
            self.no_path(start, target)
        }
    }

    /// Backward Dijkstra from `target` over the whole node set.
    fn tree(&self, target: usize, include_disabled: bool) -> Tree {
        let n = self.catalog.len();

        // incoming[u] = edges v -> u as (v, weight), in registration order
        let mut incoming: Vec<Vec<(usize, u32)>> = vec![Vec::new(); n];
        let active = self.catalog.edges();
        let edges: Box<dyn Iterator<Item = &Edge>> = if include_disabled {
            Box::new(active.chain(self.catalog.disabled_edges()))
        } else {
            Box::new(active)
        };
        for edge in edges {
            if let (Some(v), Some(u)) = (
                self.catalog.index_of(&edge.source),
                self.catalog.index_of(&edge.target),
            ) {
                incoming[u].push((v, edge.effective_weight()));
            }
        }

        let mut dist: Vec<Option<u32>> = vec![None; n];
        let mut next: Vec<Option<usize>> = vec![None; n];
        let mut done = vec![false; n];
        dist[target] = Some(0);

        while let Some((d, u)) = (0..n)
            .filter(|&i| !done[i])
            .filter_map(|i| dist[i].map(|d| (d, i)))
            .min()
        {
            done[u] = true;
            for &(v, w) in &incoming[u] {
                if done[v] {
                    continue;
                }
                let candidate = d.saturating_add(w);
                if dist[v].is_none_or(|current| candidate < current) {
                    dist[v] = Some(candidate);
                    next[v] = Some(u);
                }
            }
        }

        Tree { dist, next }
    }
}

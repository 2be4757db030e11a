//! Column type identification and source resolution.
//!
//! The identifier scores every guessable type against a column's header and
//! samples, and decides which existing column should feed a requested
//! computation.

use crate::catalog::{Catalog, TypeDecl};
use crate::field::{ColumnRef, Computation, Field, FieldRequest, Fields};
use crate::resolver::{ConversionPath, ResolveError, Resolver};
use indexmap::IndexMap;

/// Score for a fuzzy header match.
pub const HEADER_SCORE: u32 = 1;
/// Score for an exact header match on a type that demands one.
pub const EXACT_HEADER_SCORE: u32 = 2;
/// Fraction of non-empty samples that must match for the first sample point.
pub const SAMPLE_THRESHOLD: f64 = 0.6;
/// Fraction for the second sample point.
pub const STRONG_SAMPLE_THRESHOLD: f64 = 0.8;

/// Generic type every text value can be read as.
pub const PLAINTEXT: &str = "plaintext";

/// Candidate types with scores, highest first.
pub type Ranking = Vec<(String, u32)>;

#[derive(Debug, thiserror::Error)]
pub enum IdentifyError {
    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("type {0} is intermediate and cannot be an output column")]
    PrivateTarget(String),

    #[error("no such column: {0}")]
    UnknownColumn(String),

    #[error("no column can be converted to {target}")]
    NoSourcePath { target: String },

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// A parameter the caller still has to decide for a parameterized hop.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterPrompt {
    pub from: String,
    pub to: String,
    pub prompt: String,
    pub choices: Vec<String>,
    pub default: Option<String>,
}

/// Chosen source for a computed column.
#[derive(Debug, Clone)]
pub struct SourceResolution {
    /// Id of the source field.
    pub field: usize,
    pub source_type: String,
    pub path: ConversionPath,
}

impl SourceResolution {
    /// Parameters the path needs, asked through each operation's own prompt.
    pub fn parameter_prompts(&self) -> Vec<ParameterPrompt> {
        self.path
            .parameterized_hops()
            .filter_map(|hop| match &hop.operation {
                crate::operation::Operation::Parameterized(op) => Some(ParameterPrompt {
                    from: hop.source.clone(),
                    to: hop.target.clone(),
                    prompt: op.prompt().to_string(),
                    choices: op.choices(),
                    default: op.default_parameter(),
                }),
                _ => None,
            })
            .collect()
    }
}

/// Scores column types and resolves computation sources.
pub struct Identifier<'a> {
    resolver: Resolver<'a>,
}

impl<'a> Identifier<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            resolver: Resolver::new(catalog),
        }
    }

    pub fn with_resolver(resolver: Resolver<'a>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &Resolver<'a> {
        &self.resolver
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.resolver.catalog()
    }

    /// Rank the guessable types for one column.
    ///
    /// Empty samples are ignored; when every sample is empty the ranking is
    /// empty. Ties keep declaration order.
    pub fn identify<S: AsRef<str>>(&self, samples: &[S], header: Option<&str>) -> Ranking {
        let samples: Vec<&str> = samples
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .collect();
        if samples.is_empty() {
            return Ranking::new();
        }

        let mut ranking: Ranking = self
            .catalog()
            .guessable_types()
            .filter_map(|decl| {
                let score = header.map_or(0, |h| header_score(decl, h)) + sample_score(decl, &samples);
                (score > 0).then(|| (decl.name.clone(), score))
            })
            .collect();

        // stable: equal scores stay in declaration order
        ranking.sort_by(|a, b| b.1.cmp(&a.1));
        ranking
    }

    /// Identify every input column from a header and sample rows.
    ///
    /// Short rows leave their missing cells out of the samples.
    pub fn identify_columns(&self, header: Option<&[String]>, rows: &[Vec<String>]) -> Fields {
        let width = rows
            .iter()
            .map(Vec::len)
            .chain(header.map(<[String]>::len))
            .max()
            .unwrap_or(0);

        let column = |idx: usize| -> Field {
            let samples: Vec<&str> = rows.iter().filter_map(|r| r.get(idx).map(String::as_str)).collect();
            let name = header
                .and_then(|h| h.get(idx).cloned())
                .unwrap_or_else(|| format!("column {}", idx + 1));
            let ranking = self.identify(&samples, header.map(|_| name.as_str()));
            Field::input(name, ranking)
        };

        #[cfg(feature = "parallel")]
        let columns: Vec<Field> = {
            use rayon::prelude::*;
            (0..width).into_par_iter().map(column).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let columns: Vec<Field> = (0..width).map(column).collect();

        let mut fields = Fields::new();
        for field in columns {
            tracing::debug!(
                column = %field.name,
                best = field.best_type().unwrap_or("-"),
                "identified column"
            );
            fields.push(field);
        }
        fields
    }

    /// Decide which column, read as which type, feeds `target`.
    ///
    /// An explicit column wins outright. Otherwise the column whose best
    /// candidate type is closest to the target is chosen. As a last resort,
    /// the first input column is read as plain text when that reaches the
    /// target.
    pub fn resolve_source(
        &self,
        fields: &Fields,
        target: &str,
        column: Option<&ColumnRef>,
        source_type: Option<&str>,
    ) -> Result<SourceResolution, IdentifyError> {
        let decl = self
            .catalog()
            .get(target)
            .ok_or_else(|| IdentifyError::UnknownType(target.to_string()))?;
        if decl.private {
            return Err(IdentifyError::PrivateTarget(target.to_string()));
        }
        if let Some(source_type) = source_type
            && !self.catalog().contains(source_type)
        {
            return Err(IdentifyError::UnknownType(source_type.to_string()));
        }

        let distances = self.resolver.shortest_distances(target, false);
        let plaintext_reaches = distances.contains_key(PLAINTEXT);

        let (field, source_type) = match column {
            Some(column) => {
                let field = fields
                    .find(column)
                    .ok_or_else(|| IdentifyError::UnknownColumn(column.to_string()))?;
                let source_type = match source_type {
                    Some(t) => t.to_string(),
                    None => closest_type(field, &distances)
                        .map(|(t, _)| t.to_string())
                        .or_else(|| plaintext_reaches.then(|| PLAINTEXT.to_string()))
                        .or_else(|| field.best_type().map(str::to_string))
                        .ok_or_else(|| IdentifyError::NoSourcePath {
                            target: target.to_string(),
                        })?,
                };
                (field.id, source_type)
            }
            None => match self.pick_source(fields, source_type, &distances, plaintext_reaches) {
                Some(found) => found,
                None => return Err(self.explain_unreachable(fields, target)),
            },
        };

        let path = self.resolver.plan(&source_type, target)?;
        tracing::debug!(
            target,
            field,
            source_type = %source_type,
            hops = path.hops.len(),
            "resolved computation source"
        );
        Ok(SourceResolution {
            field,
            source_type,
            path,
        })
    }

    fn pick_source(
        &self,
        fields: &Fields,
        source_type: Option<&str>,
        distances: &IndexMap<String, u32>,
        plaintext_reaches: bool,
    ) -> Option<(usize, String)> {
        if let Some(wanted) = source_type {
            return fields
                .iter()
                .find(|f| f.type_candidates().contains(&wanted))
                .map(|f| (f.id, wanted.to_string()));
        }

        // only the column's best guess counts; weaker candidates are ignored
        let mut best: Option<(u32, usize, &str)> = None;
        for field in fields.iter() {
            if let Some(name) = field.best_type()
                && let Some(&dist) = distances.get(name)
                && best.is_none_or(|(d, _, _)| dist < d)
            {
                best = Some((dist, field.id, name));
            }
        }
        if let Some((_, id, name)) = best {
            return Some((id, name.to_string()));
        }

        if plaintext_reaches {
            return fields
                .iter()
                .find(|f| !f.is_computed())
                .map(|f| (f.id, PLAINTEXT.to_string()));
        }
        None
    }

    /// Report a disabled path when one exists, otherwise "no source".
    fn explain_unreachable(&self, fields: &Fields, target: &str) -> IdentifyError {
        let disabled = fields
            .iter()
            .flat_map(|f| f.type_candidates())
            .chain(std::iter::once(PLAINTEXT))
            .filter(|t| self.catalog().contains(t))
            .find_map(|t| match self.resolver.plan(t, target) {
                Err(err @ ResolveError::Disabled { .. }) => Some(err),
                _ => None,
            });

        match disabled {
            Some(err) => IdentifyError::Resolve(err),
            None => IdentifyError::NoSourcePath {
                target: target.to_string(),
            },
        }
    }

    /// Build the computed field for a request, with its chain resolved.
    pub fn resolve_field(&self, fields: &Fields, request: &FieldRequest) -> Result<Field, IdentifyError> {
        let source = self.resolve_source(
            fields,
            &request.target,
            request.column.as_ref(),
            request.source_type.as_deref(),
        )?;
        let chain = source.path.resolve(&request.parameters)?;

        let name = request.name.clone().unwrap_or_else(|| request.target.clone());
        Ok(Field::computed(
            name,
            Computation {
                source_field: source.field,
                source_type: source.source_type,
                target_type: request.target.clone(),
                path: source.path.nodes,
                chain,
            },
        ))
    }
}

/// Candidate of `field` closest to the target; ties keep candidate order.
fn closest_type<'f>(field: &'f Field, distances: &IndexMap<String, u32>) -> Option<(&'f str, u32)> {
    let mut best: Option<(&str, u32)> = None;
    for name in field.type_candidates() {
        if let Some(&dist) = distances.get(name)
            && best.is_none_or(|(_, d)| dist < d)
        {
            best = Some((name, dist));
        }
    }
    best
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn header_score(decl: &TypeDecl, header: &str) -> u32 {
    let whole = normalize(header);
    if whole.is_empty() {
        return 0;
    }
    let words: Vec<String> = header
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    for usual in decl.usual_names.iter().map(|n| normalize(n)) {
        if decl.exact_header {
            if usual == whole {
                return EXACT_HEADER_SCORE;
            }
        } else if usual == whole || words.contains(&usual) {
            return HEADER_SCORE;
        }
    }
    0
}

fn sample_score(decl: &TypeDecl, samples: &[&str]) -> u32 {
    if !decl.has_predicate() {
        return 0;
    }
    let hits = samples
        .iter()
        .filter(|s| decl.matches_sample(s).unwrap_or(false))
        .count();
    let ratio = hits as f64 / samples.len() as f64;

    let mut score = 0;
    if ratio > SAMPLE_THRESHOLD {
        score += 1;
    }
    if ratio > STRONG_SAMPLE_THRESHOLD {
        score += 1;
    }
    score
}

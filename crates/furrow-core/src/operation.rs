//! Conversion operations and the steps they resolve to.
//!
//! Every edge of the catalog carries an [`Operation`]. Before a run starts,
//! the operations along a path are resolved into concrete [`Step`]s: plain
//! maps and fan-out expansions. Parameterized operations are never applied
//! directly; they hand out a step once their parameter is known.

use std::fmt;
use std::sync::Arc;

/// Function turning one value into another.
pub type MapFn = Arc<dyn Fn(&str) -> Result<String, ConvertError> + Send + Sync>;

/// Function turning one value into many (fan-out).
pub type ExpandFn = Arc<dyn Fn(&str) -> Result<Vec<String>, ConvertError> + Send + Sync>;

/// The computation attached to a catalog edge.
#[derive(Clone)]
pub enum Operation {
    /// Pure value to value conversion.
    Map(MapFn),
    /// Pure value to list-of-values conversion. Causes row duplication downstream.
    Expand(ExpandFn),
    /// Zero-cost alias: the source type is-a target type.
    Equivalent,
    /// Needs a runtime-chosen method or free-form parameter.
    Parameterized(Arc<dyn ParameterizedOp>),
}

impl Operation {
    /// Wrap a map function.
    pub fn map<F>(f: F) -> Self
    where
        F: Fn(&str) -> Result<String, ConvertError> + Send + Sync + 'static,
    {
        Operation::Map(Arc::new(f))
    }

    /// Wrap an expanding function.
    pub fn expand<F>(f: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<String>, ConvertError> + Send + Sync + 'static,
    {
        Operation::Expand(Arc::new(f))
    }

    /// Wrap a parameterized operation.
    pub fn parameterized(op: impl ParameterizedOp + 'static) -> Self {
        Operation::Parameterized(Arc::new(op))
    }

    /// Short label used in listings and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Map(_) => "map",
            Operation::Expand(_) => "expand",
            Operation::Equivalent => "equivalent",
            Operation::Parameterized(_) => "parameterized",
        }
    }

    pub fn is_equivalent(&self) -> bool {
        matches!(self, Operation::Equivalent)
    }

    /// Check if this operation may produce several values from one.
    ///
    /// Parameterized operations are only known after resolution, so they
    /// report `false` here.
    pub fn expands(&self) -> bool {
        matches!(self, Operation::Expand(_))
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Parameterized(op) => f
                .debug_tuple("Parameterized")
                .field(&op.prompt())
                .finish(),
            other => f.write_str(other.kind()),
        }
    }
}

/// Capability exposed by operations that need a parameter before they can run.
///
/// The parameter is a method name (one of [`choices`](Self::choices)), a
/// regular expression, or any other free-form string the operation
/// understands. Callers never special-case concrete operations; they ask
/// this trait.
pub trait ParameterizedOp: Send + Sync {
    /// Human-readable description of the parameter being asked for.
    fn prompt(&self) -> &str;

    /// Known sub-methods, if the parameter is a choice. Empty for free-form.
    fn choices(&self) -> Vec<String> {
        Vec::new()
    }

    /// Parameter used when the caller supplies none.
    fn default_parameter(&self) -> Option<String> {
        None
    }

    /// Produce the concrete step for this parameter.
    fn resolve(&self, parameter: &str) -> Result<Step, ConvertError>;
}

/// A concrete, fully-resolved conversion step.
#[derive(Clone)]
pub enum Step {
    Map(MapFn),
    Expand(ExpandFn),
}

impl Step {
    pub fn map<F>(f: F) -> Self
    where
        F: Fn(&str) -> Result<String, ConvertError> + Send + Sync + 'static,
    {
        Step::Map(Arc::new(f))
    }

    pub fn expand<F>(f: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<String>, ConvertError> + Send + Sync + 'static,
    {
        Step::Expand(Arc::new(f))
    }

    /// Apply the step to a single value.
    pub fn apply(&self, value: &str) -> Result<StepOutput, ConvertError> {
        match self {
            Step::Map(f) => f(value).map(StepOutput::Single),
            Step::Expand(f) => f(value).map(StepOutput::Multiple),
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Map(_) => f.write_str("Step::Map"),
            Step::Expand(_) => f.write_str("Step::Expand"),
        }
    }
}

/// Result of applying a step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
    Single(String),
    Multiple(Vec<String>),
}

/// Ordered, concrete steps for one (source type, target type) pair.
///
/// Resolved once, then applied to every row.
#[derive(Debug, Clone, Default)]
pub struct ResolvedChain {
    pub steps: Vec<Step>,
    /// Parameters consumed by parameterized hops, in path order.
    pub parameters: Vec<String>,
}

impl ResolvedChain {
    /// Apply every step left to right.
    ///
    /// Fan-out steps multiply the working set; an empty result means the
    /// value has no valid conversion.
    pub fn apply(&self, value: &str) -> Result<Vec<String>, ConvertError> {
        let mut items = vec![value.to_string()];

        for step in &self.steps {
            let mut next = Vec::with_capacity(items.len());
            for item in &items {
                match step.apply(item)? {
                    StepOutput::Single(out) => next.push(out),
                    StepOutput::Multiple(outs) => next.extend(outs),
                }
            }
            if next.is_empty() {
                return Ok(next);
            }
            items = next;
        }

        Ok(items)
    }

    pub fn is_identity(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Errors raised while converting a single value.
///
/// The variant decides where a failing row ends up: quota errors defer the
/// row, `Unknown` quarantines it for a later retry, everything else marks it
/// invalid.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConvertError {
    #[error("conversion failed: {0}")]
    Failed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("value could not be classified: {0}")]
    Unknown(String),

    #[error("lookup timed out after {seconds}s: {what}")]
    Timeout { what: String, seconds: u64 },

    #[error("invalid parameter {parameter:?}: {reason}")]
    Parameter { parameter: String, reason: String },
}

impl ConvertError {
    pub fn failed(msg: impl Into<String>) -> Self {
        ConvertError::Failed(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        ConvertError::InvalidInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upper() -> Step {
        Step::map(|v| Ok(v.to_uppercase()))
    }

    fn split_chars() -> Step {
        Step::expand(|v| Ok(v.chars().map(String::from).collect()))
    }

    #[test]
    fn test_chain_map_then_expand() {
        let chain = ResolvedChain {
            steps: vec![upper(), split_chars()],
            parameters: vec![],
        };

        assert_eq!(chain.apply("ab").unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn test_chain_expand_then_map_keeps_all_items() {
        let chain = ResolvedChain {
            steps: vec![split_chars(), upper()],
            parameters: vec![],
        };

        assert_eq!(chain.apply("xyz").unwrap(), vec!["X", "Y", "Z"]);
    }

    #[test]
    fn test_chain_empty_expansion() {
        let chain = ResolvedChain {
            steps: vec![split_chars(), upper()],
            parameters: vec![],
        };

        assert!(chain.apply("").unwrap().is_empty());
    }

    #[test]
    fn test_identity_chain() {
        let chain = ResolvedChain::default();
        assert!(chain.is_identity());
        assert_eq!(chain.apply("same").unwrap(), vec!["same"]);
    }

    #[test]
    fn test_error_propagates() {
        let chain = ResolvedChain {
            steps: vec![Step::map(|_| Err(ConvertError::QuotaExceeded("whois".into())))],
            parameters: vec![],
        };

        assert_eq!(
            chain.apply("1.2.3.4"),
            Err(ConvertError::QuotaExceeded("whois".into()))
        );
    }

    #[test]
    fn test_operation_kinds() {
        assert_eq!(Operation::map(|v| Ok(v.into())).kind(), "map");
        assert!(Operation::expand(|v| Ok(vec![v.into()])).expands());
        assert!(Operation::Equivalent.is_equivalent());
    }
}

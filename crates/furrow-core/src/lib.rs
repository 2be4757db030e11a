//! Furrow: type-driven row transformation
//!
//! Furrow infers what each column of a table holds, finds conversion paths
//! through a catalog of semantic types to compute new columns, and streams
//! every row through filters, uniqueness checks, computation, routing and
//! aggregation.

mod aggregate;
mod cancel;
mod catalog;
mod field;
mod filter;
mod identifier;
mod operation;
mod processor;
mod resolver;
mod router;
mod settings;
mod sink;
mod state;

pub use aggregate::{
    Accumulator, AggregateColumn, AggregateError, AggregateFn, AggregateSpec, Aggregation,
    TOTAL_LABEL,
};
pub use cancel::{CancelState, CancelToken};
pub use catalog::{Catalog, CatalogBuilder, CatalogError, Edge, IdentifyFn, TypeDecl, TypeGroup};
pub use field::{ColumnRef, Computation, Field, FieldRequest, Fields};
pub use filter::{Claims, Filter, FilterMode, Predicate, UniqueSets};
pub use identifier::{
    EXACT_HEADER_SCORE, HEADER_SCORE, IdentifyError, Identifier, PLAINTEXT, ParameterPrompt,
    Ranking, SAMPLE_THRESHOLD, STRONG_SAMPLE_THRESHOLD, SourceResolution,
};
pub use operation::{
    ConvertError, ExpandFn, MapFn, Operation, ParameterizedOp, ResolvedChain, Step, StepOutput,
};
pub use processor::{
    DEFAULT_OUTPUT_NAME, ProcessError, Processor, ProcessorOptions, QUEUE_SLACK,
    QuarantineReport, RunCounts, RunStatus, RunSummary, quarantine_for,
};
pub use resolver::{ConversionPath, DEFAULT_MAX_DEPTH, ResolveError, Resolver};
pub use router::{DEFAULT_MAX_OPEN, Location, OutputRouter, Quarantine, sanitize};
pub use settings::{ColumnType, Settings, SettingsError, detect_format};
pub use sink::{CsvDirectorySink, MemorySink, OpenMode, OutputSink, RowWriter, SinkError};
pub use state::{MemoryStateStore, SavedState, StateError, StateStore};

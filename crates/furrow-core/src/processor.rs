//! Row processing pipeline.
//!
//! Every input row goes through the same steps:
//!
//! ```text
//! pre-filter -> pre-unique -> compute (fan-out) -> post-filter -> post-unique
//!            -> route -> aggregate | write
//! ```
//!
//! Filters and uniqueness on input columns run before computation; on
//! computed columns they run after it, on each expanded row. A failing
//! computation never stops the run: the original row is quarantined and
//! can be reprocessed later with [`Processor::reprocess`].

use crate::aggregate::{AggregateColumn, AggregateFn, Aggregation};
use crate::cancel::{CancelState, CancelToken};
use crate::field::Fields;
use crate::filter::{Claims, Filter, UniqueSets};
use crate::operation::ConvertError;
use crate::router::{DEFAULT_MAX_OPEN, Location, OutputRouter, Quarantine};
use crate::sink::{OutputSink, SinkError};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Queue slots beyond one per worker.
pub const QUEUE_SLACK: usize = 2;

/// Default name of the single output location when no split is set.
pub const DEFAULT_OUTPUT_NAME: &str = "output";

/// Errors that stop a run or prevent it from starting.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("unknown field id {0}")]
    UnknownField(usize),

    #[error("invalid field layout: {0}")]
    Layout(String),

    #[error("failed to read input: {0}")]
    Input(String),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("pipeline state is poisoned")]
    Poisoned,
}

impl ProcessError {
    pub fn input(err: impl fmt::Display) -> Self {
        ProcessError::Input(err.to_string())
    }
}

/// Compiled run options. Columns are field ids.
#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    pub filters: Vec<(usize, Filter)>,
    pub unique: Vec<usize>,
    pub split: Option<usize>,
    pub aggregate: Vec<(AggregateFn, usize)>,
    pub group_by: Option<usize>,
    /// Worker count; 0 runs on the calling thread and keeps input order.
    pub threads: usize,
    pub max_open_handles: usize,
    /// Halt on the first invalid row.
    pub debug: bool,
    pub output_name: String,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            unique: Vec::new(),
            split: None,
            aggregate: Vec::new(),
            group_by: None,
            threads: 0,
            max_open_handles: DEFAULT_MAX_OPEN,
            debug: false,
            output_name: DEFAULT_OUTPUT_NAME.to_string(),
        }
    }
}

impl ProcessorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: usize, filter: Filter) -> Self {
        self.filters.push((field, filter));
        self
    }

    pub fn unique(mut self, field: usize) -> Self {
        self.unique.push(field);
        self
    }

    pub fn split(mut self, field: usize) -> Self {
        self.split = Some(field);
        self
    }

    pub fn aggregate(mut self, function: AggregateFn, field: usize) -> Self {
        self.aggregate.push((function, field));
        self
    }

    pub fn group_by(mut self, field: usize) -> Self {
        self.group_by = Some(field);
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn max_open_handles(mut self, max: usize) -> Self {
        self.max_open_handles = max;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = name.into();
        self
    }
}

/// Row counts of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    /// Input rows taken from the source.
    pub read: u64,
    /// Rows written to output locations (aggregate rows included).
    pub written: u64,
    /// Expanded rows fed to aggregation.
    pub aggregated: u64,
    pub filtered: u64,
    pub duplicates: u64,
    pub invalid: u64,
    pub unknown: u64,
    pub deferred: u64,
}

impl RunCounts {
    pub fn dropped(&self) -> u64 {
        self.filtered + self.duplicates
    }

    pub fn quarantined(&self, kind: Quarantine) -> u64 {
        match kind {
            Quarantine::Invalid => self.invalid,
            Quarantine::Unknown => self.unknown,
            Quarantine::Deferred => self.deferred,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    read: AtomicU64,
    written: AtomicU64,
    aggregated: AtomicU64,
    filtered: AtomicU64,
    duplicates: AtomicU64,
    invalid: AtomicU64,
    unknown: AtomicU64,
    deferred: AtomicU64,
}

impl Counters {
    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    fn quarantine(&self, kind: Quarantine) -> &AtomicU64 {
        match kind {
            Quarantine::Invalid => &self.invalid,
            Quarantine::Unknown => &self.unknown,
            Quarantine::Deferred => &self.deferred,
        }
    }

    fn snapshot(&self) -> RunCounts {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        RunCounts {
            read: get(&self.read),
            written: get(&self.written),
            aggregated: get(&self.aggregated),
            filtered: get(&self.filtered),
            duplicates: get(&self.duplicates),
            invalid: get(&self.invalid),
            unknown: get(&self.unknown),
            deferred: get(&self.deferred),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// All input was processed.
    Completed,
    /// Cancelled: in-flight rows were finished and aggregates flushed.
    EndedEarly,
    /// Cancelled hard: handles closed, aggregates not flushed.
    Aborted,
    /// Debug mode stopped at an invalid row.
    Halted { line: u64, reason: String },
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => f.write_str("completed"),
            RunStatus::EndedEarly => f.write_str("ended early"),
            RunStatus::Aborted => f.write_str("aborted"),
            RunStatus::Halted { line, reason } => write!(f, "halted at row {line}: {reason}"),
        }
    }
}

/// Pointer to a quarantine that received rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantineReport {
    pub kind: Quarantine,
    pub location: String,
    pub rows: u64,
}

/// End-of-run summary.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub status: RunStatus,
    pub counts: RunCounts,
    /// Output locations written so far, in first-write order.
    pub outputs: Vec<String>,
    pub quarantines: Vec<QuarantineReport>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counts;
        writeln!(
            f,
            "{} in {:.2?}: {} rows read, {} rows written to {} location(s)",
            self.status,
            self.duration,
            c.read,
            c.written,
            self.outputs.len()
        )?;
        if c.dropped() > 0 {
            writeln!(f, "dropped: {} filtered, {} duplicate", c.filtered, c.duplicates)?;
        }
        for q in &self.quarantines {
            writeln!(f, "{}: {} row(s) in {}", q.kind, q.rows, q.location)?;
        }
        Ok(())
    }
}

/// Per-row work derived from the fields and options.
#[derive(Debug)]
struct RowPlan {
    input_width: usize,
    pre_filters: Vec<(usize, Filter)>,
    post_filters: Vec<(usize, Filter)>,
    pre_unique: Vec<usize>,
    post_unique: Vec<usize>,
    output_ids: Vec<usize>,
    output_header: Vec<String>,
    input_header: Vec<String>,
}

/// State guarded by the single "choose, open, write" lock.
struct Shared {
    uniques: UniqueSets,
    router: OutputRouter,
}

#[derive(Default)]
struct RunState {
    counters: Counters,
    halted: Mutex<Option<(u64, String)>>,
    halt_flag: AtomicBool,
    fatal: Mutex<Option<ProcessError>>,
    failed: AtomicBool,
}

impl RunState {
    fn fail(&self, err: ProcessError) {
        tracing::error!(error = %err, "run failed");
        if let Ok(mut slot) = self.fatal.lock() {
            slot.get_or_insert(err);
        }
        self.failed.store(true, Ordering::SeqCst);
    }

    fn halt(&self, line: u64, reason: String) {
        if let Ok(mut slot) = self.halted.lock() {
            slot.get_or_insert((line, reason));
        }
        self.halt_flag.store(true, Ordering::SeqCst);
    }

    fn failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// The producer must not hand out more rows.
    fn stopped(&self) -> bool {
        self.failed() || self.halt_flag.load(Ordering::SeqCst)
    }

    fn take_fatal(&self) -> Option<ProcessError> {
        self.fatal.lock().ok().and_then(|mut slot| slot.take())
    }

    fn take_halt(&self) -> Option<(u64, String)> {
        self.halted.lock().ok().and_then(|mut slot| slot.take())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, ProcessError> {
    mutex.lock().map_err(|_| ProcessError::Poisoned)
}

/// Which quarantine a computation error sends its row to.
pub fn quarantine_for(err: &ConvertError) -> Quarantine {
    match err {
        ConvertError::QuotaExceeded(_) => Quarantine::Deferred,
        ConvertError::Unknown(_) => Quarantine::Unknown,
        ConvertError::Failed(_)
        | ConvertError::InvalidInput(_)
        | ConvertError::Timeout { .. }
        | ConvertError::Parameter { .. } => Quarantine::Invalid,
    }
}

/// Runs resolved computations over a stream of rows.
///
/// Uniqueness sets, the output router and aggregation state live as long
/// as the processor, so reprocessing a quarantine continues the same run.
pub struct Processor {
    fields: Fields,
    options: ProcessorOptions,
    plan: RowPlan,
    shared: Mutex<Shared>,
    aggregation: Option<Mutex<Aggregation>>,
}

impl Processor {
    pub fn new(
        fields: Fields,
        options: ProcessorOptions,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Self, ProcessError> {
        check_layout(&fields)?;
        let name_of = |id: usize| -> Result<String, ProcessError> {
            fields
                .get(id)
                .map(|f| f.name.clone())
                .ok_or(ProcessError::UnknownField(id))
        };
        let computed = |id: usize| fields.get(id).is_some_and(|f| f.is_computed());

        let referenced = options
            .filters
            .iter()
            .map(|(id, _)| *id)
            .chain(options.unique.iter().copied())
            .chain(options.split)
            .chain(options.aggregate.iter().map(|(_, id)| *id))
            .chain(options.group_by);
        for id in referenced {
            name_of(id)?;
        }

        let (post_filters, pre_filters): (Vec<_>, Vec<_>) = options
            .filters
            .iter()
            .cloned()
            .partition(|(id, _)| computed(*id));
        let (post_unique, pre_unique): (Vec<_>, Vec<_>) = options.unique.iter().copied().partition(|id| computed(*id));

        let output_ids = fields.output_ids();
        let plan = RowPlan {
            input_width: fields.input_width(),
            pre_filters,
            post_filters,
            pre_unique,
            post_unique,
            output_header: fields.output_header(),
            input_header: fields.input_header(),
            output_ids,
        };

        let aggregation = if options.aggregate.is_empty() {
            None
        } else {
            let columns = options
                .aggregate
                .iter()
                .map(|(function, id)| {
                    Ok(AggregateColumn {
                        function: *function,
                        index: *id,
                        name: name_of(*id)?,
                    })
                })
                .collect::<Result<Vec<_>, ProcessError>>()?;
            let group_by = options
                .group_by
                .map(|id| name_of(id).map(|name| (id, name)))
                .transpose()?;
            Some(Mutex::new(Aggregation::new(group_by, columns)))
        };

        let router = OutputRouter::new(sink, options.max_open_handles);
        Ok(Self {
            fields,
            plan,
            shared: Mutex::new(Shared {
                uniques: UniqueSets::new(),
                router,
            }),
            aggregation,
            options,
        })
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    /// Header of written rows.
    pub fn output_header(&self) -> &[String] {
        &self.plan.output_header
    }

    /// Treat locations as already written, so they are appended to.
    ///
    /// Used when continuing work on outputs left by an earlier process.
    pub fn resume_outputs<I, S>(&self, locations: I) -> Result<(), ProcessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut shared = lock(&self.shared)?;
        for location in locations {
            shared.router.assume_written(location.as_ref());
        }
        Ok(())
    }

    /// Process every row of `input`.
    ///
    /// Input errors stop the run after open handles are closed. Cancelling
    /// through `cancel` ends the run early or aborts it.
    pub fn run<I>(&self, input: I, cancel: &CancelToken) -> Result<RunSummary, ProcessError>
    where
        I: IntoIterator<Item = Result<Vec<String>, ProcessError>>,
    {
        let started = Instant::now();
        let run = RunState::default();
        tracing::info!(
            threads = self.options.threads,
            computed = self.fields.computed().count(),
            "starting run"
        );

        let exhausted = if self.options.threads == 0 {
            self.run_sequential(input, cancel, &run)
        } else {
            self.run_parallel(input, cancel, &run)
        };

        self.finish(&run, exhausted, cancel, started)
    }

    /// Run the rows of a quarantine again through the same pipeline.
    ///
    /// The quarantine is emptied first; rows that fail again land in it
    /// anew.
    pub fn reprocess(&self, quarantine: Quarantine, cancel: &CancelToken) -> Result<RunSummary, ProcessError> {
        let rows = {
            let mut shared = lock(&self.shared)?;
            shared.router.forget(quarantine.location())?;
            shared.router.sink().drain(quarantine.location())?
        };
        // the quarantine starts with the input header, if there is one
        let skip = usize::from(!self.plan.input_header.is_empty());
        tracing::info!(
            quarantine = %quarantine,
            rows = rows.len().saturating_sub(skip),
            "reprocessing quarantine"
        );
        self.run(rows.into_iter().skip(skip).map(Ok), cancel)
    }

    fn run_sequential<I>(&self, input: I, cancel: &CancelToken, run: &RunState) -> bool
    where
        I: IntoIterator<Item = Result<Vec<String>, ProcessError>>,
    {
        for (line, item) in (1u64..).zip(input) {
            if cancel.is_cancelled() || run.stopped() {
                return false;
            }
            match item {
                Ok(cells) => self.handle(line, cells, run),
                Err(err) => {
                    run.fail(err);
                    return false;
                }
            }
        }
        true
    }

    fn run_parallel<I>(&self, input: I, cancel: &CancelToken, run: &RunState) -> bool
    where
        I: IntoIterator<Item = Result<Vec<String>, ProcessError>>,
    {
        let workers = self.options.threads;
        let (tx, rx) = crossbeam_channel::bounded::<(u64, Vec<String>)>(workers + QUEUE_SLACK);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let rx = rx.clone();
                scope.spawn(move || {
                    for (line, cells) in rx {
                        // drain without work once the run is aborted
                        if cancel.is_aborted() || run.failed() {
                            continue;
                        }
                        self.handle(line, cells, run);
                    }
                });
            }
            drop(rx);

            let mut exhausted = true;
            for (line, item) in (1u64..).zip(input) {
                if cancel.is_cancelled() || run.stopped() {
                    exhausted = false;
                    break;
                }
                let cells = match item {
                    Ok(cells) => cells,
                    Err(err) => {
                        run.fail(err);
                        exhausted = false;
                        break;
                    }
                };
                // blocks while the queue is full
                if tx.send((line, cells)).is_err() {
                    exhausted = false;
                    break;
                }
            }
            drop(tx);
            exhausted
        })
    }

    fn handle(&self, line: u64, cells: Vec<String>, run: &RunState) {
        if let Err(err) = self.process_row(line, &cells, run) {
            run.fail(err);
        }
    }

    fn process_row(&self, line: u64, cells: &[String], run: &RunState) -> Result<(), ProcessError> {
        let plan = &self.plan;
        Counters::add(&run.counters.read, 1);

        if cells.len() != plan.input_width {
            let reason = format!("expected {} cells, found {}", plan.input_width, cells.len());
            return self.quarantine(Quarantine::Invalid, cells, &Claims::new(), run, line, &reason);
        }

        if !plan.pre_filters.iter().all(|(id, f)| f.passes(&cells[*id])) {
            Counters::add(&run.counters.filtered, 1);
            return Ok(());
        }

        let pre_claims = if plan.pre_unique.is_empty() {
            Claims::new()
        } else {
            match lock(&self.shared)?.uniques.claim(&plan.pre_unique, cells) {
                Some(claims) => claims,
                None => {
                    Counters::add(&run.counters.duplicates, 1);
                    return Ok(());
                }
            }
        };

        let rows = match self.compute(cells) {
            Ok(rows) => rows,
            Err(err) => {
                let kind = quarantine_for(&err);
                return self.quarantine(kind, cells, &pre_claims, run, line, &err);
            }
        };

        let rows: Vec<Vec<String>> = rows
            .into_iter()
            .filter(|row| {
                let pass = plan.post_filters.iter().all(|(id, f)| f.passes(&row[*id]));
                if !pass {
                    Counters::add(&run.counters.filtered, 1);
                }
                pass
            })
            .collect();
        if rows.is_empty() {
            if !pre_claims.is_empty() {
                lock(&self.shared)?.uniques.release(&pre_claims);
            }
            return Ok(());
        }

        let mut shared = lock(&self.shared)?;
        let mut claims = pre_claims;
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if plan.post_unique.is_empty() {
                kept.push(row);
                continue;
            }
            match shared.uniques.claim(&plan.post_unique, &row) {
                Some(row_claims) => {
                    claims.extend(row_claims);
                    kept.push(row);
                }
                None => Counters::add(&run.counters.duplicates, 1),
            }
        }
        if kept.is_empty() {
            shared.uniques.release(&claims);
            return Ok(());
        }

        let mut routed = Vec::with_capacity(kept.len());
        for row in kept {
            let location = match self.options.split {
                None => Location::Output(self.options.output_name.clone()),
                Some(id) => match Location::from_split_value(&row[id]) {
                    Some(location) => location,
                    None => {
                        shared.uniques.release(&claims);
                        let reason = format!("no location for split value {:?}", row[id]);
                        return self.quarantine_locked(&mut shared, Quarantine::Unknown, cells, run, line, &reason);
                    }
                },
            };
            routed.push((location, row));
        }

        if let Some(aggregation) = &self.aggregation {
            let mut aggregation = lock(aggregation)?;
            if let Err(err) = routed.iter().try_for_each(|(_, row)| aggregation.validate(row)) {
                shared.uniques.release(&claims);
                return self.quarantine_locked(&mut shared, Quarantine::Invalid, cells, run, line, &err);
            }
            for (location, row) in &routed {
                if let Err(err) = aggregation.update(location.name(), row) {
                    tracing::error!(line, error = %err, "aggregate update failed after validation");
                }
            }
            Counters::add(&run.counters.aggregated, routed.len() as u64);
            return Ok(());
        }

        for (location, row) in &routed {
            let out: Vec<String> = plan.output_ids.iter().map(|&id| row[id].clone()).collect();
            shared.router.write(location.name(), &plan.output_header, &out)?;
        }
        Counters::add(&run.counters.written, routed.len() as u64);
        Ok(())
    }

    /// Apply every computation, expanding the row on multi-valued results.
    ///
    /// The result holds one row per combination, each indexed by field id.
    fn compute(&self, cells: &[String]) -> Result<Vec<Vec<String>>, ConvertError> {
        let mut rows = vec![cells.to_vec()];

        for (field, computation) in self.fields.computed() {
            let mut next = Vec::with_capacity(rows.len());
            // the same source value can repeat across expanded rows
            let mut seen: Vec<(String, Vec<String>)> = Vec::new();

            for row in rows {
                let value = &row[computation.source_field];
                let results = match seen.iter().find(|(v, _)| v == value) {
                    Some((_, results)) => results.clone(),
                    None => {
                        let results = computation.chain.apply(value)?;
                        seen.push((value.clone(), results.clone()));
                        results
                    }
                };
                if results.is_empty() {
                    return Err(ConvertError::InvalidInput(format!(
                        "{} has no value for {value:?}",
                        field.name
                    )));
                }
                for result in results {
                    let mut expanded = row.clone();
                    expanded.push(result);
                    next.push(expanded);
                }
            }
            rows = next;
        }

        Ok(rows)
    }

    fn quarantine(
        &self,
        kind: Quarantine,
        cells: &[String],
        claims: &Claims,
        run: &RunState,
        line: u64,
        reason: &dyn fmt::Display,
    ) -> Result<(), ProcessError> {
        let mut shared = lock(&self.shared)?;
        shared.uniques.release(claims);
        self.quarantine_locked(&mut shared, kind, cells, run, line, reason)
    }

    fn quarantine_locked(
        &self,
        shared: &mut Shared,
        kind: Quarantine,
        cells: &[String],
        run: &RunState,
        line: u64,
        reason: &dyn fmt::Display,
    ) -> Result<(), ProcessError> {
        tracing::debug!(line, quarantine = %kind, reason = %reason, "row quarantined");
        shared
            .router
            .write(kind.location(), &self.plan.input_header, cells)?;
        Counters::add(run.counters.quarantine(kind), 1);

        if kind == Quarantine::Invalid && self.options.debug {
            tracing::warn!(line, reason = %reason, "halting on invalid row");
            run.halt(line, reason.to_string());
        }
        Ok(())
    }

    fn flush_aggregation(&self, shared: &mut Shared, run: &RunState) -> Result<(), ProcessError> {
        let Some(aggregation) = &self.aggregation else {
            return Ok(());
        };
        let aggregation = lock(aggregation)?;
        let header = aggregation.header();

        for (location, rows) in aggregation.finish() {
            // aggregate outputs are rewritten whole on every flush
            shared.router.forget(&location)?;
            for row in &rows {
                shared.router.write(&location, &header, row)?;
            }
            Counters::add(&run.counters.written, rows.len() as u64);
        }
        Ok(())
    }

    fn finish(
        &self,
        run: &RunState,
        exhausted: bool,
        cancel: &CancelToken,
        started: Instant,
    ) -> Result<RunSummary, ProcessError> {
        let aborted = cancel.is_aborted();
        let mut shared = lock(&self.shared)?;

        let mut result = match run.take_fatal() {
            Some(err) => Err(err),
            None => Ok(()),
        };
        if !aborted && result.is_ok() {
            result = self.flush_aggregation(&mut shared, run);
        }
        let closed = shared.router.close_all();
        result?;
        closed?;

        let status = if aborted {
            RunStatus::Aborted
        } else if let Some((line, reason)) = run.take_halt() {
            RunStatus::Halted { line, reason }
        } else if !exhausted && cancel.state() == CancelState::EndEarly {
            RunStatus::EndedEarly
        } else {
            RunStatus::Completed
        };

        let counts = run.counters.snapshot();
        let quarantines = Quarantine::ALL
            .into_iter()
            .filter(|q| counts.quarantined(*q) > 0)
            .map(|kind| QuarantineReport {
                kind,
                location: kind.location().to_string(),
                rows: counts.quarantined(kind),
            })
            .collect();
        let outputs = shared
            .router
            .locations()
            .filter(|l| Quarantine::ALL.iter().all(|q| q.location() != *l))
            .map(str::to_string)
            .collect();

        let summary = RunSummary {
            status,
            counts,
            outputs,
            quarantines,
            duration: started.elapsed(),
        };
        tracing::info!(
            status = %summary.status,
            read = counts.read,
            written = counts.written,
            invalid = counts.invalid,
            unknown = counts.unknown,
            deferred = counts.deferred,
            "run finished"
        );
        Ok(summary)
    }
}

/// Input columns first, computations only reading earlier columns.
fn check_layout(fields: &Fields) -> Result<(), ProcessError> {
    let input_width = fields.input_width();
    for field in fields.iter() {
        match &field.computation {
            None if field.id >= input_width => {
                return Err(ProcessError::Layout(format!(
                    "input column {} follows a computed column",
                    field.name
                )));
            }
            Some(c) if c.source_field >= field.id => {
                return Err(ProcessError::Layout(format!(
                    "{} is computed from a later column",
                    field.name
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

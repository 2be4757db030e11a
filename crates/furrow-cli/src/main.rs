//! Furrow CLI - type-driven row transformation

mod catalog;
mod config;
mod errors;
mod input;
mod logging;
mod state;

use anyhow::{Context, Result, anyhow, bail};
use catalog::{LookupSources, Setup};
use clap::{Args, Parser, Subcommand};
use config::Config;
use furrow_core::{
    AggregateFn, AggregateSpec, CancelState, CancelToken, Catalog, ColumnRef, CsvDirectorySink,
    FieldRequest, Fields, Filter, Identifier, Operation, Processor, Quarantine, Resolver,
    RunStatus, RunSummary, SavedState, Settings, StateStore, TypeGroup,
};
use indicatif::{ProgressBar, ProgressStyle};
use input::CsvInput;
use state::JsonStateStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Verbosity level for output.
#[derive(Clone, Copy, PartialEq)]
enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    fn info(self, msg: &str) {
        if !matches!(self, Verbosity::Quiet) {
            println!("{msg}");
        }
    }

    fn debug(self, msg: &str) {
        if matches!(self, Verbosity::Verbose) {
            println!("[debug] {msg}");
        }
    }
}

#[derive(Parser)]
#[command(name = "furrow")]
#[command(about = "Type-driven row transformation", long_about = None)]
struct Cli {
    /// Verbose output (show debug info)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log filter, e.g. "furrow_core=debug" (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Config file (default: ~/.config/furrow/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Disable a type group: general, external or custom
    #[arg(long = "disable", global = true, value_name = "GROUP", value_parser = catalog::parse_group)]
    disabled_groups: Vec<TypeGroup>,

    /// Lookup source: country=<file.csv>, asn=<file.csv> or dns
    #[arg(long = "lookup", global = true, value_name = "KIND[=PATH]")]
    lookups: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List types and conversions
    Types,

    /// Show the conversion path between two types
    Plan {
        /// Source type
        from: String,
        /// Target type
        to: String,
        /// Parameter for a parameterized hop, in path order
        #[arg(short, long = "param", value_name = "VALUE")]
        params: Vec<String>,
    },

    /// Guess the type of every column of a CSV file
    Identify {
        /// Input file
        input: PathBuf,
        #[command(flatten)]
        csv: CsvArgs,
    },

    /// Stream a CSV file through filters, computations and outputs
    Run {
        /// Input file
        input: PathBuf,
        #[command(flatten)]
        csv: CsvArgs,
        #[command(flatten)]
        pipeline: PipelineArgs,
        /// Directory receiving output files and run state
        #[arg(short, long, default_value = "furrow-out")]
        output_dir: PathBuf,
    },

    /// Run the rows of a quarantine from an earlier run again
    Reprocess {
        /// Output directory of the earlier run
        output_dir: PathBuf,
        /// Quarantine to reprocess: invalid, unknown or deferred
        quarantine: Quarantine,
        /// Worker threads (0 processes rows in order on one thread)
        #[arg(short = 'j', long)]
        threads: Option<usize>,
    },
}

#[derive(Args)]
struct CsvArgs {
    /// Field delimiter (guessed from the first line when omitted)
    #[arg(short, long)]
    delimiter: Option<char>,

    /// The first line is data, not a header
    #[arg(long)]
    no_header: bool,

    /// Rows read ahead to identify column types
    #[arg(long, default_value_t = input::DEFAULT_SAMPLE_SIZE)]
    sample: usize,
}

impl CsvArgs {
    fn open(&self, path: &Path) -> Result<CsvInput<std::io::BufReader<std::fs::File>>> {
        let delimiter = self.delimiter.map(delimiter_byte).transpose()?;
        CsvInput::open(path, delimiter, !self.no_header, self.sample)
    }
}

#[derive(Args)]
struct PipelineArgs {
    /// Settings file (YAML, TOML, or JSON)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Named settings from the config file
    #[arg(long, conflicts_with = "settings")]
    preset: Option<String>,

    /// Computed column: target[:column[:source_type[:parameter]]]
    #[arg(short, long = "field", value_name = "SPEC")]
    fields: Vec<String>,

    /// Read a column as a given type: column=type
    #[arg(long = "type", value_name = "COLUMN=TYPE")]
    types: Vec<String>,

    /// Keep only rows whose column has this value
    #[arg(long, value_name = "COLUMN=VALUE")]
    include: Vec<String>,

    /// Drop rows whose column has this value
    #[arg(long, value_name = "COLUMN=VALUE")]
    exclude: Vec<String>,

    /// Keep only the first row for each value of a column
    #[arg(short, long, value_name = "COLUMN")]
    unique: Vec<String>,

    /// Write rows to one file per value of a column
    #[arg(long, value_name = "COLUMN")]
    split: Option<String>,

    /// Aggregate a column: fn:column (count, sum, avg, min, max, list, set)
    #[arg(short, long = "aggregate", value_name = "FN:COLUMN")]
    aggregates: Vec<String>,

    /// Group aggregates by a column
    #[arg(long, value_name = "COLUMN")]
    group_by: Option<String>,

    /// Leave a column out of written rows
    #[arg(long, value_name = "COLUMN")]
    hide: Vec<String>,

    /// Worker threads (0 processes rows in order on one thread)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Most output files kept open at once
    #[arg(long)]
    max_open_handles: Option<usize>,

    /// Stop at the first invalid row
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config file
    let config = if let Some(ref path) = cli.config {
        Config::load_from_path(Some(path.clone()))
    } else {
        Config::load()
    };

    let verbose = cli.verbose || config.defaults.verbose;
    let quiet = cli.quiet || config.defaults.quiet;
    let level = cli
        .log_level
        .clone()
        .or_else(|| config.defaults.log_level.clone())
        .unwrap_or_else(|| logging::default_level(verbose, quiet).to_string());
    logging::init(&level);
    let verbosity = Verbosity::from_flags(verbose, quiet);

    let mut disabled = config.defaults.disabled_groups.clone();
    disabled.extend(cli.disabled_groups.iter().copied());
    let sources = LookupSources::new(&config.lookups, &cli.lookups)?;
    if !sources.is_empty() {
        tracing::debug!(?sources, "external lookups configured");
    }
    let setup = Setup::build(&sources, &disabled)?;

    match cli.command {
        Commands::Types => cmd_types(&setup.catalog, verbosity),
        Commands::Plan { from, to, params } => cmd_plan(&setup.catalog, &from, &to, &params, verbosity),
        Commands::Identify { input, csv } => cmd_identify(&setup.catalog, &input, &csv, verbosity),
        Commands::Run {
            input,
            csv,
            pipeline,
            output_dir,
        } => {
            let settings = build_settings(&pipeline, &config)?;
            cmd_run(&setup, &input, &csv, settings, &output_dir, verbosity)
        }
        Commands::Reprocess {
            output_dir,
            quarantine,
            threads,
        } => cmd_reprocess(&setup, &output_dir, quarantine, threads, verbosity),
    }
}

fn cmd_types(catalog: &Catalog, v: Verbosity) -> Result<()> {
    v.info("Types:\n");
    for decl in catalog.types() {
        let mut tags = vec![decl.group.to_string()];
        if decl.private {
            tags.push("private".into());
        }
        if decl.disabled {
            tags.push("disabled".into());
        }
        v.info(&format!(
            "  {:<16} [{}]  {}",
            decl.name,
            tags.join(", "),
            decl.description
        ));
        if !decl.usual_names.is_empty() {
            v.debug(&format!("usual names of {}: {}", decl.name, decl.usual_names.join(", ")));
        }
    }

    v.info("\nConversions:\n");
    for edge in catalog.edges() {
        v.info(&format!(
            "  {} -> {} ({})",
            edge.source,
            edge.target,
            edge.operation.kind()
        ));
    }
    for edge in catalog.disabled_edges() {
        v.info(&format!(
            "  {} -> {} ({}, disabled)",
            edge.source,
            edge.target,
            edge.operation.kind()
        ));
    }

    v.info(&format!(
        "\nTotal: {} types, {} conversions",
        catalog.len(),
        catalog.edges().count()
    ));
    Ok(())
}

fn cmd_plan(catalog: &Catalog, from: &str, to: &str, params: &[String], v: Verbosity) -> Result<()> {
    v.info(&format!("Planning: {} -> {}", from, to));
    v.info("");

    let resolver = Resolver::new(catalog);
    let path = resolver
        .plan(from, to)
        .map_err(|e| anyhow!("{}", errors::plan_error(&e, catalog)))?;

    for (i, hop) in path.hops.iter().enumerate() {
        let mut line = format!(
            "  {}. {} -> {} ({})",
            i + 1,
            hop.source,
            hop.target,
            hop.operation.kind()
        );
        if let Operation::Parameterized(op) = &hop.operation {
            line.push_str(&format!(": {}", op.prompt()));
            let choices = op.choices();
            if !choices.is_empty() {
                line.push_str(&format!(" [{}]", choices.join(", ")));
            }
            if let Some(default) = op.default_parameter() {
                line.push_str(&format!(" (default: {default})"));
            }
        }
        v.info(&line);
    }
    if path.hops.is_empty() {
        v.info("  (same type, nothing to convert)");
    }

    let chain = path
        .resolve(params)
        .map_err(|e| anyhow!("{}", errors::plan_error(&e, catalog)))?;
    if !chain.parameters.is_empty() {
        v.info(&format!("\nParameters: {}", chain.parameters.join(", ")));
    }
    v.info(&format!("\nTotal weight: {}", path.weight));
    Ok(())
}

fn cmd_identify(catalog: &Catalog, path: &Path, csv: &CsvArgs, v: Verbosity) -> Result<()> {
    let input = csv.open(path)?;
    let identifier = Identifier::new(catalog);
    let fields = identifier.identify_columns(input.header.as_deref(), &input.sample);
    v.debug(&format!(
        "{} sample rows, delimiter {:?}",
        input.sample.len(),
        input.delimiter as char
    ));

    v.info(&format!("Columns of {}:\n", path.display()));
    for (position, field) in fields.iter().enumerate() {
        let candidates = field
            .candidates
            .iter()
            .map(|(name, score)| format!("{name} ({score})"))
            .collect::<Vec<_>>()
            .join(", ");
        let candidates = if candidates.is_empty() {
            "-".to_string()
        } else {
            candidates
        };
        v.info(&format!("  {:>2}. {:<20} {}", position + 1, field.name, candidates));

        if let Some(best) = field.best_type() {
            let targets = identifier.resolver().reachable_targets(best);
            if !targets.is_empty() {
                v.info(&format!("      computable: {}", targets.join(", ")));
            }
        }
    }
    Ok(())
}

fn cmd_run(
    setup: &Setup,
    path: &Path,
    csv: &CsvArgs,
    settings: Settings,
    output_dir: &Path,
    v: Verbosity,
) -> Result<()> {
    let catalog = &setup.catalog;
    let input = csv.open(path)?;
    let identifier = Identifier::new(catalog);
    let fields = identifier.identify_columns(input.header.as_deref(), &input.sample);
    let (fields, options) = settings
        .apply(&identifier, fields)
        .map_err(|e| anyhow!("{}", errors::settings_error(&e, catalog)))?;

    for (field, computation) in fields.computed() {
        v.debug(&format!(
            "{}: {}",
            field.name,
            computation.path.join(" -> ")
        ));
    }

    let sink = CsvDirectorySink::new(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?
        .delimiter(input.delimiter);
    let store = JsonStateStore::in_dir(output_dir);
    if store.path().exists() {
        tracing::warn!(dir = %output_dir.display(), "overwriting an earlier run");
        // lookup answers stay valid across runs
        match store.load_previous_state() {
            Ok(Some(previous)) => setup.restore(&previous),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "ignoring unreadable run state"),
        }
        for q in Quarantine::ALL {
            let stale = sink.path_for(q.location());
            if stale.exists() {
                std::fs::remove_file(&stale)
                    .with_context(|| format!("Failed to remove {}", stale.display()))?;
            }
        }
    }

    let mut state = SavedState {
        input: Some(path.display().to_string()),
        has_header: !csv.no_header,
        delimiter: Some(input.delimiter as char),
        settings: pin_fields(&settings, &fields),
        caches: Default::default(),
    };
    store.save_state(&state).context("Failed to save run state")?;

    let processor = Processor::new(fields, options, Arc::new(sink))?;
    let cancel = CancelToken::new();
    install_interrupt(&cancel)?;

    let pb = progress(v);
    let rows = input.rows().inspect(|_| pb.inc(1));
    let summary = processor.run(rows, &cancel);
    pb.finish_and_clear();

    setup.export(&mut state);
    store.save_state(&state).context("Failed to save run state")?;
    report(&summary?, output_dir, v)
}

fn cmd_reprocess(
    setup: &Setup,
    output_dir: &Path,
    quarantine: Quarantine,
    threads: Option<usize>,
    v: Verbosity,
) -> Result<()> {
    let store = JsonStateStore::in_dir(output_dir);
    let mut state = store
        .load_previous_state()
        .context("Failed to load run state")?
        .with_context(|| format!("No earlier run found in {}", output_dir.display()))?;
    if !state.settings.aggregate.is_empty() {
        bail!(
            "The earlier run aggregated its rows; aggregates are not kept between runs.\n\
             Run the input again instead."
        );
    }
    setup.restore(&state);

    let delimiter = delimiter_byte(state.delimiter.unwrap_or(','))?;
    let sink = CsvDirectorySink::new(output_dir)?.delimiter(delimiter);
    let quarantine_path = sink.path_for(quarantine.location());
    if !quarantine_path.exists() {
        v.info(&format!("Nothing to reprocess: no {} rows", quarantine));
        return Ok(());
    }

    let header = input::read_header(&quarantine_path, delimiter)?;
    let identifier = Identifier::new(&setup.catalog);
    let mut settings = state.settings.clone();
    if let Some(threads) = threads {
        settings.threads = threads;
    }
    let (fields, options) = settings
        .apply(&identifier, Fields::from_header(header))
        .map_err(|e| anyhow!("{}", errors::settings_error(&e, &setup.catalog)))?;

    let processor = Processor::new(fields, options, Arc::new(sink))?;
    processor.resume_outputs(existing_outputs(output_dir)?)?;

    let cancel = CancelToken::new();
    install_interrupt(&cancel)?;
    let summary = processor.reprocess(quarantine, &cancel);

    setup.export(&mut state);
    store.save_state(&state).context("Failed to save run state")?;
    report(&summary?, output_dir, v)
}

/// Fix every computed column to the source column, type and parameters the
/// run resolved, so a later process computes it the same way.
fn pin_fields(settings: &Settings, fields: &Fields) -> Settings {
    let mut pinned = settings.clone();
    for (request, (field, computation)) in pinned.fields.iter_mut().zip(fields.computed()) {
        request.column = Some(ColumnRef::Index(computation.source_field + 1));
        request.source_type = Some(computation.source_type.clone());
        request.parameters = computation.chain.parameters.clone();
        request.name = Some(field.name.clone());
    }
    pinned
}

/// Stems of the CSV files already in an output directory.
fn existing_outputs(dir: &Path) -> Result<Vec<String>> {
    let mut stems = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "csv")
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        {
            stems.push(stem.to_string());
        }
    }
    Ok(stems)
}

/// First Ctrl-C ends the run early, the second aborts it.
fn install_interrupt(cancel: &CancelToken) -> Result<()> {
    let cancel = cancel.clone();
    ctrlc::set_handler(move || match cancel.escalate() {
        CancelState::EndEarly => {
            eprintln!("\nFinishing rows in flight; press Ctrl-C again to abort")
        }
        CancelState::Abort => eprintln!("\nAborting"),
        CancelState::Running => {}
    })
    .context("Failed to install Ctrl-C handler")
}

fn progress(v: Verbosity) -> ProgressBar {
    if matches!(v, Verbosity::Quiet) {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {pos} rows [{elapsed}] {per_sec}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn report(summary: &RunSummary, output_dir: &Path, v: Verbosity) -> Result<()> {
    v.info(summary.to_string().trim_end());
    if summary.counts.aggregated > 0 {
        v.info(&format!("aggregated: {} row(s)", summary.counts.aggregated));
    }
    v.info(&format!("Output: {}", output_dir.display()));
    for q in &summary.quarantines {
        v.info(&format!(
            "Reprocess {} rows with: furrow reprocess {} {}",
            q.kind,
            output_dir.display(),
            q.kind
        ));
    }

    match &summary.status {
        RunStatus::Halted { .. } => bail!("Run {}", summary.status),
        RunStatus::Aborted => bail!("Run aborted; outputs may be incomplete"),
        RunStatus::Completed | RunStatus::EndedEarly => Ok(()),
    }
}

/// Merge the settings file or preset with command line flags.
///
/// Flags add to the document; scalar flags override it.
fn build_settings(args: &PipelineArgs, config: &Config) -> Result<Settings> {
    let (mut settings, from_document) = match (&args.settings, &args.preset) {
        (Some(path), _) => {
            let data = std::fs::read(path).context("Failed to read settings file")?;
            let settings = Settings::from_bytes(&data, Some(&path.to_string_lossy()))
                .context("Failed to parse settings")?;
            (settings, true)
        }
        (None, Some(name)) => {
            let settings = config.get_preset(name).with_context(|| {
                format!(
                    "Unknown preset '{}'. Available: {}",
                    name,
                    config.preset_names().join(", ")
                )
            })?;
            (settings, true)
        }
        (None, None) => (Settings::new(), false),
    };

    for spec in &args.fields {
        settings.fields.push(parse_field(spec)?);
    }
    for spec in &args.types {
        let (column, type_name) = split_pair(spec, '=', "--type", "COLUMN=TYPE")?;
        settings = settings.column_type(column, type_name);
    }
    for spec in &args.include {
        let (column, value) = split_pair(spec, '=', "--include", "COLUMN=VALUE")?;
        settings.filters.push(Filter::include(column, value));
    }
    for spec in &args.exclude {
        let (column, value) = split_pair(spec, '=', "--exclude", "COLUMN=VALUE")?;
        settings.filters.push(Filter::exclude(column, value));
    }
    settings.unique.extend(args.unique.iter().map(|c| column_ref(c)));
    if let Some(column) = &args.split {
        settings.split = Some(column_ref(column));
    }
    for spec in &args.aggregates {
        let (function, column) = split_pair(spec, ':', "--aggregate", "FN:COLUMN")?;
        let function: AggregateFn = function.to_string().parse()?;
        settings.aggregate.push(AggregateSpec::new(function, column));
    }
    if let Some(column) = &args.group_by {
        settings.group_by = Some(column_ref(column));
    }
    settings.hide.extend(args.hide.iter().map(|c| column_ref(c)));

    match (args.threads, config.defaults.threads) {
        (Some(threads), _) => settings.threads = threads,
        (None, Some(threads)) if !from_document => settings.threads = threads,
        _ => {}
    }
    match (args.max_open_handles, config.defaults.max_open_handles) {
        (Some(max), _) => settings.max_open_handles = max,
        (None, Some(max)) if !from_document => settings.max_open_handles = max,
        _ => {}
    }
    settings.debug |= args.debug;
    Ok(settings)
}

/// Parse `target[:column[:source_type[:parameter]]]`.
fn parse_field(spec: &str) -> Result<FieldRequest> {
    let mut parts = spec.splitn(4, ':');
    let target = parts.next().unwrap_or_default().trim();
    if target.is_empty() {
        bail!("--field needs a target type: {spec:?}");
    }

    let mut request = FieldRequest::new(target);
    if let Some(column) = parts.next().filter(|s| !s.trim().is_empty()) {
        request = request.column(column_ref(column));
    }
    if let Some(source_type) = parts.next().filter(|s| !s.trim().is_empty()) {
        request = request.source_type(source_type.trim());
    }
    if let Some(parameter) = parts.next() {
        request = request.parameter(parameter);
    }
    Ok(request)
}

fn split_pair<'a>(spec: &'a str, sep: char, flag: &str, shape: &str) -> Result<(ColumnRef, &'a str)> {
    let (column, value) = spec
        .split_once(sep)
        .with_context(|| format!("{flag} expects {shape}, got {spec:?}"))?;
    Ok((column_ref(column), value))
}

fn column_ref(s: &str) -> ColumnRef {
    match s.parse() {
        Ok(column) => column,
        Err(never) => match never {},
    }
}

fn delimiter_byte(c: char) -> Result<u8> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .with_context(|| format!("Delimiter must be a single ASCII character, got {c:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> PipelineArgs {
        PipelineArgs {
            settings: None,
            preset: None,
            fields: Vec::new(),
            types: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            unique: Vec::new(),
            split: None,
            aggregates: Vec::new(),
            group_by: None,
            hide: Vec::new(),
            threads: None,
            max_open_handles: None,
            debug: false,
        }
    }

    #[test]
    fn test_parse_field() {
        let request = parse_field("hash:2:plaintext:sha512").unwrap();
        assert_eq!(request.target, "hash");
        assert_eq!(request.column, Some(ColumnRef::Index(2)));
        assert_eq!(request.source_type.as_deref(), Some("plaintext"));
        assert_eq!(request.parameters, vec!["sha512"]);

        let request = parse_field("reg::plaintext:a:(b)").unwrap();
        assert_eq!(request.column, None);
        assert_eq!(request.parameters, vec!["a:(b)"]);

        assert!(parse_field(":src").is_err());
    }

    #[test]
    fn test_flags_build_settings() {
        let mut args = pipeline();
        args.fields = vec!["country:src".into()];
        args.include = vec!["proto=tcp".into()];
        args.unique = vec!["src".into()];
        args.aggregates = vec!["sum:bytes".into()];
        args.group_by = Some("country".into());

        let settings = build_settings(&args, &Config::default()).unwrap();
        assert_eq!(settings.fields[0].column, Some(ColumnRef::Name("src".into())));
        assert_eq!(settings.filters, vec![Filter::include("proto", "tcp")]);
        assert_eq!(settings.unique, vec![ColumnRef::Name("src".into())]);
        assert_eq!(settings.aggregate[0].function, AggregateFn::Sum);
        assert_eq!(settings.group_by, Some(ColumnRef::Name("country".into())));
    }

    #[test]
    fn test_thread_precedence() {
        let config: Config = toml::from_str("[defaults]\nthreads = 4").unwrap();
        let mut args = pipeline();
        assert_eq!(build_settings(&args, &config).unwrap().threads, 4);

        args.threads = Some(2);
        assert_eq!(build_settings(&args, &config).unwrap().threads, 2);
    }

    #[test]
    fn test_bad_flags() {
        let mut args = pipeline();
        args.aggregates = vec!["median:bytes".into()];
        assert!(build_settings(&args, &Config::default()).is_err());

        let mut args = pipeline();
        args.include = vec!["proto".into()];
        assert!(build_settings(&args, &Config::default()).is_err());
    }

    #[test]
    fn test_delimiter_byte() {
        assert_eq!(delimiter_byte(';').unwrap(), b';');
        assert!(delimiter_byte('§').is_err());
    }
}

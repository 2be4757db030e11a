//! End-to-end tests of the row processing pipeline.

use furrow_core::{
    AggregateFn, AggregateSpec, CancelToken, Catalog, ConvertError, FieldRequest, Fields, Filter,
    Identifier, MemorySink, Operation, ProcessError, Processor, Quarantine, RunStatus, Settings,
    TypeDecl, TypeGroup,
};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

fn rows(cells: &[&[&str]]) -> Vec<Vec<String>> {
    cells.iter().map(|r| row(r)).collect()
}

fn input(cells: &[&[&str]]) -> Vec<Result<Vec<String>, ProcessError>> {
    rows(cells).into_iter().map(Ok).collect()
}

fn header(names: &[&str]) -> Vec<String> {
    row(names)
}

/// Build a processor from settings, identifying columns from the input.
fn processor(
    catalog: &Catalog,
    names: &[&str],
    sample: &[&[&str]],
    settings: Settings,
    sink: &MemorySink,
) -> Processor {
    let identifier = Identifier::new(catalog);
    let fields = identifier.identify_columns(Some(&header(names)), &rows(sample));
    let (fields, options) = settings.apply(&identifier, fields).unwrap();
    Processor::new(fields, options, Arc::new(sink.clone())).unwrap()
}

fn parts_catalog() -> Catalog {
    let mut b = Catalog::builder();
    b.register(TypeDecl::new("plaintext")).unwrap();
    b.register(TypeDecl::new("parts")).unwrap();
    b.register_edge(
        "plaintext",
        "parts",
        Operation::expand(|v| {
            Ok(v.split(';')
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect())
        }),
    )
    .unwrap();
    b.build()
}

/// ip -> country through a fixed table, with a switchable quota.
fn geo_catalog(quota: Arc<AtomicBool>) -> Catalog {
    let mut b = Catalog::builder();
    b.register(TypeDecl::new("plaintext")).unwrap();
    b.register(
        TypeDecl::new("ip")
            .usual_names(["ip"])
            .identify(|s| s.parse::<Ipv4Addr>().is_ok()),
    )
    .unwrap();
    b.register(TypeDecl::new("country").group(TypeGroup::External))
        .unwrap();
    b.register_edge(
        "ip",
        "country",
        Operation::map(move |v| {
            let ip: Ipv4Addr = v
                .parse()
                .map_err(|_| ConvertError::invalid(format!("not an IPv4 address: {v}")))?;
            match ip.octets()[0] {
                1 => Ok("cz".to_string()),
                2 => Ok("de".to_string()),
                5 if quota.load(Ordering::SeqCst) => {
                    Err(ConvertError::QuotaExceeded("too many requests".into()))
                }
                5 => Ok("at".to_string()),
                _ => Err(ConvertError::Unknown(format!("no record for {v}"))),
            }
        }),
    )
    .unwrap();
    b.build()
}

#[test]
fn test_fan_out_produces_cartesian_product() {
    let catalog = parts_catalog();
    let sink = MemorySink::new();
    let settings = Settings::new()
        .field(FieldRequest::new("parts").column(1usize).name("left"))
        .field(FieldRequest::new("parts").column(2usize).name("right"));
    let processor = processor(&catalog, &["l", "r"], &[&["a;b", "x;y;z"]], settings, &sink);

    let summary = processor
        .run(input(&[&["a;b", "x;y;z"]]), &CancelToken::new())
        .unwrap();

    assert_eq!(summary.counts.written, 6);
    let mut written = sink.rows("output");
    assert_eq!(written.remove(0), header(&["l", "r", "left", "right"]));
    let mut combos: Vec<(String, String)> = written
        .iter()
        .map(|r| (r[2].clone(), r[3].clone()))
        .collect();
    combos.sort();
    combos.dedup();
    assert_eq!(combos.len(), 6);
}

#[test]
fn test_empty_fan_out_invalidates_row() {
    let catalog = parts_catalog();
    let sink = MemorySink::new();
    let settings = Settings::new().field(FieldRequest::new("parts").column(1usize));
    let processor = processor(&catalog, &["v"], &[&["a"]], settings, &sink);

    let summary = processor
        .run(input(&[&[";;"], &["a;b"]]), &CancelToken::new())
        .unwrap();

    assert_eq!(summary.counts.invalid, 1);
    assert_eq!(summary.counts.written, 2);
    assert_eq!(sink.rows("_invalid"), rows(&[&["v"], &[";;"]]));
}

#[test]
fn test_filter_runs_before_unique() {
    let catalog = parts_catalog();
    let sink = MemorySink::new();
    let settings = Settings::new()
        .unique(1usize)
        .filter(Filter::include(2usize, "1"));
    let processor = processor(&catalog, &["k", "v"], &[], settings, &sink);

    let summary = processor
        .run(
            input(&[&["a", "1"], &["a", "2"], &["b", "1"]]),
            &CancelToken::new(),
        )
        .unwrap();

    assert_eq!(sink.rows("output"), rows(&[&["k", "v"], &["a", "1"], &["b", "1"]]));
    assert_eq!(summary.counts.filtered, 1);
    assert_eq!(summary.counts.duplicates, 0);
}

#[test]
fn test_filtered_row_does_not_claim_unique_value() {
    let catalog = parts_catalog();
    let sink = MemorySink::new();
    let settings = Settings::new()
        .unique(1usize)
        .filter(Filter::include(2usize, "1"));
    let processor = processor(&catalog, &["k", "v"], &[], settings, &sink);

    processor
        .run(input(&[&["a", "2"], &["a", "1"], &["a", "1"]]), &CancelToken::new())
        .unwrap();

    assert_eq!(sink.rows("output"), rows(&[&["k", "v"], &["a", "1"]]));
}

#[test]
fn test_post_unique_on_computed_column() {
    let catalog = parts_catalog();
    let sink = MemorySink::new();
    let settings = Settings::new()
        .field(FieldRequest::new("parts").column(1usize))
        .unique("parts");
    let processor = processor(&catalog, &["v"], &[], settings, &sink);

    let summary = processor
        .run(input(&[&["a;b"], &["b;c"]]), &CancelToken::new())
        .unwrap();

    // expanded rows are checked one by one: "b" from the second row repeats
    assert_eq!(summary.counts.written, 3);
    assert_eq!(summary.counts.duplicates, 1);
}

#[test]
fn test_post_filter_drops_some_expanded_rows() {
    let catalog = parts_catalog();
    let sink = MemorySink::new();
    let settings = Settings::new()
        .field(FieldRequest::new("parts").column(1usize))
        .filter(Filter::include("parts", "x"));
    let processor = processor(&catalog, &["v"], &[], settings, &sink);

    let summary = processor
        .run(input(&[&["x;y;z"]]), &CancelToken::new())
        .unwrap();

    assert_eq!(summary.counts.written, 1);
    assert_eq!(summary.counts.filtered, 2);
    assert_eq!(sink.rows("output"), rows(&[&["v", "parts"], &["x;y;z", "x"]]));
}

#[test]
fn test_post_filter_drops_every_expanded_row() {
    let catalog = parts_catalog();
    let sink = MemorySink::new();
    let settings = Settings::new()
        .field(FieldRequest::new("parts").column(1usize))
        .filter(Filter::include("parts", "x"));
    let processor = processor(&catalog, &["v"], &[], settings, &sink);

    let summary = processor
        .run(input(&[&["y;z"]]), &CancelToken::new())
        .unwrap();

    assert_eq!(summary.counts.written, 0);
    assert_eq!(summary.counts.filtered, 2);
    assert_eq!(summary.counts.invalid, 0);
    assert!(sink.rows("output").is_empty());
}

#[test]
fn test_post_filtered_row_gives_back_input_unique_value() {
    let catalog = parts_catalog();
    let sink = MemorySink::new();
    let settings = Settings::new()
        .field(FieldRequest::new("parts").column(2usize))
        .unique(1usize)
        .filter(Filter::include("parts", "x"));
    let processor = processor(&catalog, &["k", "v"], &[], settings, &sink);

    let summary = processor
        .run(input(&[&["a", "y"], &["a", "x"]]), &CancelToken::new())
        .unwrap();

    assert_eq!(summary.counts.filtered, 1);
    assert_eq!(summary.counts.duplicates, 0);
    assert_eq!(summary.counts.written, 1);
    assert_eq!(
        sink.rows("output"),
        rows(&[&["k", "v", "parts"], &["a", "x", "x"]])
    );
}

#[test]
fn test_row_with_only_computed_duplicates_gives_back_input_unique_value() {
    let catalog = parts_catalog();
    let sink = MemorySink::new();
    let settings = Settings::new()
        .field(FieldRequest::new("parts").column(2usize))
        .unique(1usize)
        .unique("parts");
    let processor = processor(&catalog, &["k", "v"], &[], settings, &sink);

    let summary = processor
        .run(
            input(&[&["a", "x"], &["b", "x"], &["b", "y"]]),
            &CancelToken::new(),
        )
        .unwrap();

    // "b" was not kept by the second row, so the third row may use it
    assert_eq!(summary.counts.duplicates, 1);
    assert_eq!(summary.counts.written, 2);
    assert_eq!(
        sink.rows("output"),
        rows(&[&["k", "v", "parts"], &["a", "x", "x"], &["b", "y", "y"]])
    );
}

#[test]
fn test_end_to_end_split_by_country() {
    let catalog = geo_catalog(Arc::new(AtomicBool::new(false)));
    let sink = MemorySink::new();
    let data: &[&[&str]] = &[&["1.2.3.4", "x"], &["bad-ip", "y"]];
    let settings = Settings::new()
        .field(FieldRequest::new("country").column(1usize).source_type("ip"))
        .split("country");
    let processor = processor(&catalog, &["ip", "note"], data, settings, &sink);

    let summary = processor.run(input(data), &CancelToken::new()).unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.counts.invalid, 1);
    assert_eq!(summary.outputs, vec!["cz"]);
    assert_eq!(
        sink.rows("cz"),
        rows(&[&["ip", "note", "country"], &["1.2.3.4", "x", "cz"]])
    );
    assert_eq!(sink.rows("_invalid"), rows(&[&["ip", "note"], &["bad-ip", "y"]]));
    assert_eq!(summary.quarantines[0].kind, Quarantine::Invalid);
    assert!(summary.to_string().contains("invalid: 1 row(s) in _invalid"));
}

#[test]
fn test_unknown_and_deferred_rows_are_reprocessed() {
    let quota = Arc::new(AtomicBool::new(true));
    let catalog = geo_catalog(quota.clone());
    let sink = MemorySink::new();
    let data: &[&[&str]] = &[&["1.1.1.1"], &["5.5.5.5"], &["9.9.9.9"], &["5.5.5.5"]];
    let settings = Settings::new()
        .field(FieldRequest::new("country"))
        .unique("ip")
        .split("country");
    let processor = processor(&catalog, &["ip"], data, settings, &sink);

    let first = processor.run(input(data), &CancelToken::new()).unwrap();
    assert_eq!(first.counts.written, 1);
    assert_eq!(first.counts.unknown, 1);
    // the deferred row gave its unique value back, so the repeat was admitted
    // and deferred as well
    assert_eq!(first.counts.deferred, 2);
    assert_eq!(first.counts.duplicates, 0);
    assert_eq!(sink.rows("_deferred").len(), 3);

    quota.store(false, Ordering::SeqCst);
    let second = processor
        .reprocess(Quarantine::Deferred, &CancelToken::new())
        .unwrap();

    assert_eq!(second.counts.read, 2);
    assert_eq!(second.counts.written, 1);
    assert_eq!(second.counts.duplicates, 1);
    assert!(sink.rows("_deferred").is_empty());
    assert_eq!(sink.rows("at"), rows(&[&["ip", "country"], &["5.5.5.5", "at"]]));

    // unknown rows stay unknown, and land in a fresh quarantine
    let third = processor
        .reprocess(Quarantine::Unknown, &CancelToken::new())
        .unwrap();
    assert_eq!(third.counts.unknown, 1);
    assert_eq!(sink.rows("_unknown"), rows(&[&["ip"], &["9.9.9.9"]]));
}

#[test]
fn test_grouped_aggregation_with_total() {
    let catalog = geo_catalog(Arc::new(AtomicBool::new(false)));
    let sink = MemorySink::new();
    let data: &[&[&str]] = &[&["1.0.0.1", "10"], &["2.0.0.1", "5"], &["1.0.0.2", "20"]];
    let settings = Settings::new()
        .field(FieldRequest::new("country").column(1usize))
        .aggregate(AggregateSpec::new(AggregateFn::Count, "ip"))
        .aggregate(AggregateSpec::new(AggregateFn::Sum, "bytes"))
        .group_by("country");
    let processor = processor(&catalog, &["ip", "bytes"], data, settings, &sink);

    let summary = processor.run(input(data), &CancelToken::new()).unwrap();

    assert_eq!(summary.counts.aggregated, 3);
    assert_eq!(
        sink.rows("output"),
        rows(&[
            &["country", "count(ip)", "sum(bytes)"],
            &["cz", "2", "30"],
            &["de", "1", "5"],
            &["total", "3", "35"],
        ])
    );
}

#[test]
fn test_non_numeric_aggregate_value_is_invalid() {
    let catalog = parts_catalog();
    let sink = MemorySink::new();
    let settings = Settings::new().aggregate(AggregateSpec::new(AggregateFn::Avg, 1usize));
    let processor = processor(&catalog, &["n"], &[], settings, &sink);

    let summary = processor
        .run(input(&[&["1"], &["x"], &["2"]]), &CancelToken::new())
        .unwrap();

    assert_eq!(summary.counts.invalid, 1);
    assert_eq!(sink.rows("output"), rows(&[&["avg(n)"], &["1.5"]]));
}

#[test]
fn test_router_cap_keeps_single_header() {
    let catalog = parts_catalog();
    let sink = MemorySink::new();
    let mut settings = Settings::new().split(1usize);
    settings.max_open_handles = 2;
    let processor = processor(&catalog, &["loc", "v"], &[], settings, &sink);

    let data: Vec<Result<Vec<String>, ProcessError>> = (0..20)
        .map(|i| Ok(vec![format!("l{}", i % 5), i.to_string()]))
        .collect();
    processor.run(data, &CancelToken::new()).unwrap();

    for l in 0..5 {
        let written = sink.rows(&format!("l{l}"));
        assert_eq!(written.len(), 5, "location l{l}");
        assert_eq!(written.iter().filter(|r| r[0] == "loc").count(), 1);
    }
}

#[test]
fn test_threaded_run_writes_same_rows() {
    let catalog = parts_catalog();
    let data: Vec<Vec<String>> = (0..200).map(|i| vec![format!("{i};x")]).collect();

    let run = |threads: usize| {
        let sink = MemorySink::new();
        let settings = Settings::new()
            .field(FieldRequest::new("parts").column(1usize))
            .threads(threads);
        let processor = processor(&catalog, &["v"], &[], settings, &sink);
        let summary = processor
            .run(data.iter().cloned().map(Ok), &CancelToken::new())
            .unwrap();
        assert_eq!(summary.counts.read, 200);
        let mut written = sink.rows("output");
        written.sort();
        written
    };

    assert_eq!(run(0), run(4));
}

#[test]
fn test_producer_blocks_on_full_queue() {
    let (gate_tx, gate_rx) = crossbeam_channel::unbounded::<()>();
    let mut b = Catalog::builder();
    b.register(TypeDecl::new("plaintext")).unwrap();
    b.register(TypeDecl::new("slow")).unwrap();
    b.register_edge(
        "plaintext",
        "slow",
        Operation::map(move |v| {
            // blocks until the test drops the sender
            let _ = gate_rx.recv();
            Ok(v.to_string())
        }),
    )
    .unwrap();
    let catalog = b.build();

    let threads = 1;
    let sink = MemorySink::new();
    let settings = Settings::new()
        .field(FieldRequest::new("slow").column(1usize))
        .threads(threads);
    let processor = Arc::new(processor(&catalog, &["v"], &[], settings, &sink));

    let produced = Arc::new(AtomicUsize::new(0));
    let counter = produced.clone();
    let data = (0..50).map(move |i| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(vec![i.to_string()])
    });

    let worker = {
        let processor = processor.clone();
        std::thread::spawn(move || processor.run(data, &CancelToken::new()))
    };
    std::thread::sleep(Duration::from_millis(300));

    // one row in the worker, a full queue, one row waiting in send
    let capacity = threads + furrow_core::QUEUE_SLACK;
    let seen = produced.load(Ordering::SeqCst);
    assert!(seen <= threads + capacity + 1, "producer ran ahead: {seen}");

    drop(gate_tx);
    let summary = worker.join().unwrap().unwrap();
    assert_eq!(summary.counts.written, 50);
}

#[test]
fn test_abort_skips_aggregate_flush() {
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let mut b = Catalog::builder();
    b.register(TypeDecl::new("plaintext")).unwrap();
    b.register(TypeDecl::new("checked")).unwrap();
    b.register_edge(
        "plaintext",
        "checked",
        Operation::map(move |v| {
            if v == "stop" {
                trigger.abort();
            }
            Ok(v.to_string())
        }),
    )
    .unwrap();
    let catalog = b.build();

    let sink = MemorySink::new();
    let settings = Settings::new()
        .field(FieldRequest::new("checked").column(1usize))
        .aggregate(AggregateSpec::new(AggregateFn::Count, 1usize));
    let processor = processor(&catalog, &["v"], &[], settings, &sink);

    let summary = processor
        .run(input(&[&["a"], &["stop"], &["b"]]), &cancel)
        .unwrap();

    assert_eq!(summary.status, RunStatus::Aborted);
    assert_eq!(summary.counts.read, 2);
    assert!(sink.rows("output").is_empty());
}

#[test]
fn test_end_early_flushes_what_was_seen() {
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let mut b = Catalog::builder();
    b.register(TypeDecl::new("plaintext")).unwrap();
    b.register(TypeDecl::new("checked")).unwrap();
    b.register_edge(
        "plaintext",
        "checked",
        Operation::map(move |v| {
            if v == "stop" {
                trigger.end_early();
            }
            Ok(v.to_string())
        }),
    )
    .unwrap();
    let catalog = b.build();

    let sink = MemorySink::new();
    let settings = Settings::new()
        .field(FieldRequest::new("checked").column(1usize))
        .aggregate(AggregateSpec::new(AggregateFn::Count, 1usize));
    let processor = processor(&catalog, &["v"], &[], settings, &sink);

    let summary = processor
        .run(input(&[&["a"], &["stop"], &["b"], &["c"]]), &cancel)
        .unwrap();

    assert_eq!(summary.status, RunStatus::EndedEarly);
    assert_eq!(sink.rows("output"), rows(&[&["count(v)"], &["2"]]));
}

#[test]
fn test_manual_fields_without_settings() {
    let catalog = parts_catalog();
    let identifier = Identifier::new(&catalog);
    let mut fields = Fields::from_header(["v"]);
    let field = identifier
        .resolve_field(&fields, &FieldRequest::new("parts").column(1usize))
        .unwrap();
    fields.push(field);

    let sink = MemorySink::new();
    let processor = Processor::new(fields, Default::default(), Arc::new(sink.clone())).unwrap();
    let summary = processor.run(input(&[&["a;b"]]), &CancelToken::new()).unwrap();

    assert_eq!(summary.counts.written, 2);
}

#[test]
fn test_reprocess_quarantine_without_header() {
    let sink = MemorySink::new();
    let processor =
        Processor::new(Fields::new(), Default::default(), Arc::new(sink.clone())).unwrap();

    let first = processor
        .run(input(&[&["a"], &["b"]]), &CancelToken::new())
        .unwrap();
    assert_eq!(first.counts.invalid, 2);
    assert_eq!(sink.rows("_invalid"), rows(&[&["a"], &["b"]]));

    let second = processor
        .reprocess(Quarantine::Invalid, &CancelToken::new())
        .unwrap();
    assert_eq!(second.counts.read, 2);
    assert_eq!(sink.rows("_invalid"), rows(&[&["a"], &["b"]]));
}

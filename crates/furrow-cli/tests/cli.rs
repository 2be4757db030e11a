use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn furrow(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_furrow"))
        .arg("--config")
        .arg(dir.join("absent.toml"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run furrow")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    let output = furrow(dir.path(), &["--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    for command in ["types", "plan", "identify", "run", "reprocess"] {
        assert!(text.contains(command), "missing {command} in help");
    }
}

#[test]
fn test_types_lists_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let output = furrow(dir.path(), &["types"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("plaintext"));
    assert!(text.contains("hostname -> tld"));
}

#[test]
fn test_plan_shows_hops() {
    let dir = tempfile::tempdir().unwrap();
    let output = furrow(dir.path(), &["plan", "url", "tld"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("1. url -> hostname"));
    assert!(text.contains("2. hostname -> tld"));
}

#[test]
fn test_plan_without_path_explains() {
    let dir = tempfile::tempdir().unwrap();
    let output = furrow(dir.path(), &["plan", "tld", "port"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("No conversion path found from 'tld' to 'port'"));
}

#[test]
fn test_identify_ranks_columns() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("flows.csv");
    fs::write(&input, "when,addr\n2024-01-02T03:04:05Z,10.0.0.1\n2024-01-02T03:04:06Z,10.0.0.2\n").unwrap();

    let output = furrow(dir.path(), &["identify", input.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("when"));
    assert!(text.contains("isotimestamp"));
    assert!(text.contains("ip ("));
}

#[test]
fn test_run_then_reprocess_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("flows.csv");
    let table = dir.path().join("countries.csv");
    let out = dir.path().join("out");
    fs::write(
        &input,
        "src,bytes\n1.1.1.1,10\n2.2.2.2,20\n9.9.9.9,5\n1.1.1.1,7\nbad,1\n",
    )
    .unwrap();
    fs::write(&table, "# ip,country\n1.1.1.1,cz\n2.2.2.2,de\n").unwrap();
    let lookup = format!("country={}", table.display());

    let output = furrow(
        dir.path(),
        &[
            "--lookup",
            &lookup,
            "run",
            input.to_str().unwrap(),
            "--field",
            "country:src",
            "--split",
            "country",
            "--output-dir",
            out.to_str().unwrap(),
        ],
    );
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("furrow reprocess"));

    assert_eq!(
        lines(&out.join("cz.csv")),
        vec!["src,bytes,country", "1.1.1.1,10,cz", "1.1.1.1,7,cz"]
    );
    assert_eq!(
        lines(&out.join("de.csv")),
        vec!["src,bytes,country", "2.2.2.2,20,de"]
    );
    assert_eq!(lines(&out.join("_unknown.csv")), vec!["src,bytes", "9.9.9.9,5"]);
    assert_eq!(lines(&out.join("_invalid.csv")), vec!["src,bytes", "bad,1"]);
    assert!(out.join("furrow-state.json").exists());

    // the table learns the missing address
    fs::write(&table, "1.1.1.1,cz\n2.2.2.2,de\n9.9.9.9,at\n").unwrap();
    let output = furrow(
        dir.path(),
        &["--lookup", &lookup, "reprocess", out.to_str().unwrap(), "unknown"],
    );
    assert!(output.status.success(), "{}", stderr(&output));

    assert_eq!(
        lines(&out.join("at.csv")),
        vec!["src,bytes,country", "9.9.9.9,5,at"]
    );
    assert!(!out.join("_unknown.csv").exists());
    assert_eq!(lines(&out.join("cz.csv")).len(), 3);
    assert_eq!(lines(&out.join("_invalid.csv")), vec!["src,bytes", "bad,1"]);
}

#[test]
fn test_reprocess_refuses_aggregated_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("flows.csv");
    let out = dir.path().join("out");
    fs::write(&input, "proto,bytes\ntcp,10\nudp,5\ntcp,1\n").unwrap();

    let output = furrow(
        dir.path(),
        &[
            "run",
            input.to_str().unwrap(),
            "--aggregate",
            "sum:bytes",
            "--group-by",
            "proto",
            "--output-dir",
            out.to_str().unwrap(),
        ],
    );
    assert!(output.status.success(), "{}", stderr(&output));

    let output = furrow(dir.path(), &["reprocess", out.to_str().unwrap(), "invalid"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("aggregates are not kept between runs"));
}

#[test]
fn test_reprocess_without_earlier_run() {
    let dir = tempfile::tempdir().unwrap();
    let output = furrow(
        dir.path(),
        &["reprocess", dir.path().to_str().unwrap(), "invalid"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("No earlier run found"));
}

#[test]
fn test_unknown_column_fails_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("flows.csv");
    fs::write(&input, "src,bytes\n1.1.1.1,10\n").unwrap();

    let output = furrow(
        dir.path(),
        &[
            "run",
            input.to_str().unwrap(),
            "--unique",
            "dst",
            "--output-dir",
            dir.path().join("out").to_str().unwrap(),
        ],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("no such column: dst"));
}

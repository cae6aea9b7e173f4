//! Integration tests for the flatweave binary.
//!
//! These tests run the real executable against fixture files and check
//! stdout, stderr and exit status.

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

const TEMPLATE: &str = "tests/fixtures/template.json";
const MAPPING: &str = "tests/fixtures/mapping.toml";
const RECORD: &str = "tests/fixtures/record.json";

fn flatweave() -> Command {
    let mut cmd = Command::cargo_bin("flatweave").expect("binary builds");
    cmd.env_remove("RUST_LOG");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().expect("command runs");
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("utf-8 stdout")
}

// =============================================================================
// generate
// =============================================================================

#[test]
fn generate_prints_ehr_id_and_flat_json() {
    flatweave()
        .args(["generate", RECORD, "-t", TEMPLATE, "-c", MAPPING])
        .assert()
        .success()
        .stdout(concat!(
            r#"p1 {"ctx/language":"en","test/context/status":"final","#,
            r#""test/event:0/test_name":"a","test/event:1/test_name":"b"}"#,
            "\n"
        ));
}

#[test]
fn generate_skip_ehr_id() {
    flatweave()
        .args(["generate", RECORD, "-t", TEMPLATE, "-c", MAPPING, "--skip-ehr-id"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("{\"ctx/language\":\"en\""));
}

#[test]
fn generate_one_line_per_record() {
    let dir = TempDir::new().unwrap();
    let input = dir.child("export.json");
    input
        .write_str(
            r#"{ "records": [
                { "patient": { "id": "p1" }, "events": [ { "name": "a" } ] },
                { "patient": { "id": "p2" }, "events": [ { "name": "b" }, { "name": "c" } ] }
            ] }"#,
        )
        .unwrap();

    let stdout = stdout_of(flatweave().arg("generate").arg(input.path()).args([
        "-t",
        TEMPLATE,
        "-c",
        MAPPING,
        "--relative-root",
        "/records/*",
    ]));

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("p1 "));
    assert!(!lines[0].contains("event:1"));
    assert!(lines[1].starts_with("p2 "));
    assert!(lines[1].contains(r#""test/event:1/test_name":"c""#));
}

#[test]
fn generate_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    let config = dir.child("bad.toml");
    config
        .write_str("[paths.\"event:*/test_name\"]\nmaps_to = [\"/x\"]\nvalue = \"{{maps_to.[0]}}\"\n")
        .unwrap();

    flatweave()
        .args(["generate", RECORD, "-t", TEMPLATE, "-c"])
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("wildcards"));
}

#[test]
fn generate_reports_missing_input() {
    flatweave()
        .args(["generate", "does-not-exist.json", "-t", TEMPLATE, "-c", MAPPING])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does-not-exist.json"));
}

// =============================================================================
// inspect
// =============================================================================

#[test]
fn inspect_tree() {
    let stdout = stdout_of(flatweave().args(["inspect", "-t", TEMPLATE, "--tree"]));
    insta::assert_snapshot!(stdout, @r"
    test [COMPOSITION] 1..1
      context [EVENT_CONTEXT] 1..1
        status [DV_TEXT] 1..1
      event [EVENT] 0..*
        test_name [DV_TEXT] 1..1
      language [CODE_PHRASE] 1..1
    ");
}

#[test]
fn inspect_node_with_wildcards() {
    flatweave()
        .args(["inspect", "test_name", "-t", TEMPLATE, "--wildcard"])
        .assert()
        .success()
        .stdout("test/event:*/test_name [DV_TEXT] 1..1\n");
}

#[test]
fn inspect_shows_aql_path() {
    flatweave()
        .args(["inspect", "event", "-t", TEMPLATE])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "/content[openEHR-EHR-OBSERVATION.demo.v1]/data/events",
        ));
}

#[test]
fn inspect_unknown_node_fails() {
    flatweave()
        .args(["inspect", "nope", "-t", TEMPLATE])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No node 'nope'"));
}

// =============================================================================
// skeleton / completion
// =============================================================================

#[test]
fn skeleton_lists_every_leaf() {
    flatweave()
        .args(["skeleton", "-t", TEMPLATE])
        .assert()
        .success()
        .stdout(
            predicate::str::contains(r#"[paths."test/context/status"]"#)
                .and(predicate::str::contains(r#"[paths."test/event/test_name"]"#))
                .and(predicate::str::contains(r#"[paths."ctx/language"]"#))
                .and(predicate::str::contains(r#""|code" = """#)),
        );
}

#[test]
fn completion_bash() {
    flatweave()
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("flatweave"));
}

#[test]
fn quiet_and_debug_conflict() {
    flatweave()
        .args(["--debug", "-q", "skeleton", "-t", TEMPLATE])
        .assert()
        .failure();
}

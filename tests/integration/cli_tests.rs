//! CLI integration tests
//!
//! These tests run the binary against a temporary project with a
//! `shrinker.yml` next to its unit files.

use assert_cmd::Command;
use classshrink::unit::{Dispatch, Modifiers, ParsedMethod, ParsedUnit};
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

const CONFIG: &str = r#"
inputs: [classes]
output: out
keep:
  shrink:
    - class: cli/Main
      member: main
"#;

fn write_unit(root: &Path, unit: &ParsedUnit) {
    let path = root.join("classes").join(format!("{}.unit.json", unit.name));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_string_pretty(unit).unwrap()).unwrap();
}

/// `Main.main` calls `Used.run`; `Unused` is never referenced
fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("shrinker.yml"), CONFIG).unwrap();
    write_unit(
        dir.path(),
        &ParsedUnit::new("cli/Main").with_method(
            ParsedMethod::new("main", "([Ljava/lang/String;)V")
                .with_modifiers(Modifiers::PUBLIC | Modifiers::STATIC)
                .calls(Dispatch::Static, "cli/Used", "run", "()V"),
        ),
    );
    write_unit(
        dir.path(),
        &ParsedUnit::new("cli/Used").with_method(ParsedMethod::new("run", "()V").with_modifiers(Modifiers::STATIC)),
    );
    write_unit(
        dir.path(),
        &ParsedUnit::new("cli/Unused").with_method(ParsedMethod::new("run", "()V").with_modifiers(Modifiers::STATIC)),
    );
    dir
}

fn classshrink() -> Command {
    let mut cmd = Command::cargo_bin("classshrink").unwrap();
    cmd.env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_cli_help() {
    classshrink()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("classshrink"))
        .stdout(predicate::str::contains("--mode"))
        .stdout(predicate::str::contains("--counter-set"))
        .stdout(predicate::str::contains("--watch"));
}

#[test]
fn test_cli_version() {
    classshrink()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_invalid_path() {
    classshrink()
        .arg("/nonexistent")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a directory"));
}

#[test]
fn test_cli_full_run_writes_output() {
    let dir = project();
    classshrink()
        .arg(dir.path())
        .args(["--mode", "full", "--list-classes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Full run"))
        .stdout(predicate::str::contains("- cli/Unused"));

    assert!(dir.path().join("out/cli/Main.unit.json").exists());
    assert!(dir.path().join("out/cli/Used.unit.json").exists());
    assert!(!dir.path().join("out/cli/Unused.unit.json").exists());
    assert!(dir.path().join(".classshrink-state.json").exists());
}

#[test]
fn test_cli_second_run_is_incremental() {
    let dir = project();
    classshrink().arg(dir.path()).assert().success();

    classshrink()
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Incremental run"));
}

#[test]
fn test_cli_incremental_without_state_fails() {
    let dir = project();
    classshrink()
        .arg(dir.path())
        .args(["--mode", "incremental"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No snapshot"));
}

#[test]
fn test_cli_json_format() {
    let dir = project();
    let output = classshrink()
        .arg(dir.path())
        .args(["--format", "json", "--quiet"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["tool"], "classshrink");
    assert_eq!(report["mode"], "full");
    assert_eq!(report["requested"], "auto");
    assert_eq!(report["counter_sets"][0]["name"], "shrink");
    assert_eq!(report["counter_sets"][0]["removed_classes"], 1);
}

#[test]
fn test_cli_report_file() {
    let dir = project();
    let report = dir.path().join("report.json");
    classshrink()
        .arg(dir.path())
        .arg("--report")
        .arg(&report)
        .arg("--quiet")
        .assert()
        .success();

    let contents = std::fs::read_to_string(&report).unwrap();
    let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(value["emit"]["written"], 2);
}

#[test]
fn test_cli_overrides_output_directory() {
    let dir = project();
    classshrink()
        .arg(dir.path())
        .args(["--output", "pruned", "--state", "state.json"])
        .assert()
        .success();

    assert!(dir.path().join("pruned/cli/Used.unit.json").exists());
    assert!(dir.path().join("state.json").exists());
    assert!(!dir.path().join("out").exists());
}

#[test]
fn test_cli_unknown_counter_set() {
    let dir = project();
    classshrink()
        .arg(dir.path())
        .args(["--counter-set", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing"));
}

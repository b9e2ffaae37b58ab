//! Snapshot persistence integration tests

mod common;

use classshrink::cache::{Snapshot, SnapshotError, SNAPSHOT_VERSION};
use classshrink::incremental::IncrementalError;
use classshrink::shrinker::{RunMode, Shrinker};
use classshrink::unit::{Modifiers, ParsedMethod, ParsedUnit};
use classshrink::ShrinkError;
use common::*;
use std::path::PathBuf;

#[test]
fn test_snapshot_restores_graph_and_tables() {
    let project = Project::with_units(&abstract_dispatch()).keep_member("ad/Main", "main");
    let summary = project.full();
    let snapshot = project.snapshot();

    assert_eq!(snapshot.version, SNAPSHOT_VERSION);
    assert_eq!(snapshot.units.len(), 5);
    assert!(snapshot.libraries.is_empty());
    assert_eq!(snapshot.emit.counter_set, "shrink");

    let graph = snapshot.to_graph().unwrap();
    assert!(graph.class("ad/Impl3").is_some());
    assert!(graph.member(&method("ad/Impl1", "abstractMethod", "()V")).is_some());
    assert_eq!(summary.graph.program_classes, 5);
    assert!(snapshot.stats().classes >= 5);

    // Saving and loading again changes nothing
    let copy = project.root().join("copy.json");
    snapshot.save(&copy).unwrap();
    let reloaded = Snapshot::load(&copy).unwrap();
    assert_eq!(reloaded.edges, snapshot.edges);
    assert_eq!(reloaded.counter_sets, snapshot.counter_sets);
    assert_eq!(reloaded.units, snapshot.units);
}

#[test]
fn test_missing_snapshot_is_recoverable() {
    let project = Project::with_units(&body_edit_base()).keep_member("be/Main", "main");

    let err = project.run(RunMode::Incremental).unwrap_err();
    assert!(err.is_recoverable());
    assert!(matches!(
        err,
        ShrinkError::Incremental(IncrementalError::Snapshot(SnapshotError::Missing(_)))
    ));
}

#[test]
fn test_version_mismatch_falls_back_to_full_run() {
    let project = Project::with_units(&body_edit_base()).keep_member("be/Main", "main");
    project.full();

    let text = std::fs::read_to_string(project.state()).unwrap();
    let mut value: serde_json::Value = serde_json::from_str(&text).unwrap();
    value["version"] = serde_json::json!(SNAPSHOT_VERSION + 1);
    std::fs::write(project.state(), value.to_string()).unwrap();

    let err = Snapshot::load(&project.state()).unwrap_err();
    assert!(matches!(err, SnapshotError::VersionMismatch { found, .. } if found == SNAPSHOT_VERSION + 1));

    let summary = project.run(RunMode::Auto).unwrap();
    assert_eq!(summary.mode, RunMode::Full);
    assert!(summary.fallback.unwrap().contains("does not match"));
    assert_eq!(project.snapshot().version, SNAPSHOT_VERSION);
}

#[test]
fn test_unparseable_snapshot_falls_back_to_full_run() {
    let project = Project::with_units(&body_edit_base()).keep_member("be/Main", "main");
    project.full();
    std::fs::write(project.state(), "{ not json").unwrap();

    let summary = project.run(RunMode::Auto).unwrap();
    assert_eq!(summary.mode, RunMode::Full);
    assert!(summary.fallback.unwrap().starts_with("Persisted state unusable"));
    assert!(project.snapshot().to_graph().is_ok());
}

#[test]
fn test_dangling_edge_is_corrupt() {
    let project = Project::with_units(&body_edit_base()).keep_member("be/Main", "main");
    project.full();

    let mut snapshot = project.snapshot();
    snapshot.members.retain(|m| m.id != method("be/Util", "help", "()V"));
    snapshot.save(&project.state()).unwrap();

    let err = Snapshot::load(&project.state()).unwrap().to_graph().unwrap_err();
    assert!(matches!(err, SnapshotError::Corrupt(_)));
    assert!(project.run(RunMode::Incremental).unwrap_err().is_recoverable());
}

#[test]
fn test_custom_state_location() {
    let project = Project::with_units(&body_edit_base()).keep_member("be/Main", "main");
    let mut config = project.config();
    config.state = Some(PathBuf::from("build/state/shrink.json"));
    let config = config.rooted(project.root());

    let shrinker = Shrinker::new(config, project.root());
    shrinker.run(RunMode::Full).unwrap();

    let state = project.root().join("build/state/shrink.json");
    assert_eq!(shrinker.state_path(), state);
    assert!(state.exists());
    assert!(!project.state().exists());
    assert_eq!(shrinker.run(RunMode::Auto).unwrap().mode, RunMode::Incremental);
}

#[test]
fn test_failed_incremental_run_leaves_snapshot_untouched() {
    let project = Project::with_units(&body_edit_base()).keep_member("be/Main", "main");
    project.full();
    let before = std::fs::read_to_string(project.state()).unwrap();

    project.write_unit(&util_with_extra_method());
    assert!(project.run(RunMode::Incremental).is_err());

    assert_eq!(std::fs::read_to_string(project.state()).unwrap(), before);
}

fn util_with_extra_method() -> ParsedUnit {
    body_edit_base()[0]
        .clone()
        .with_method(ParsedMethod::new("extra", "()V").with_modifiers(Modifiers::STATIC))
}

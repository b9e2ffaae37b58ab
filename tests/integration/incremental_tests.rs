//! Incremental run integration tests
//!
//! A full run leaves a snapshot; these tests edit unit files afterwards and
//! check that incremental runs either agree with a fresh full run or refuse
//! with the structural changes that forced them out.

mod common;

use classshrink::config::KeepRuleConfig;
use classshrink::incremental::{IncrementalError, StructuralChange};
use classshrink::shrinker::RunMode;
use classshrink::unit::{Dispatch, Modifiers, ParsedField, ParsedMethod, ParsedUnit};
use classshrink::ShrinkError;
use common::*;

fn body_edit_project() -> Project {
    let project = Project::with_units(&body_edit_base()).keep_member("be/Main", "main");
    project.full();
    project
}

fn require_full_changes(result: Result<classshrink::RunSummary, ShrinkError>) -> Vec<StructuralChange> {
    match result {
        Err(ShrinkError::Incremental(IncrementalError::RequireFull { changes })) => changes,
        Err(other) => panic!("expected RequireFull, got {}", other),
        Ok(summary) => panic!("expected RequireFull, run finished as {}", summary.mode),
    }
}

#[test]
fn test_body_edit_runs_incrementally() {
    let project = body_edit_project();
    project.write_unit(&body_edit_main(true));

    let summary = project.run(RunMode::Incremental).unwrap();
    assert_eq!(summary.mode, RunMode::Incremental);
    assert_eq!(summary.modified_units, 1);
    assert!(summary.fallback.is_none());

    let table = project.table("shrink");
    assert!(kept(&table, &field("be/Util", "count", "I")));
    assert!(!kept(&table, &method("be/Util", "other", "()V")));

    // The field is now kept, so Util's output changes too
    assert!(summary.rewritten.contains(&"be/Main".to_string()));
    assert!(summary.rewritten.contains(&"be/Util".to_string()));
    let util = project.read_output("be/Util");
    assert_eq!(util.fields.len(), 1);
    assert_eq!(util.fields[0].name, "count");
}

#[test]
fn test_incremental_result_matches_full_run() {
    let project = body_edit_project();
    project.write_unit(&body_edit_main(true));
    project.run(RunMode::Incremental).unwrap();

    let mut units = body_edit_base();
    units[1] = body_edit_main(true);
    let fresh = Project::with_units(&units).keep_member("be/Main", "main");
    fresh.full();

    let incremental = project.table("shrink");
    let full = fresh.table("shrink");
    assert_eq!(incremental.kept_states(), full.kept_states());
    assert_eq!(incremental.roots, full.roots);
}

#[test]
fn test_removed_call_retracts_output() {
    let project = body_edit_project();
    assert!(project.output_exists("be/Util"));

    project.write_unit(&ParsedUnit::new("be/Main").with_method(static_main()));
    let summary = project.run(RunMode::Incremental).unwrap();

    assert_eq!(summary.retracted, vec!["be/Util".to_string()]);
    assert!(!project.output_exists("be/Util"));
    assert!(project.output_exists("be/Main"));
    assert!(!kept(&project.table("shrink"), &class("be/Util")));
}

#[test]
fn test_unchanged_project_rewrites_nothing() {
    let project = body_edit_project();
    let summary = project.run(RunMode::Incremental).unwrap();

    assert_eq!(summary.modified_units, 0);
    assert!(summary.rewritten.is_empty());
    assert!(summary.retracted.is_empty());
    assert_eq!(summary.emit.written, 0);
}

#[test]
fn test_added_method_requires_full_run() {
    let project = body_edit_project();
    let before = project.snapshot().created_at;
    let mut units = body_edit_base();
    units[0] = units[0]
        .clone()
        .with_method(ParsedMethod::new("extra", "()V").with_modifiers(Modifiers::PUBLIC | Modifiers::STATIC));
    project.write_unit(&units[0]);

    let changes = require_full_changes(project.run(RunMode::Incremental));
    assert_eq!(
        changes,
        vec![StructuralChange::MemberAdded(method("be/Util", "extra", "()V"))]
    );
    assert_eq!(changes[0].to_string(), "Method be/Util.extra:()V added.");
    // The snapshot stays as the full run left it
    assert_eq!(project.snapshot().created_at, before);
    assert!(project.snapshot().members.iter().all(|m| m.id != method("be/Util", "extra", "()V")));

    let summary = project.run(RunMode::Full).unwrap();
    assert_eq!(summary.mode, RunMode::Full);
    assert!(!kept(&project.table("shrink"), &method("be/Util", "extra", "()V")));
}

#[test]
fn test_auto_falls_back_on_structural_change() {
    let project = body_edit_project();
    project.write_unit(
        &ParsedUnit::new("be/Util")
            .with_superclass("be/Main")
            .with_field(ParsedField::new("count", "I").with_modifiers(Modifiers::PUBLIC | Modifiers::STATIC))
            .with_method(ParsedMethod::new("help", "()V").with_modifiers(Modifiers::PUBLIC | Modifiers::STATIC))
            .with_method(ParsedMethod::new("other", "()V").with_modifiers(Modifiers::PUBLIC | Modifiers::STATIC)),
    );

    let summary = project.run(RunMode::Auto).unwrap();
    assert_eq!(summary.requested, RunMode::Auto);
    assert_eq!(summary.mode, RunMode::Full);
    let reason = summary.fallback.unwrap();
    assert!(reason.contains("be/Util superclass changed."), "{}", reason);

    // The fallback left a fresh snapshot, so the next run is incremental again
    let next = project.run(RunMode::Auto).unwrap();
    assert_eq!(next.mode, RunMode::Incremental);
}

#[test]
fn test_keep_rule_change_requires_full_run() {
    let project = body_edit_project().keep_member("be/Util", "other");

    let changes = require_full_changes(project.run(RunMode::Incremental));
    assert_eq!(changes, vec![StructuralChange::KeepRules("shrink".to_string())]);

    let summary = project.run(RunMode::Auto).unwrap();
    assert_eq!(summary.mode, RunMode::Full);
    assert!(kept(&project.table("shrink"), &method("be/Util", "other", "()V")));
}

#[test]
fn test_new_counter_set_requires_full_run() {
    let project = body_edit_project().keep("debug", KeepRuleConfig::member("be/Util", "other"));

    let changes = require_full_changes(project.run(RunMode::Incremental));
    assert_eq!(changes, vec![StructuralChange::KeepRules("debug".to_string())]);
}

#[test]
fn test_added_file_requires_full_run() {
    let project = body_edit_project();
    project.write_unit(&ParsedUnit::new("be/Extra").with_method(constructor()));

    let changes = require_full_changes(project.run(RunMode::Incremental));
    assert_eq!(changes.len(), 1);
    match &changes[0] {
        StructuralChange::FileAdded(path) => assert!(path.ends_with("be/Extra.unit.json")),
        other => panic!("unexpected change {}", other),
    }
}

#[test]
fn test_removed_file_requires_full_run() {
    let project = Project::with_units(&simple_three_classes()).keep_member("sc/Bbb", "bbb");
    project.full();
    project.remove_unit("sc/Ccc");

    let changes = require_full_changes(project.run(RunMode::Incremental));
    assert_eq!(changes.len(), 1);
    assert!(matches!(&changes[0], StructuralChange::FileRemoved(path) if path.ends_with("sc/Ccc.unit.json")));
}

#[test]
fn test_every_structural_change_is_reported() {
    let project = body_edit_project();
    project.write_unit(
        &ParsedUnit::new("be/Util")
            .with_interface("java/lang/Runnable")
            .with_method(ParsedMethod::new("help", "()V").with_modifiers(Modifiers::PUBLIC))
            .with_method(ParsedMethod::new("other", "()V").with_modifiers(Modifiers::PUBLIC | Modifiers::STATIC)),
    );

    let changes = require_full_changes(project.run(RunMode::Incremental));
    assert!(changes.contains(&StructuralChange::Interfaces("be/Util".to_string())));
    assert!(changes.contains(&StructuralChange::MemberRemoved(field("be/Util", "count", "I"))));
    assert!(changes.contains(&StructuralChange::Modifiers(method("be/Util", "help", "()V"))));
}

#[test]
fn test_dispatch_change_in_body_is_incremental() {
    let project = Project::with_units(&concrete_dispatch()).keep_member("cd/Main", "main");
    project.full();
    assert!(!project.output_exists("cd/Sub"));

    project.write_unit(
        &ParsedUnit::new("cd/Main").with_method(
            static_main()
                .instantiates("cd/Base")
                .instantiates("cd/Sub")
                .calls(Dispatch::Virtual, "cd/Base", "run", "()V"),
        ),
    );
    let summary = project.run(RunMode::Incremental).unwrap();

    assert_eq!(summary.mode, RunMode::Incremental);
    let table = project.table("shrink");
    assert!(kept(&table, &method("cd/Sub", "run", "()V")));
    assert!(project.output_exists("cd/Sub"));
    assert!(summary.rewritten.contains(&"cd/Sub".to_string()));
}

#[test]
fn test_dropped_unresolved_reference_leaves_no_placeholder() {
    let mut units = body_edit_base();
    units[1] = ParsedUnit::new("be/Main").with_method(
        static_main()
            .calls(Dispatch::Static, "be/Util", "help", "()V")
            .calls(Dispatch::Static, "com/vendor/Sdk", "init", "()V"),
    );
    let project = Project::with_units(&units).keep_member("be/Main", "main");
    let before = project.full();
    assert!(before.warnings >= 1);
    assert!(kept(&project.table("shrink"), &class("com/vendor/Sdk")));

    project.write_unit(&body_edit_main(false));
    let summary = project.run(RunMode::Incremental).unwrap();
    assert_eq!(summary.mode, RunMode::Incremental);

    let fresh = Project::with_units(&body_edit_base()).keep_member("be/Main", "main");
    let fresh_summary = fresh.full();

    let table = project.table("shrink");
    assert_eq!(table.kept_states(), fresh.table("shrink").kept_states());
    assert!(!kept(&table, &class("com/vendor/Sdk")));
    assert_eq!(summary.warnings, fresh_summary.warnings);
    assert_eq!(summary.graph.unresolved_classes, 0);
    assert!(project.snapshot().classes.iter().all(|c| c.name != "com/vendor/Sdk"));
}

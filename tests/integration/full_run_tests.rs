//! Full-run integration tests
//!
//! Each test writes a small program as unit files, runs the shrinker from
//! scratch and checks the persisted keep set and the pruned output.

mod common;

use classshrink::analysis::KeepState;
use classshrink::config::KeepRuleConfig;
use classshrink::shrinker::RunMode;
use classshrink::unit::{Dispatch, MemberKey, Modifiers, ParsedMethod, ParsedUnit};
use common::*;

#[test]
fn test_simple_three_classes() {
    let project = Project::with_units(&simple_three_classes()).keep_member("sc/Bbb", "bbb");
    let summary = project.full();
    let table = project.table("shrink");

    assert!(kept(&table, &method("sc/Aaa", "aaa", "()V")));
    assert!(kept(&table, &method("sc/Aaa", "bbb", "()V")));
    assert!(kept(&table, &method("sc/Bbb", "bbb", "(Lsc/Aaa;)V")));
    assert!(!kept(&table, &method("sc/Aaa", "<init>", "()V")));
    assert!(!kept(&table, &method("sc/Bbb", "<init>", "()V")));
    assert!(!kept(&table, &class("sc/Ccc")));
    assert!(!kept(&table, &method("sc/Ccc", "ccc", "(Lsc/Aaa;)V")));

    let shrink = summary.counter_set("shrink").unwrap();
    assert_eq!(shrink.kept_classes, 2);
    assert_eq!(shrink.removed, vec!["sc/Ccc".to_string()]);
    assert_eq!(summary.emit.written, 2);

    assert!(!project.output_exists("sc/Ccc"));
    let aaa = project.read_output("sc/Aaa");
    let names: Vec<&str> = aaa.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["aaa", "bbb"]);
    let bbb = project.read_output("sc/Bbb");
    assert_eq!(bbb.methods.len(), 1);
    assert_eq!(bbb.methods[0].key(), MemberKey::new("bbb", "(Lsc/Aaa;)V"));
}

#[test]
fn test_keep_whole_class_keeps_no_members() {
    let project = Project::with_units(&simple_three_classes()).keep("shrink", KeepRuleConfig::class("sc/Ccc"));
    project.full();
    let table = project.table("shrink");

    assert_eq!(state(&table, &class("sc/Ccc")), Some(KeepState::Full));
    assert!(!kept(&table, &method("sc/Ccc", "ccc", "(Lsc/Aaa;)V")));
    assert!(!kept(&table, &class("sc/Bbb")));
}

#[test]
fn test_annotations_visible_kept_invisible_stripped() {
    let project = Project::with_units(&annotations()).keep_member("an/Main", "main");
    project.full();
    let table = project.table("shrink");

    assert_eq!(state(&table, &class("an/Marker")), Some(KeepState::Shell));
    assert!(!kept(&table, &class("an/Hidden")));

    let main = project.read_output("an/Main");
    let types: Vec<&str> = main.annotations.iter().map(|a| a.type_name.as_str()).collect();
    assert_eq!(types, vec!["an/Marker"]);
    assert!(project.output_exists("an/Marker"));
    assert!(!project.output_exists("an/Hidden"));
}

#[test]
fn test_unused_inner_class_removed_with_its_record() {
    let project = Project::with_units(&inner_classes()).keep_member("ic/Outer", "main");
    project.full();
    let table = project.table("shrink");

    assert!(kept(&table, &class("ic/Outer")));
    assert!(!kept(&table, &class("ic/Outer$Inner")));

    let outer = project.read_output("ic/Outer");
    assert!(outer.inner_classes.is_empty());
    assert!(!project.output_exists("ic/Outer$Inner"));
}

#[test]
fn test_used_inner_class_keeps_outer_and_record() {
    let mut units = inner_classes();
    let record = units[0].inner_classes[0].clone();
    units[0] = ParsedUnit::new("ic/Outer")
        .with_inner_class(record)
        .with_method(static_main().instantiates("ic/Outer$Inner"));
    let project = Project::with_units(&units).keep_member("ic/Outer", "main");
    project.full();

    let table = project.table("shrink");
    assert!(kept(&table, &class("ic/Outer$Inner")));
    assert!(kept(&table, &method("ic/Outer$Inner", "<init>", "()V")));
    assert_eq!(project.read_output("ic/Outer").inner_classes.len(), 1);
    assert_eq!(project.read_output("ic/Outer$Inner").inner_classes.len(), 1);
}

#[test]
fn test_counter_sets_are_independent() {
    let project = Project::with_units(&simple_three_classes())
        .keep_member("sc/Bbb", "bbb")
        .keep("debug", KeepRuleConfig::member("sc/Ccc", "ccc"));
    let summary = project.full();

    let shrink = project.table("shrink");
    let debug = project.table("debug");
    assert!(!kept(&shrink, &class("sc/Ccc")));
    assert!(kept(&debug, &class("sc/Ccc")));
    assert!(!kept(&debug, &class("sc/Bbb")));
    assert!(!kept(&debug, &method("sc/Aaa", "bbb", "()V")));

    // Only the emitted counter-set reaches the output directory
    assert_eq!(summary.emitted, "shrink");
    assert!(!project.output_exists("sc/Ccc"));
    assert_eq!(summary.counter_sets.len(), 2);
}

#[test]
fn test_negated_rule_excludes_matches() {
    let project = Project::with_units(&simple_three_classes())
        .keep("shrink", KeepRuleConfig::member("sc/*", "*").with_access("public"))
        .keep("shrink", KeepRuleConfig::member("sc/Ccc", "*").negated());
    project.full();
    let table = project.table("shrink");

    assert!(table.is_root(&method("sc/Bbb", "bbb", "(Lsc/Aaa;)V")));
    assert!(table.is_root(&method("sc/Aaa", "<init>", "()V")));
    assert!(!kept(&table, &class("sc/Ccc")));
}

#[test]
fn test_unresolved_reference_is_kept_and_counted() {
    let project = Project::with_units(&[ParsedUnit::new("ur/Main")
        .with_method(static_main().calls(Dispatch::Static, "zz/Missing", "go", "()V"))])
    .keep_member("ur/Main", "main");
    let summary = project.full();
    let table = project.table("shrink");

    assert!(kept(&table, &class("zz/Missing")));
    assert!(summary.warnings >= 1);
    assert_eq!(summary.graph.unresolved_classes, 1);
}

#[test]
fn test_library_override_is_implicitly_kept() {
    let project = Project::with_units(&[
        ParsedUnit::new("lo/Handler")
            .with_superclass("lib/Callback")
            .with_method(ParsedMethod::default_constructor("lib/Callback").with_modifiers(Modifiers::PUBLIC))
            .with_method(ParsedMethod::new("onEvent", "()V").with_modifiers(Modifiers::PUBLIC))
            .with_method(ParsedMethod::new("helper", "()V").with_modifiers(Modifiers::PUBLIC)),
        ParsedUnit::new("lo/Main").with_method(static_main().instantiates("lo/Handler")),
    ])
    .keep_member("lo/Main", "main");
    project.write_library(
        &ParsedUnit::new("lib/Callback")
            .as_library()
            .with_method(constructor())
            .with_method(ParsedMethod::new("onEvent", "()V").with_modifiers(Modifiers::PUBLIC)),
    );

    let summary = project.full();
    let table = project.table("shrink");

    assert!(kept(&table, &method("lo/Handler", "onEvent", "()V")));
    assert!(!kept(&table, &method("lo/Handler", "helper", "()V")));
    assert!(summary.graph.library_classes >= 1);
    assert!(!project.output_exists("lib/Callback"));
}

#[test]
fn test_yaml_units_are_read() {
    let project = Project::new().keep_member("ym/Main", "main");
    std::fs::create_dir_all(project.classes().join("ym")).unwrap();
    std::fs::write(
        project.classes().join("ym/Main.unit.yaml"),
        r#"
name: ym/Main
modifiers: 1
superclass: java/lang/Object
methods:
  - name: main
    descriptor: "([Ljava/lang/String;)V"
    modifiers: 9
    body:
      - op: invoke
        dispatch: static
        owner: ym/Util
        name: help
        descriptor: "()V"
"#,
    )
    .unwrap();
    project.write_unit(
        &ParsedUnit::new("ym/Util").with_method(ParsedMethod::new("help", "()V").with_modifiers(Modifiers::STATIC)),
    );

    project.full();
    let table = project.table("shrink");
    assert!(kept(&table, &method("ym/Util", "help", "()V")));
    assert!(project.output_exists("ym/Main"));
}

#[test]
fn test_omit_empty_shells() {
    let mut project = Project::with_units(&annotations()).keep_member("an/Main", "main");
    project.omit_empty_shells = true;
    let summary = project.full();

    // The annotation type is a member-less shell with nothing extending it
    assert!(!project.output_exists("an/Marker"));
    assert!(project.output_exists("an/Main"));
    assert!(summary.emit.omitted >= 1);
}

#[test]
fn test_full_run_sweeps_outputs_of_removed_units() {
    let project = Project::with_units(&simple_three_classes()).keep("shrink", KeepRuleConfig::class("sc/*"));
    project.full();
    assert!(project.output_exists("sc/Ccc"));

    project.remove_unit("sc/Ccc");
    let summary = project.run(RunMode::Full).unwrap();

    assert!(!project.output_exists("sc/Ccc"));
    assert!(summary.emit.deleted >= 1);
}

#[test]
fn test_idempotent_full_runs() {
    let project = Project::with_units(&abstract_dispatch()).keep_member("ad/Main", "main");
    project.full();
    let first = project.table("shrink");
    project.full();
    let second = project.table("shrink");

    assert_eq!(first.kept_states(), second.kept_states());
    assert_eq!(first.roots, second.roots);
}

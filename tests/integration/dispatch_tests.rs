//! Virtual dispatch integration tests
//!
//! Virtual and interface calls keep the implementations of live subtypes of
//! the static receiver, and nothing else.

mod common;

use classshrink::analysis::KeepState;
use classshrink::unit::{Dispatch, Modifiers, ParsedMethod, ParsedUnit};
use common::*;

#[test]
fn test_abstract_dispatch_keeps_only_live_implementations() {
    let project = Project::with_units(&abstract_dispatch()).keep_member("ad/Main", "main");
    let summary = project.full();
    let table = project.table("shrink");

    assert!(kept(&table, &method("ad/AbstractClass", "abstractMethod", "()V")));
    assert!(kept(&table, &method("ad/Impl1", "abstractMethod", "()V")));
    assert!(kept(&table, &method("ad/Impl2", "abstractMethod", "()V")));
    assert!(kept(&table, &class("ad/Impl1")));
    assert!(kept(&table, &class("ad/Impl2")));

    assert!(!kept(&table, &class("ad/Impl3")));
    assert!(!kept(&table, &method("ad/Impl3", "abstractMethod", "()V")));
    assert!(!project.output_exists("ad/Impl3"));
    assert_eq!(
        summary.counter_set("shrink").unwrap().removed,
        vec!["ad/Impl3".to_string()]
    );
}

#[test]
fn test_constructor_chain_keeps_abstract_parent_constructor() {
    let project = Project::with_units(&abstract_dispatch()).keep_member("ad/Main", "main");
    project.full();
    let table = project.table("shrink");

    assert!(kept(&table, &method("ad/Impl1", "<init>", "()V")));
    assert!(kept(&table, &method("ad/AbstractClass", "<init>", "()V")));
    assert!(!kept(&table, &method("ad/Impl3", "<init>", "()V")));
}

#[test]
fn test_concrete_dispatch_skips_uninstantiated_override() {
    let project = Project::with_units(&concrete_dispatch()).keep_member("cd/Main", "main");
    project.full();
    let table = project.table("shrink");

    assert!(kept(&table, &method("cd/Base", "run", "()V")));
    assert!(!kept(&table, &class("cd/Sub")));
    assert!(!kept(&table, &method("cd/Sub", "run", "()V")));
}

#[test]
fn test_concrete_dispatch_keeps_live_override() {
    let mut units = concrete_dispatch();
    units[2] = ParsedUnit::new("cd/Main").with_method(
        static_main()
            .instantiates("cd/Sub")
            .calls(Dispatch::Virtual, "cd/Base", "run", "()V"),
    );
    let project = Project::with_units(&units).keep_member("cd/Main", "main");
    project.full();
    let table = project.table("shrink");

    assert!(kept(&table, &method("cd/Sub", "run", "()V")));
    assert!(kept(&table, &method("cd/Base", "run", "()V")));
    // The superclass is structurally required, but never instantiated
    assert!(kept(&table, &class("cd/Base")));
    assert!(kept(&table, &method("cd/Base", "<init>", "()V")));
}

#[test]
fn test_inherited_interface_implementation_is_kept() {
    let project = Project::with_units(&inherited_interface_implementation()).keep_member("ii/Main", "main");
    project.full();
    let table = project.table("shrink");

    assert!(kept(&table, &method("ii/Iface", "call", "()V")));
    assert!(kept(&table, &method("ii/Parent", "call", "()V")));
    assert!(!kept(&table, &method("ii/Parent", "unused", "()V")));
    assert!(kept(&table, &class("ii/Child")));

    let parent = project.read_output("ii/Parent");
    let names: Vec<&str> = parent.methods.iter().map(|m| m.name.as_str()).collect();
    assert!(names.contains(&"call"));
    assert!(!names.contains(&"unused"));

    let child = project.read_output("ii/Child");
    assert_eq!(child.interfaces, vec!["ii/Iface".to_string()]);
}

#[test]
fn test_late_instantiation_triggers_dispatch() {
    // The call site is reached before the only instantiation
    let units = vec![
        ParsedUnit::new("li/Shape")
            .with_modifiers(Modifiers::PUBLIC | Modifiers::INTERFACE | Modifiers::ABSTRACT)
            .with_method(ParsedMethod::new("area", "()I").with_modifiers(Modifiers::PUBLIC | Modifiers::ABSTRACT)),
        ParsedUnit::new("li/Square")
            .with_interface("li/Shape")
            .with_method(constructor())
            .with_method(ParsedMethod::new("area", "()I").with_modifiers(Modifiers::PUBLIC)),
        ParsedUnit::new("li/Circle")
            .with_interface("li/Shape")
            .with_method(constructor())
            .with_method(ParsedMethod::new("area", "()I").with_modifiers(Modifiers::PUBLIC)),
        ParsedUnit::new("li/Factory").with_method(
            ParsedMethod::new("make", "()Lli/Shape;")
                .with_modifiers(Modifiers::PUBLIC | Modifiers::STATIC)
                .instantiates("li/Square"),
        ),
        ParsedUnit::new("li/Main").with_method(
            static_main()
                .calls(Dispatch::Interface, "li/Shape", "area", "()I")
                .calls(Dispatch::Static, "li/Factory", "make", "()Lli/Shape;"),
        ),
    ];
    let project = Project::with_units(&units).keep_member("li/Main", "main");
    project.full();
    let table = project.table("shrink");

    assert!(kept(&table, &method("li/Square", "area", "()I")));
    assert!(!kept(&table, &method("li/Circle", "area", "()I")));
    assert!(!kept(&table, &class("li/Circle")));
}

#[test]
fn test_shell_class_upgraded_when_instantiated() {
    let units = vec![
        ParsedUnit::new("su/Base").with_method(constructor()),
        ParsedUnit::new("su/Leaf")
            .with_superclass("su/Base")
            .with_method(ParsedMethod::default_constructor("su/Base").with_modifiers(Modifiers::PUBLIC)),
        ParsedUnit::new("su/Main").with_method(static_main().instantiates("su/Leaf")),
    ];
    let project = Project::with_units(&units).keep_member("su/Main", "main");
    project.full();
    let table = project.table("shrink");

    assert_eq!(state(&table, &class("su/Leaf")), Some(KeepState::Full));
    assert!(kept(&table, &class("su/Base")));
    assert!(kept(&table, &method("su/Base", "<init>", "()V")));
}

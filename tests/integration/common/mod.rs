//! Shared fixtures for the integration tests
//!
//! A `Project` is a temporary directory with `classes/`, `libs/` and `out/`
//! subdirectories plus helpers to write units and run the shrinker. The
//! scenario builders return the units of small programs whose expected keep
//! sets are known.

#![allow(dead_code)]

use classshrink::analysis::{CounterTable, KeepState};
use classshrink::cache::Snapshot;
use classshrink::config::{Config, KeepRuleConfig};
use classshrink::graph::NodeId;
use classshrink::shrinker::{RunMode, RunSummary, Shrinker};
use classshrink::unit::{AnnotationUse, Dispatch, InnerClassRecord, Modifiers, ParsedField, ParsedMethod, ParsedUnit};
use classshrink::ShrinkError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const OBJECT: &str = "java/lang/Object";
pub const MAIN_DESC: &str = "([Ljava/lang/String;)V";

pub struct Project {
    pub dir: TempDir,
    pub keep: BTreeMap<String, Vec<KeepRuleConfig>>,
    pub omit_empty_shells: bool,
}

impl Project {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("classes")).unwrap();
        Self {
            dir,
            keep: BTreeMap::new(),
            omit_empty_shells: false,
        }
    }

    /// A project holding `units` with `Main.main`-style roots
    pub fn with_units(units: &[ParsedUnit]) -> Self {
        let project = Self::new();
        for unit in units {
            project.write_unit(unit);
        }
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn classes(&self) -> PathBuf {
        self.root().join("classes")
    }

    pub fn libs(&self) -> PathBuf {
        self.root().join("libs")
    }

    pub fn out(&self) -> PathBuf {
        self.root().join("out")
    }

    pub fn state(&self) -> PathBuf {
        self.root().join(".classshrink-state.json")
    }

    pub fn unit_path(&self, class: &str) -> PathBuf {
        self.classes().join(format!("{}.unit.json", class))
    }

    pub fn write_unit(&self, unit: &ParsedUnit) -> PathBuf {
        write_json(&self.unit_path(&unit.name), unit)
    }

    pub fn write_library(&self, unit: &ParsedUnit) -> PathBuf {
        write_json(&self.libs().join(format!("{}.unit.json", unit.name)), unit)
    }

    pub fn remove_unit(&self, class: &str) {
        std::fs::remove_file(self.unit_path(class)).unwrap();
    }

    /// Add a keep rule to a counter-set
    pub fn keep(mut self, counter_set: &str, rule: KeepRuleConfig) -> Self {
        self.keep.entry(counter_set.to_string()).or_default().push(rule);
        self
    }

    /// Keep `class.member` in the default counter-set
    pub fn keep_member(self, class: &str, member: &str) -> Self {
        self.keep("shrink", KeepRuleConfig::member(class, member))
    }

    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.inputs = vec![self.classes()];
        if self.libs().exists() {
            config.libraries = vec![self.libs()];
        }
        config.output = Some(self.out());
        config.keep = self.keep.clone();
        config.omit_empty_shells = self.omit_empty_shells;
        config.report.list_classes = true;
        config.rooted(self.root())
    }

    pub fn shrinker(&self) -> Shrinker {
        Shrinker::new(self.config(), self.root())
    }

    pub fn run(&self, mode: RunMode) -> Result<RunSummary, ShrinkError> {
        self.shrinker().run(mode)
    }

    pub fn full(&self) -> RunSummary {
        self.run(RunMode::Full).unwrap()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::load(&self.state()).unwrap()
    }

    /// The persisted table of a counter-set after the last run
    pub fn table(&self, counter_set: &str) -> CounterTable {
        self.snapshot().counter_set(counter_set).unwrap().table.clone()
    }

    pub fn output_exists(&self, class: &str) -> bool {
        self.out().join(format!("{}.unit.json", class)).exists()
    }

    pub fn read_output(&self, class: &str) -> ParsedUnit {
        let path = self.out().join(format!("{}.unit.json", class));
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }
}

fn write_json(path: &Path, unit: &ParsedUnit) -> PathBuf {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_string_pretty(unit).unwrap()).unwrap();
    path.to_path_buf()
}

pub fn method(class: &str, name: &str, desc: &str) -> NodeId {
    NodeId::method(class, name, desc)
}

pub fn field(class: &str, name: &str, desc: &str) -> NodeId {
    NodeId::field(class, name, desc)
}

pub fn class(name: &str) -> NodeId {
    NodeId::class(name)
}

pub fn kept(table: &CounterTable, id: &NodeId) -> bool {
    table.is_kept(id)
}

pub fn state(table: &CounterTable, id: &NodeId) -> Option<KeepState> {
    table.state(id)
}

pub fn constructor() -> ParsedMethod {
    ParsedMethod::default_constructor(OBJECT).with_modifiers(Modifiers::PUBLIC)
}

pub fn static_main() -> ParsedMethod {
    ParsedMethod::new("main", MAIN_DESC).with_modifiers(Modifiers::PUBLIC | Modifiers::STATIC)
}

/// `Aaa{aaa(),bbb()}`, `Bbb{bbb(Aaa)}`, `Ccc{ccc(Aaa)}`; `Bbb.bbb` calls both
/// methods of `Aaa`
pub fn simple_three_classes() -> Vec<ParsedUnit> {
    vec![
        ParsedUnit::new("sc/Aaa")
            .with_method(constructor())
            .with_method(ParsedMethod::new("aaa", "()V").with_modifiers(Modifiers::PUBLIC))
            .with_method(ParsedMethod::new("bbb", "()V").with_modifiers(Modifiers::PUBLIC)),
        ParsedUnit::new("sc/Bbb").with_method(constructor()).with_method(
            ParsedMethod::new("bbb", "(Lsc/Aaa;)V")
                .with_modifiers(Modifiers::PUBLIC)
                .calls(Dispatch::Virtual, "sc/Aaa", "aaa", "()V")
                .calls(Dispatch::Virtual, "sc/Aaa", "bbb", "()V"),
        ),
        ParsedUnit::new("sc/Ccc").with_method(constructor()).with_method(
            ParsedMethod::new("ccc", "(Lsc/Aaa;)V")
                .with_modifiers(Modifiers::PUBLIC)
                .calls(Dispatch::Virtual, "sc/Aaa", "aaa", "()V"),
        ),
    ]
}

fn subclass_constructor(superclass: &str) -> ParsedMethod {
    ParsedMethod::default_constructor(superclass).with_modifiers(Modifiers::PUBLIC)
}

/// An abstract method implemented three times; `Main.main` only ever
/// instantiates `Impl1` and `Impl2`
pub fn abstract_dispatch() -> Vec<ParsedUnit> {
    let mut units = vec![ParsedUnit::new("ad/AbstractClass")
        .with_modifiers(Modifiers::PUBLIC | Modifiers::ABSTRACT)
        .with_method(constructor())
        .with_method(ParsedMethod::new("abstractMethod", "()V").with_modifiers(Modifiers::PUBLIC | Modifiers::ABSTRACT))];

    for name in ["ad/Impl1", "ad/Impl2", "ad/Impl3"] {
        units.push(
            ParsedUnit::new(name)
                .with_superclass("ad/AbstractClass")
                .with_method(subclass_constructor("ad/AbstractClass"))
                .with_method(ParsedMethod::new("abstractMethod", "()V").with_modifiers(Modifiers::PUBLIC)),
        );
    }

    units.push(
        ParsedUnit::new("ad/Main").with_method(
            static_main()
                .instantiates("ad/Impl1")
                .instantiates("ad/Impl2")
                .calls(Dispatch::Virtual, "ad/AbstractClass", "abstractMethod", "()V"),
        ),
    );
    units
}

/// `Sub` overrides `Base.run` but is never instantiated; `Main` calls
/// `run` on a `Base`
pub fn concrete_dispatch() -> Vec<ParsedUnit> {
    vec![
        ParsedUnit::new("cd/Base")
            .with_method(constructor())
            .with_method(ParsedMethod::new("run", "()V").with_modifiers(Modifiers::PUBLIC)),
        ParsedUnit::new("cd/Sub")
            .with_superclass("cd/Base")
            .with_method(subclass_constructor("cd/Base"))
            .with_method(ParsedMethod::new("run", "()V").with_modifiers(Modifiers::PUBLIC)),
        ParsedUnit::new("cd/Main").with_method(
            static_main()
                .instantiates("cd/Base")
                .calls(Dispatch::Virtual, "cd/Base", "run", "()V"),
        ),
    ]
}

/// `Child extends Parent implements Iface` inherits `call()` from `Parent`,
/// which does not implement `Iface` and is never instantiated itself
pub fn inherited_interface_implementation() -> Vec<ParsedUnit> {
    vec![
        ParsedUnit::new("ii/Iface")
            .with_modifiers(Modifiers::PUBLIC | Modifiers::INTERFACE | Modifiers::ABSTRACT)
            .with_method(ParsedMethod::new("call", "()V").with_modifiers(Modifiers::PUBLIC | Modifiers::ABSTRACT)),
        ParsedUnit::new("ii/Parent")
            .with_method(constructor())
            .with_method(ParsedMethod::new("call", "()V").with_modifiers(Modifiers::PUBLIC))
            .with_method(ParsedMethod::new("unused", "()V").with_modifiers(Modifiers::PUBLIC)),
        ParsedUnit::new("ii/Child")
            .with_superclass("ii/Parent")
            .with_interface("ii/Iface")
            .with_method(subclass_constructor("ii/Parent")),
        ParsedUnit::new("ii/Main").with_method(
            static_main()
                .instantiates("ii/Child")
                .calls(Dispatch::Interface, "ii/Iface", "call", "()V"),
        ),
    ]
}

/// A root class with one visible and one invisible annotation
pub fn annotations() -> Vec<ParsedUnit> {
    let annotation_type = |name: &str| {
        ParsedUnit::new(name)
            .with_modifiers(Modifiers::PUBLIC | Modifiers::INTERFACE | Modifiers::ABSTRACT | Modifiers::ANNOTATION)
            .with_interface("java/lang/annotation/Annotation")
    };
    vec![
        annotation_type("an/Marker"),
        annotation_type("an/Hidden"),
        ParsedUnit::new("an/Main")
            .with_annotation(AnnotationUse::new("an/Marker"))
            .with_annotation(AnnotationUse::new("an/Hidden").invisible())
            .with_method(static_main()),
    ]
}

/// `Outer` lists `Outer$Inner` in its inner-class table but never uses it
pub fn inner_classes() -> Vec<ParsedUnit> {
    let record = InnerClassRecord::new("ic/Outer$Inner", Some("ic/Outer"));
    vec![
        ParsedUnit::new("ic/Outer")
            .with_inner_class(record.clone())
            .with_method(static_main()),
        ParsedUnit::new("ic/Outer$Inner")
            .with_inner_class(record)
            .with_method(constructor()),
    ]
}

/// `Main.main` calls `Util.help`; `Util` has a field nothing reads yet
pub fn body_edit_base() -> Vec<ParsedUnit> {
    vec![
        ParsedUnit::new("be/Util")
            .with_field(ParsedField::new("count", "I").with_modifiers(Modifiers::PUBLIC | Modifiers::STATIC))
            .with_method(ParsedMethod::new("help", "()V").with_modifiers(Modifiers::PUBLIC | Modifiers::STATIC))
            .with_method(ParsedMethod::new("other", "()V").with_modifiers(Modifiers::PUBLIC | Modifiers::STATIC)),
        body_edit_main(false),
    ]
}

/// `Main` before and after a body-only edit that adds a field read
pub fn body_edit_main(reads_field: bool) -> ParsedUnit {
    let mut main = static_main().calls(Dispatch::Static, "be/Util", "help", "()V");
    if reads_field {
        main = main.accesses("be/Util", "count", "I");
    }
    ParsedUnit::new("be/Main").with_method(main)
}

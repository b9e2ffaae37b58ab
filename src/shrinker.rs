//! Run orchestration
//!
//! A full run discovers every unit, builds the graph, marks each
//! counter-set, emits the pruned units of the selected counter-set and saves
//! a snapshot. An incremental run starts from that snapshot instead. In
//! [`RunMode::Auto`] an incremental run that turns out impossible, or a
//! snapshot that cannot be read, falls back to a full run.

use crate::analysis::{CounterSet, CounterTable, ReachabilityEngine, RootPredicate};
use crate::cache::{fingerprint_all, EmitSettings, Snapshot};
use crate::config::{Config, KeepRuleError, KeepRules};
use crate::discovery::FileFinder;
use crate::error::{Result, ShrinkError};
use crate::graph::{BuildStats, ParallelGraphBuilder, ProgramGraph};
use crate::incremental::IncrementalCoordinator;
use crate::prune::{EmitStats, JsonUnitWriter, OutputPruner, UnitWriter};
use crate::unit::{ParsedUnit, UnitReader};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// How a run should obtain its keep sets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Full,
    Incremental,
    /// Incremental when possible, full otherwise
    #[default]
    Auto,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunMode::Full => "full",
            RunMode::Incremental => "incremental",
            RunMode::Auto => "auto",
        };
        f.write_str(name)
    }
}

/// Kept and removed counts of one counter-set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterSetSummary {
    pub name: String,
    pub roots: usize,
    pub kept_classes: usize,
    pub shell_classes: usize,
    pub removed_classes: usize,
    pub kept_members: usize,
    pub removed_members: usize,
    /// Kept program classes, filled in when listing is requested
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub kept: Vec<String>,
    /// Removed program classes, filled in when listing is requested
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
}

impl CounterSetSummary {
    /// Count program classes and members of `graph` against `table`
    pub fn compute(name: &str, graph: &ProgramGraph, table: &CounterTable, list_classes: bool) -> Self {
        let mut summary = Self {
            name: name.to_string(),
            roots: table.roots.len(),
            ..Self::default()
        };

        for class in graph.program_classes() {
            let id = class.id();
            if table.is_kept(&id) {
                summary.kept_classes += 1;
                if !table.is_fully_kept(&id) {
                    summary.shell_classes += 1;
                }
                if list_classes {
                    summary.kept.push(class.name.clone());
                }
            } else {
                summary.removed_classes += 1;
                if list_classes {
                    summary.removed.push(class.name.clone());
                }
            }

            for member in &class.members {
                if table.is_kept(member) {
                    summary.kept_members += 1;
                } else {
                    summary.removed_members += 1;
                }
            }
        }

        summary.kept.sort();
        summary.removed.sort();
        summary
    }
}

/// Everything a run reports
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub requested: RunMode,
    /// Full or incremental, never auto
    pub mode: RunMode,
    /// Why an incremental attempt was abandoned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    pub graph: BuildStats,
    pub counter_sets: Vec<CounterSetSummary>,
    /// Counter-set whose result was written
    pub emitted: String,
    pub output: Option<PathBuf>,
    pub emit: EmitStats,
    /// Units whose bodies were re-linked (incremental runs only)
    pub modified_units: usize,
    pub rewritten: Vec<String>,
    pub retracted: Vec<String>,
    pub warnings: usize,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn counter_set(&self, name: &str) -> Option<&CounterSetSummary> {
        self.counter_sets.iter().find(|s| s.name == name)
    }

    fn new(requested: RunMode, mode: RunMode, emitted: &str, output: Option<PathBuf>) -> Self {
        Self {
            requested,
            mode,
            fallback: None,
            graph: BuildStats::default(),
            counter_sets: Vec::new(),
            emitted: emitted.to_string(),
            output,
            emit: EmitStats::default(),
            modified_units: 0,
            rewritten: Vec::new(),
            retracted: Vec::new(),
            warnings: 0,
            duration_ms: 0,
        }
    }

    fn with_tables(mut self, graph: &ProgramGraph, tables: &BTreeMap<String, CounterTable>, list_classes: bool) -> Self {
        self.graph = BuildStats::from_graph(graph);
        self.warnings = graph.warnings();
        self.counter_sets = tables
            .iter()
            .map(|(name, table)| CounterSetSummary::compute(name, graph, table, list_classes))
            .collect();
        self
    }
}

/// Runs the shrinker over one project
pub struct Shrinker {
    config: Config,
    project_root: PathBuf,
    progress: bool,
}

impl Shrinker {
    /// `config` should already be rooted at `project_root`
    pub fn new(config: Config, project_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            project_root: project_root.into(),
            progress: false,
        }
    }

    /// Show a progress bar while reading units
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state_path(&self) -> PathBuf {
        self.config.state_path(&self.project_root)
    }

    /// Directories the watcher should observe
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .config
            .inputs
            .iter()
            .chain(self.config.libraries.iter())
            .cloned()
            .collect();
        dirs.sort();
        dirs.dedup();
        dirs
    }

    fn emit_settings(&self) -> EmitSettings {
        EmitSettings {
            counter_set: self.config.emit.clone(),
            output: self.config.output.clone(),
            omit_empty_shells: self.config.omit_empty_shells,
        }
    }

    fn keep_rules(&self) -> Result<Vec<KeepRules>> {
        if !self.config.keep.is_empty() && !self.config.keep.contains_key(&self.config.emit) {
            return Err(KeepRuleError::UnknownCounterSet(self.config.emit.clone()).into());
        }
        let rules = self.config.keep_rules()?;
        for set in &rules {
            if set.is_empty() {
                warn!("Counter-set `{}` has no keep rules; every program class will be removed", set.name());
            }
        }
        Ok(rules)
    }

    fn writer(&self) -> Option<JsonUnitWriter> {
        self.config
            .output
            .as_ref()
            .map(|output| JsonUnitWriter::new(output).with_pretty(true))
    }

    /// Run in the given mode
    pub fn run(&self, mode: RunMode) -> Result<RunSummary> {
        match mode {
            RunMode::Full => self.full_run(mode),
            RunMode::Incremental => self.incremental_run(mode),
            RunMode::Auto => match self.incremental_run(mode) {
                Ok(summary) => Ok(summary),
                Err(e) if e.is_recoverable() => {
                    info!("Falling back to a full run: {}", e);
                    let mut summary = self.full_run(mode)?;
                    summary.fallback = Some(e.to_string());
                    Ok(summary)
                }
                Err(e) => Err(e),
            },
        }
    }

    fn full_run(&self, requested: RunMode) -> Result<RunSummary> {
        let start = Instant::now();
        let rules = self.keep_rules()?;

        info!("Discovering unit files...");
        let finder = FileFinder::new(&self.config);
        let program = finder.find_program_units();
        let libraries = finder.find_library_units();
        info!("Found {} program and {} library units", program.len(), libraries.len());

        let (graph, units) = ParallelGraphBuilder::new(self.config.platform.clone())
            .with_progress(self.progress)
            .build_from_files(&program, &libraries)?;

        let engine = ReachabilityEngine::new(&graph);
        let sets: Vec<(String, &dyn RootPredicate)> = rules
            .iter()
            .map(|r| (r.name().to_string(), r as &dyn RootPredicate))
            .collect();
        let tables = engine.compute_counter_sets(&sets);

        let emit = match (self.writer(), tables.get(&self.config.emit)) {
            (Some(writer), Some(table)) => {
                let units: Vec<&ParsedUnit> = units.iter().map(|(unit, _)| unit).collect();
                emit_all(&graph, table, self.config.omit_empty_shells, &units, &writer)?
            }
            _ => EmitStats::default(),
        };

        let state_path = self.state_path();
        let mut snapshot = Snapshot::new(&graph, self.config.platform.clone(), self.emit_settings())
            .with_units(fingerprint_all(&program)?, fingerprint_all(&libraries)?);
        for set in &rules {
            if let Some(table) = tables.get(set.name()) {
                snapshot = snapshot.with_counter_set(set.name(), set.fingerprint(), table.clone());
            }
        }
        save_snapshot(&snapshot, &state_path)?;

        let mut summary = RunSummary::new(requested, RunMode::Full, &self.config.emit, self.config.output.clone())
            .with_tables(&graph, &tables, self.config.report.list_classes);
        summary.emit = emit;
        summary.duration_ms = start.elapsed().as_millis() as u64;

        info!("Full run finished in {}ms", summary.duration_ms);
        Ok(summary)
    }

    fn incremental_run(&self, requested: RunMode) -> Result<RunSummary> {
        let start = Instant::now();
        let rules = self.keep_rules()?;

        let finder = FileFinder::new(&self.config);
        let program = finder.find_program_units();
        let libraries = finder.find_library_units();

        let sets: Vec<CounterSet<'_>> = rules
            .iter()
            .map(|r| CounterSet::new(r.name(), r.fingerprint(), r))
            .collect();

        let reader = UnitReader::new();
        let writer = self.writer();
        let mut coordinator = IncrementalCoordinator::new(&reader)
            .with_platform(self.config.platform.clone())
            .with_emit(self.emit_settings());
        if let Some(writer) = &writer {
            coordinator = coordinator.with_writer(writer);
        }

        let outcome = coordinator.run(&self.state_path(), &program, &libraries, &sets)?;

        let mut summary = RunSummary::new(
            requested,
            RunMode::Incremental,
            &self.config.emit,
            self.config.output.clone(),
        )
        .with_tables(&outcome.graph, &outcome.tables, self.config.report.list_classes);
        summary.emit = outcome.emit;
        summary.modified_units = outcome.modified.len();
        summary.rewritten = outcome.rewritten;
        summary.retracted = outcome.retracted;
        summary.duration_ms = start.elapsed().as_millis() as u64;
        Ok(summary)
    }
}

/// Emit every program unit, then sweep outputs left behind by classes that
/// are no longer part of the program
fn emit_all(
    graph: &ProgramGraph,
    table: &CounterTable,
    omit_empty_shells: bool,
    units: &[&ParsedUnit],
    writer: &dyn UnitWriter,
) -> Result<EmitStats> {
    let pruner = OutputPruner::new(graph, table).with_omit_empty_shells(omit_empty_shells);
    let mut stats = pruner.emit(units, writer)?;

    let stale: Vec<String> = writer
        .existing()
        .into_iter()
        .filter(|name| graph.class(name).map_or(true, |class| !class.is_program()))
        .collect();
    if !stale.is_empty() {
        debug!("Removing {} outputs of vanished classes", stale.len());
        stats.deleted += pruner.retract(&stale, writer)?;
    }
    Ok(stats)
}

fn save_snapshot(snapshot: &Snapshot, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ShrinkError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    snapshot.save(path)?;
    info!("Saved state to {} ({})", path.display(), snapshot.stats());
    Ok(())
}

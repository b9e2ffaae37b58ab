//! Incremental runs
//!
//! Loads the last snapshot, checks that every changed unit kept its
//! structure, swaps in the new body edges and re-marks each counter-set from
//! its previous table. Anything the delta cannot express ends the run with
//! [`IncrementalError::RequireFull`], leaving the snapshot untouched.

mod validate;

pub use validate::{structural_changes, StructuralChange};

use crate::analysis::{CounterSet, CounterTable, MarkContext, Marker, RemarkStats};
use crate::cache::{EmitSettings, Snapshot, SnapshotError, UnitChanges, UnitFingerprint};
use crate::graph::{EdgeDelta, GraphBuilder, Hierarchy, PlatformTypes, ProgramGraph};
use crate::prune::{EmitStats, KeepMask, OutputPruner, UnitWriter, WriteError};
use crate::unit::{ParsedUnit, UnitError, UnitSource};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum IncrementalError {
    #[error("Incremental run impossible: {}", join(.changes))]
    RequireFull { changes: Vec<StructuralChange> },

    #[error("Persisted state unusable: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("Failed to fingerprint {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn join(changes: &[StructuralChange]) -> String {
    changes.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
}

impl IncrementalError {
    /// A full run is the right answer, not a failure
    pub fn is_recoverable(&self) -> bool {
        matches!(self, IncrementalError::RequireFull { .. } | IncrementalError::Snapshot(_))
    }

    pub fn changes(&self) -> &[StructuralChange] {
        match self {
            IncrementalError::RequireFull { changes } => changes,
            _ => &[],
        }
    }
}

/// What an incremental run did
#[derive(Debug, Clone)]
pub struct IncrementalOutcome {
    pub modified: Vec<PathBuf>,
    pub remark: BTreeMap<String, RemarkStats>,
    pub tables: BTreeMap<String, CounterTable>,
    pub emit: EmitStats,
    /// Classes whose output was rewritten
    pub rewritten: Vec<String>,
    /// Classes whose output was deleted
    pub retracted: Vec<String>,
    /// The re-linked graph the tables refer to
    pub graph: ProgramGraph,
}

/// Drives one incremental run against a persisted snapshot
pub struct IncrementalCoordinator<'a> {
    source: &'a dyn UnitSource,
    writer: Option<&'a dyn UnitWriter>,
    platform: PlatformTypes,
    emit: EmitSettings,
}

impl<'a> IncrementalCoordinator<'a> {
    pub fn new(source: &'a dyn UnitSource) -> Self {
        Self {
            source,
            writer: None,
            platform: PlatformTypes::default(),
            emit: EmitSettings::default(),
        }
    }

    pub fn with_writer(mut self, writer: &'a dyn UnitWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn with_platform(mut self, platform: PlatformTypes) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_emit(mut self, emit: EmitSettings) -> Self {
        self.emit = emit;
        self
    }

    /// Everything that rules out an incremental run, plus the parsed
    /// modified units when nothing does
    fn validate(
        &self,
        snapshot: &Snapshot,
        graph: &ProgramGraph,
        program: &[PathBuf],
        libraries: &[PathBuf],
        counter_sets: &[CounterSet<'_>],
    ) -> Result<Vec<(PathBuf, ParsedUnit)>, IncrementalError> {
        let mut changes = Vec::new();

        if snapshot.platform != self.platform || snapshot.emit != self.emit {
            changes.push(StructuralChange::Settings);
        }
        for set in counter_sets {
            match snapshot.counter_set(set.name) {
                Some(state) if state.fingerprint == set.fingerprint => {}
                _ => changes.push(StructuralChange::KeepRules(set.name.to_string())),
            }
        }

        let library_changes = UnitChanges::detect(&snapshot.libraries, libraries);
        changes.extend(library_changes.added.into_iter().map(StructuralChange::FileAdded));
        changes.extend(library_changes.removed.into_iter().map(StructuralChange::FileRemoved));
        changes.extend(library_changes.modified.into_iter().map(StructuralChange::LibraryChanged));

        let unit_changes = UnitChanges::detect(&snapshot.units, program);
        changes.extend(unit_changes.added.into_iter().map(StructuralChange::FileAdded));
        changes.extend(unit_changes.removed.into_iter().map(StructuralChange::FileRemoved));

        // The old graph is only read here; nothing is replaced until every unit passes
        let mut modified = Vec::new();
        for path in unit_changes.modified {
            let unit = self.source.load(&path)?;
            let unit_changes = structural_changes(graph, &path, &unit);
            if unit_changes.is_empty() {
                debug!("{} changed bodies only", path.display());
            }
            changes.extend(unit_changes);
            modified.push((path, unit));
        }

        if changes.is_empty() {
            Ok(modified)
        } else {
            Err(IncrementalError::RequireFull { changes })
        }
    }

    /// Run incrementally, persisting the new state to `state_path`
    pub fn run(
        &self,
        state_path: &Path,
        program: &[PathBuf],
        libraries: &[PathBuf],
        counter_sets: &[CounterSet<'_>],
    ) -> Result<IncrementalOutcome, IncrementalError> {
        let start = Instant::now();
        let snapshot = Snapshot::load(state_path)?;
        let mut graph = snapshot.to_graph()?;

        let modified = self.validate(&snapshot, &graph, program, libraries, counter_sets)?;
        info!("Incremental run: {} modified units", modified.len());

        let hierarchy = Hierarchy::new(&graph);
        let mut markers: Vec<(String, Marker)> = {
            let cx = MarkContext {
                graph: &graph,
                hierarchy: &hierarchy,
            };
            counter_sets
                .iter()
                .filter_map(|set| {
                    let state = snapshot.counter_set(set.name)?;
                    Some((set.name.to_string(), Marker::restore(&cx, &state.table)))
                })
                .collect()
        };

        let emit_table = snapshot
            .counter_set(&self.emit.counter_set)
            .map(|state| state.table.clone());
        let old_masks = emit_table.as_ref().map(|table| {
            OutputPruner::new(&graph, table)
                .with_omit_empty_shells(self.emit.omit_empty_shells)
                .masks()
        });

        let mut delta = EdgeDelta::default();
        for (_, unit) in &modified {
            delta.extend(GraphBuilder::relink_bodies(&mut graph, &self.platform, unit));
        }
        GraphBuilder::drop_orphan_placeholders(&mut graph, &mut delta);
        debug!(
            "Body delta: {} removed, {} added edges, {} placeholders dropped",
            delta.removed.len(),
            delta.added.len(),
            delta.dropped.len()
        );

        let cx = MarkContext {
            graph: &graph,
            hierarchy: &hierarchy,
        };
        let remark: BTreeMap<String, RemarkStats> = markers
            .par_iter_mut()
            .map(|(name, marker)| (name.clone(), marker.remark(&cx, &delta)))
            .collect();
        let tables: BTreeMap<String, CounterTable> = markers
            .into_iter()
            .map(|(name, marker)| (name, marker.into_table(&graph)))
            .collect();

        let mut emitted = (Vec::new(), Vec::new(), EmitStats::default());
        if let (Some(writer), Some(table), Some(old_masks)) =
            (self.writer, tables.get(&self.emit.counter_set), old_masks.as_ref())
        {
            let pruner = OutputPruner::new(&graph, table).with_omit_empty_shells(self.emit.omit_empty_shells);
            emitted = self.emit_changed(&graph, &pruner, old_masks, &modified, writer)?;
        }
        let (rewritten, retracted, emit) = emitted;

        let mut units = snapshot.units.clone();
        for (path, _) in &modified {
            let fingerprint = UnitFingerprint::from_path(path).map_err(|source| IncrementalError::Io {
                path: path.clone(),
                source,
            })?;
            units.insert(path.clone(), fingerprint);
        }

        let mut next = Snapshot::new(&graph, self.platform.clone(), self.emit.clone())
            .with_units(units, snapshot.libraries.clone());
        for set in counter_sets {
            if let Some(table) = tables.get(set.name) {
                next = next.with_counter_set(set.name, set.fingerprint, table.clone());
            }
        }
        next.save(state_path)?;

        info!(
            "Incremental run finished in {:.2}ms: {} rewritten, {} retracted",
            start.elapsed().as_secs_f64() * 1000.0,
            rewritten.len(),
            retracted.len()
        );
        Ok(IncrementalOutcome {
            modified: modified.into_iter().map(|(path, _)| path).collect(),
            remark,
            tables,
            emit,
            rewritten,
            retracted,
            graph,
        })
    }

    /// Rewrite modified kept units and units whose mask changed; delete
    /// outputs of units that are no longer emitted
    fn emit_changed(
        &self,
        graph: &ProgramGraph,
        pruner: &OutputPruner<'_>,
        old_masks: &BTreeMap<String, KeepMask>,
        modified: &[(PathBuf, ParsedUnit)],
        writer: &dyn UnitWriter,
    ) -> Result<(Vec<String>, Vec<String>, EmitStats), IncrementalError> {
        let new_masks = pruner.masks();

        let mut rewrite: BTreeSet<String> = modified
            .iter()
            .filter(|(_, unit)| pruner.emits(new_masks.get(&unit.name)))
            .map(|(_, unit)| unit.name.clone())
            .collect();
        for (name, mask) in &new_masks {
            if pruner.emits(Some(mask)) && old_masks.get(name) != Some(mask) {
                rewrite.insert(name.clone());
            }
        }
        let retract: Vec<String> = old_masks
            .iter()
            .filter(|(name, mask)| pruner.emits(Some(mask)) && !pruner.emits(new_masks.get(*name)))
            .map(|(name, _)| name.clone())
            .collect();

        let by_name: HashMap<&str, &ParsedUnit> =
            modified.iter().map(|(_, unit)| (unit.name.as_str(), unit)).collect();
        let mut loaded = Vec::new();
        for name in &rewrite {
            if by_name.contains_key(name.as_str()) {
                continue;
            }
            let Some(path) = graph.class(name).and_then(|c| c.origin.source()) else {
                continue;
            };
            loaded.push(self.source.load(path)?);
        }

        let mut units: Vec<&ParsedUnit> = by_name
            .iter()
            .filter(|(name, _)| rewrite.contains(**name))
            .map(|(_, unit)| *unit)
            .collect();
        units.extend(loaded.iter());

        let mut stats = pruner.emit(&units, writer)?;
        stats.deleted += pruner.retract(&retract, writer)?;

        Ok((rewrite.into_iter().collect(), retract, stats))
    }
}

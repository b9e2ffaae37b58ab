//! Output pruning
//!
//! Turns a counter table into a per-class [`KeepMask`] and hands each kept
//! program unit, filtered through its mask, to a [`UnitWriter`].

mod writer;

pub use writer::{JsonUnitWriter, UnitWriter, WriteError};

use crate::analysis::{CounterTable, KeepState};
use crate::graph::{ClassNode, NodeId, ProgramGraph};
use crate::unit::{AnnotationUse, InnerClassRecord, MemberKey, ParsedUnit};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Which parts of one compiled unit survive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeepMask {
    pub class: String,
    pub state: KeepState,
    pub root: bool,
    pub methods: BTreeSet<MemberKey>,
    pub fields: BTreeSet<MemberKey>,
    /// Declared interfaces that are still kept, in declaration order
    pub interfaces: Vec<String>,
    pub inner_classes: Vec<InnerClassRecord>,
    pub class_annotations: BTreeSet<String>,
    /// Kept annotation types per member, keyed by `name:descriptor`
    pub member_annotations: BTreeMap<String, BTreeSet<String>>,
    /// Kept classes whose superclass or interface list names this class
    pub structural_dependents: usize,
}

impl KeepMask {
    pub fn member_count(&self) -> usize {
        self.methods.len() + self.fields.len()
    }

    /// Shell with nothing inside and nothing extending it
    pub fn is_empty_shell(&self) -> bool {
        self.state == KeepState::Shell && !self.root && self.member_count() == 0 && self.structural_dependents == 0
    }

    /// The unit as it should be written out
    pub fn apply(&self, unit: &ParsedUnit) -> ParsedUnit {
        let mut pruned = unit.clone();

        pruned.interfaces = self.interfaces.clone();
        pruned.inner_classes = self.inner_classes.clone();
        pruned.annotations = retain_annotations(&unit.annotations, &self.class_annotations);

        pruned.methods.retain(|m| self.methods.contains(&m.key()));
        for method in &mut pruned.methods {
            let kept = self.member_annotations.get(&method.key().to_string());
            method.annotations = match kept {
                Some(kept) => retain_annotations(&method.annotations, kept),
                None => Vec::new(),
            };
        }

        pruned.fields.retain(|f| self.fields.contains(&f.key()));
        for field in &mut pruned.fields {
            let kept = self.member_annotations.get(&field.key().to_string());
            field.annotations = match kept {
                Some(kept) => retain_annotations(&field.annotations, kept),
                None => Vec::new(),
            };
        }

        pruned
    }
}

fn retain_annotations(annotations: &[AnnotationUse], kept: &BTreeSet<String>) -> Vec<AnnotationUse> {
    annotations
        .iter()
        .filter(|a| kept.contains(&a.type_name))
        .cloned()
        .collect()
}

/// Counts from one emit pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmitStats {
    pub written: usize,
    pub deleted: usize,
    /// Empty shells skipped on request
    pub omitted: usize,
}

impl EmitStats {
    fn merge(mut self, other: Self) -> Self {
        self.written += other.written;
        self.deleted += other.deleted;
        self.omitted += other.omitted;
        self
    }
}

/// Computes keep masks for one counter-set and writes the pruned units
pub struct OutputPruner<'a> {
    graph: &'a ProgramGraph,
    table: &'a CounterTable,
    omit_empty_shells: bool,
}

impl<'a> OutputPruner<'a> {
    pub fn new(graph: &'a ProgramGraph, table: &'a CounterTable) -> Self {
        Self {
            graph,
            table,
            omit_empty_shells: false,
        }
    }

    /// Skip classes with no kept members and no kept subtypes
    pub fn with_omit_empty_shells(mut self, omit: bool) -> Self {
        self.omit_empty_shells = omit;
        self
    }

    /// A name counts as kept unless it is a program class the table dropped
    fn class_survives(&self, name: &str) -> bool {
        match self.graph.class(name) {
            Some(class) if class.is_program() => self.table.is_kept(&class.id()),
            _ => true,
        }
    }

    /// Mask for a program class, `None` when the class is not kept
    pub fn mask(&self, class_name: &str) -> Option<KeepMask> {
        let class = self.graph.class(class_name).filter(|c| c.is_program())?;
        let id = class.id();
        let state = self.table.state(&id)?;
        Some(self.build_mask(class, &id, state))
    }

    fn build_mask(&self, class: &ClassNode, id: &NodeId, state: KeepState) -> KeepMask {
        let mut methods = BTreeSet::new();
        let mut fields = BTreeSet::new();
        let mut member_annotations = BTreeMap::new();

        for member_id in &class.members {
            if !self.table.is_fully_kept(member_id) {
                continue;
            }
            let Some(member) = self.graph.member(member_id) else {
                continue;
            };
            let key = MemberKey::new(member.name(), member.descriptor());
            let annotations: BTreeSet<String> = member
                .annotations
                .iter()
                .filter(|a| self.class_survives(a))
                .cloned()
                .collect();
            member_annotations.insert(key.to_string(), annotations);
            if member.is_method() {
                methods.insert(key);
            } else {
                fields.insert(key);
            }
        }

        let interfaces = class
            .interfaces
            .iter()
            .filter(|i| self.class_survives(i))
            .cloned()
            .collect();

        let inner_classes = class
            .inner_classes
            .iter()
            .filter(|record| {
                self.class_survives(&record.inner)
                    && record.outer.as_deref().map_or(true, |outer| self.class_survives(outer))
            })
            .cloned()
            .collect();

        let class_annotations = class
            .annotations
            .iter()
            .filter(|a| self.class_survives(a))
            .cloned()
            .collect();

        let structural_dependents = self.graph.index(id).map_or(0, |idx| {
            self.graph
                .incoming(idx)
                .filter(|(source, kind)| {
                    kind.is_hierarchy()
                        && self
                            .graph
                            .id_at(*source)
                            .map_or(false, |source| self.table.is_kept(source))
                })
                .count()
        });

        KeepMask {
            class: class.name.clone(),
            state,
            root: self.table.is_root(id),
            methods,
            fields,
            interfaces,
            inner_classes,
            class_annotations,
            member_annotations,
            structural_dependents,
        }
    }

    /// Masks for every kept program class
    pub fn masks(&self) -> BTreeMap<String, KeepMask> {
        let classes: Vec<&ClassNode> = self.graph.program_classes().collect();
        classes
            .par_iter()
            .filter_map(|class| {
                let id = class.id();
                let state = self.table.state(&id)?;
                Some((class.name.clone(), self.build_mask(class, &id, state)))
            })
            .collect()
    }

    fn should_write(&self, mask: &KeepMask) -> bool {
        !(self.omit_empty_shells && mask.is_empty_shell())
    }

    /// Write every kept unit in `units` and delete the output of the rest
    pub fn emit(&self, units: &[&ParsedUnit], writer: &dyn UnitWriter) -> Result<EmitStats, WriteError> {
        let stats = units
            .par_iter()
            .map(|unit| -> Result<EmitStats, WriteError> {
                let mut stats = EmitStats::default();
                match self.mask(&unit.name) {
                    Some(mask) if self.should_write(&mask) => {
                        let path = writer.write(&mask.apply(unit), &mask)?;
                        debug!("Wrote {} ({} members)", path.display(), mask.member_count());
                        stats.written += 1;
                    }
                    Some(_) => {
                        stats.omitted += 1;
                        if writer.delete(&unit.name)? {
                            stats.deleted += 1;
                        }
                    }
                    None => {
                        if writer.delete(&unit.name)? {
                            stats.deleted += 1;
                        }
                    }
                }
                Ok(stats)
            })
            .try_reduce(EmitStats::default, |a, b| Ok(a.merge(b)))?;

        info!(
            "Emitted {} units, deleted {} stale outputs, omitted {} empty shells",
            stats.written, stats.deleted, stats.omitted
        );
        Ok(stats)
    }

    /// Delete outputs of classes that are no longer emitted
    pub fn retract(&self, classes: &[String], writer: &dyn UnitWriter) -> Result<usize, WriteError> {
        let mut deleted = 0;
        for class in classes {
            if writer.delete(class)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Whether `mask` would be written by this pruner
    pub fn emits(&self, mask: Option<&KeepMask>) -> bool {
        mask.map_or(false, |m| self.should_write(m))
    }
}

// Structural validation - a modified unit may only change its bodies

use crate::graph::{class_node, field_node, method_node, MemberNode, NodeId, Origin, ProgramGraph};
use crate::unit::ParsedUnit;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// One reason an incremental run cannot proceed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralChange {
    FileAdded(PathBuf),
    FileRemoved(PathBuf),
    LibraryChanged(PathBuf),
    /// The file now holds a class the snapshot does not attribute to it
    ClassReplaced { path: PathBuf, class: String },
    BecameLibrary(String),
    MemberAdded(NodeId),
    MemberRemoved(NodeId),
    Superclass(String),
    Interfaces(String),
    Modifiers(NodeId),
    AnnotationAdded { annotation: String, target: NodeId },
    AnnotationRemoved { annotation: String, target: NodeId },
    AnnotationValues(NodeId),
    Exceptions(NodeId),
    AnnotationDefault(NodeId),
    InnerClasses(String),
    KeepRules(String),
    Settings,
}

fn kind_label(id: &NodeId) -> &'static str {
    match id {
        NodeId::Class(_) => "Class",
        NodeId::Method(_) => "Method",
        NodeId::Field(_) => "Field",
    }
}

/// Classes print bare, members with their kind
struct Subject<'a>(&'a NodeId);

impl fmt::Display for Subject<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            NodeId::Class(name) => write!(f, "{}", name),
            member => write!(f, "{} {}", kind_label(member), member),
        }
    }
}

impl fmt::Display for StructuralChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralChange::FileAdded(path) => write!(f, "File {} added.", path.display()),
            StructuralChange::FileRemoved(path) => write!(f, "File {} removed.", path.display()),
            StructuralChange::LibraryChanged(path) => write!(f, "Library {} changed.", path.display()),
            StructuralChange::ClassReplaced { path, class } => {
                write!(f, "File {} now declares {}.", path.display(), class)
            }
            StructuralChange::BecameLibrary(class) => write!(f, "{} became a library class.", class),
            StructuralChange::MemberAdded(id) => write!(f, "{} {} added.", kind_label(id), id),
            StructuralChange::MemberRemoved(id) => write!(f, "{} {} removed.", kind_label(id), id),
            StructuralChange::Superclass(class) => write!(f, "{} superclass changed.", class),
            StructuralChange::Interfaces(class) => write!(f, "{} interfaces changed.", class),
            StructuralChange::Modifiers(id) => write!(f, "{} modifiers changed.", Subject(id)),
            StructuralChange::AnnotationAdded { annotation, target } => {
                write!(f, "Annotation {} on {} added.", annotation, target)
            }
            StructuralChange::AnnotationRemoved { annotation, target } => {
                write!(f, "Annotation {} on {} removed.", annotation, target)
            }
            StructuralChange::AnnotationValues(id) => write!(f, "{} annotation values changed.", Subject(id)),
            StructuralChange::Exceptions(id) => write!(f, "{} exceptions changed.", Subject(id)),
            StructuralChange::AnnotationDefault(id) => write!(f, "{} annotation default changed.", Subject(id)),
            StructuralChange::InnerClasses(class) => write!(f, "{} inner classes changed.", class),
            StructuralChange::KeepRules(name) => write!(f, "Keep rules of counter-set {} changed.", name),
            StructuralChange::Settings => write!(f, "Platform or output settings changed."),
        }
    }
}

fn compare_annotations(
    target: &NodeId,
    stored: &BTreeSet<String>,
    fresh: &BTreeSet<String>,
    changes: &mut Vec<StructuralChange>,
) {
    for annotation in fresh.difference(stored) {
        changes.push(StructuralChange::AnnotationAdded {
            annotation: annotation.clone(),
            target: target.clone(),
        });
    }
    for annotation in stored.difference(fresh) {
        changes.push(StructuralChange::AnnotationRemoved {
            annotation: annotation.clone(),
            target: target.clone(),
        });
    }
}

fn compare_member(stored: &MemberNode, fresh: &MemberNode, changes: &mut Vec<StructuralChange>) {
    let id = &stored.id;
    if stored.modifiers != fresh.modifiers {
        changes.push(StructuralChange::Modifiers(id.clone()));
    }
    compare_annotations(id, &stored.annotations, &fresh.annotations, changes);
    if stored.annotation_refs != fresh.annotation_refs {
        changes.push(StructuralChange::AnnotationValues(id.clone()));
    }
    if stored.exceptions != fresh.exceptions {
        changes.push(StructuralChange::Exceptions(id.clone()));
    }
    if stored.annotation_default != fresh.annotation_default {
        changes.push(StructuralChange::AnnotationDefault(id.clone()));
    }
}

/// Every structural difference between `unit` and what the graph holds for it.
///
/// Empty means only method bodies and generic signatures changed.
pub fn structural_changes(graph: &ProgramGraph, path: &Path, unit: &ParsedUnit) -> Vec<StructuralChange> {
    let mut changes = Vec::new();

    let stored = match graph.class(&unit.name) {
        Some(class) if class.origin.source().map(PathBuf::as_path) == Some(path) => class,
        _ => {
            changes.push(StructuralChange::ClassReplaced {
                path: path.to_path_buf(),
                class: unit.name.clone(),
            });
            return changes;
        }
    };
    if unit.library {
        changes.push(StructuralChange::BecameLibrary(unit.name.clone()));
        return changes;
    }

    let fresh = class_node(
        unit,
        Origin::Program {
            source: path.to_path_buf(),
        },
    );
    let class_id = stored.id();

    if stored.modifiers != fresh.modifiers {
        changes.push(StructuralChange::Modifiers(class_id.clone()));
    }
    if stored.superclass != fresh.superclass {
        changes.push(StructuralChange::Superclass(unit.name.clone()));
    }
    if stored.interfaces != fresh.interfaces {
        changes.push(StructuralChange::Interfaces(unit.name.clone()));
    }
    compare_annotations(&class_id, &stored.annotations, &fresh.annotations, &mut changes);
    if stored.annotation_refs != fresh.annotation_refs {
        changes.push(StructuralChange::AnnotationValues(class_id.clone()));
    }
    if stored.inner_classes != fresh.inner_classes {
        changes.push(StructuralChange::InnerClasses(unit.name.clone()));
    }

    let fresh_members: BTreeMap<NodeId, MemberNode> = unit
        .methods
        .iter()
        .map(|m| method_node(&unit.name, m))
        .chain(unit.fields.iter().map(|f| field_node(&unit.name, f)))
        .map(|m| (m.id.clone(), m))
        .collect();

    for id in &stored.members {
        if !fresh_members.contains_key(id) {
            changes.push(StructuralChange::MemberRemoved(id.clone()));
        }
    }
    for (id, fresh_member) in &fresh_members {
        match graph.member(id).filter(|_| stored.members.contains(id)) {
            Some(stored_member) => compare_member(stored_member, fresh_member, &mut changes),
            None => changes.push(StructuralChange::MemberAdded(id.clone())),
        }
    }

    changes
}

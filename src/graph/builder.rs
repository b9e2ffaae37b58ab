use super::hierarchy::{find_cycle, Hierarchy};
use super::{
    is_object_method, ClassNode, EdgeKind, MemberNode, Node, NodeId, NodeKind, Origin, ProgramGraph, Resolution,
    UseKind,
};
use crate::unit::descriptor::{element_class, referenced_classes, signature_classes};
use crate::unit::{
    AnnotationUse, Dispatch, Instruction, ParsedMethod, ParsedUnit, UnitError, CONSTRUCTOR_NAME, OBJECT_CLASS,
    STATIC_INITIALIZER_NAME,
};
use petgraph::stable_graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error("class {0} is defined by more than one program unit")]
    DuplicateClass(String),

    #[error("cyclic class hierarchy through {0}")]
    CyclicHierarchy(String),
}

/// Recognizes platform types that have no unit of their own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformTypes {
    prefixes: Vec<String>,
    exclusions: Vec<String>,
}

impl PlatformTypes {
    pub fn new(prefixes: Vec<String>, exclusions: Vec<String>) -> Self {
        Self { prefixes, exclusions }
    }

    pub fn is_platform(&self, class: &str) -> bool {
        self.prefixes.iter().any(|p| class.starts_with(p.as_str()))
            && !self.exclusions.iter().any(|e| class.contains(e.as_str()))
    }
}

impl Default for PlatformTypes {
    fn default() -> Self {
        Self::new(
            vec!["java/".into(), "javax/".into(), "android/".into()],
            vec!["/support/".into()],
        )
    }
}

/// Counts describing a built graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    pub program_classes: usize,
    pub library_classes: usize,
    pub unresolved_classes: usize,
    pub members: usize,
    pub edges: usize,
    pub warnings: usize,
}

impl BuildStats {
    pub fn from_graph(graph: &ProgramGraph) -> Self {
        let mut stats = Self {
            members: graph.members().count(),
            edges: graph.edge_count(),
            warnings: graph.warnings(),
            ..Self::default()
        };
        for class in graph.classes() {
            match class.origin {
                Origin::Program { .. } => stats.program_classes += 1,
                Origin::Library => stats.library_classes += 1,
                Origin::Unresolved => stats.unresolved_classes += 1,
            }
        }
        stats
    }
}

pub type EdgeTriple = (NodeIndex, NodeIndex, EdgeKind);

/// Body edges changed by relinking one unit
#[derive(Debug, Clone, Default)]
pub struct EdgeDelta {
    pub removed: Vec<EdgeTriple>,
    pub added: Vec<EdgeTriple>,
    /// Unresolved placeholders that lost their last reference
    pub dropped: Vec<NodeIndex>,
}

impl EdgeDelta {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty() && self.dropped.is_empty()
    }

    pub fn extend(&mut self, other: EdgeDelta) {
        self.removed.extend(other.removed);
        self.added.extend(other.added);
        self.dropped.extend(other.dropped);
    }
}

/// Builder for the program graph.
///
/// Units are collected first and linked in `build`, once every class name
/// in the universe is known.
pub struct GraphBuilder {
    platform: PlatformTypes,
    program: Vec<(ParsedUnit, PathBuf)>,
    libraries: Vec<ParsedUnit>,
    names: HashMap<String, PathBuf>,
}

impl GraphBuilder {
    pub fn new(platform: PlatformTypes) -> Self {
        Self {
            platform,
            program: Vec::new(),
            libraries: Vec::new(),
            names: HashMap::new(),
        }
    }

    /// Queue a program unit read from `source`
    pub fn add_unit(&mut self, unit: ParsedUnit, source: PathBuf) -> Result<(), BuildError> {
        unit.validate()?;
        if unit.name == OBJECT_CLASS {
            debug!("Ignoring unit for the root type at {}", source.display());
            return Ok(());
        }
        if unit.library {
            self.libraries.push(unit);
            return Ok(());
        }
        if let Some(previous) = self.names.insert(unit.name.clone(), source.clone()) {
            debug!("{} defined by {} and {}", unit.name, previous.display(), source.display());
            return Err(BuildError::DuplicateClass(unit.name));
        }
        self.program.push((unit, source));
        Ok(())
    }

    /// Queue a library unit; it contributes structure only
    pub fn add_library_unit(&mut self, unit: ParsedUnit) -> Result<(), BuildError> {
        unit.validate()?;
        if unit.name != OBJECT_CLASS {
            self.libraries.push(unit);
        }
        Ok(())
    }

    pub fn build(self) -> Result<ProgramGraph, BuildError> {
        self.build_keeping_units().map(|(graph, _)| graph)
    }

    /// Build the graph and hand back the program units for emission
    pub fn build_keeping_units(self) -> Result<(ProgramGraph, Vec<(ParsedUnit, PathBuf)>), BuildError> {
        let mut graph = ProgramGraph::new();

        for (unit, source) in &self.program {
            insert_declarations(
                &mut graph,
                unit,
                Origin::Program {
                    source: source.clone(),
                },
            );
        }
        for unit in &self.libraries {
            if self.names.contains_key(&unit.name) {
                debug!("Program unit shadows library class {}", unit.name);
                continue;
            }
            insert_declarations(&mut graph, unit, Origin::Library);
        }

        let mut linker = Linker {
            graph: &mut graph,
            platform: &self.platform,
        };
        for (unit, _) in &self.program {
            linker.link_hierarchy(unit);
        }
        for unit in self.libraries.iter().filter(|u| !self.names.contains_key(&u.name)) {
            linker.link_hierarchy(unit);
        }

        if let Some(class) = find_cycle(linker.graph) {
            return Err(BuildError::CyclicHierarchy(class));
        }

        for (unit, _) in &self.program {
            linker.link_declarations(unit);
            linker.link_bodies(unit);
        }

        let hierarchy = Hierarchy::new(linker.graph);
        for (unit, _) in &self.program {
            linker.link_overrides(unit, &hierarchy);
        }

        let stats = BuildStats::from_graph(&graph);
        info!(
            "Built graph: {} program classes, {} library, {} unresolved, {} members, {} edges",
            stats.program_classes, stats.library_classes, stats.unresolved_classes, stats.members, stats.edges
        );

        Ok((graph, self.program))
    }

    /// Replace the body edges of an already linked unit.
    ///
    /// Used by incremental runs after the unit's structure has been
    /// validated against the graph; only `USES` and `SIGNATURE` edges change.
    pub fn relink_bodies(graph: &mut ProgramGraph, platform: &PlatformTypes, unit: &ParsedUnit) -> EdgeDelta {
        let mut removed = Vec::new();
        for id in unit_node_ids(unit) {
            graph.clear_missing_refs(&id);
            if let Some(idx) = graph.index(&id) {
                removed.extend(graph.remove_edges_from(idx, EdgeKind::is_body));
            }
        }

        if let Some(class) = graph.class_mut(&unit.name) {
            class.signature = unit.signature.clone();
        }
        for method in &unit.methods {
            if let Some(member) = graph.member_mut(&NodeId::method(&unit.name, &method.name, &method.descriptor)) {
                member.signature = method.signature.clone();
            }
        }
        for field in &unit.fields {
            if let Some(member) = graph.member_mut(&NodeId::field(&unit.name, &field.name, &field.descriptor)) {
                member.signature = field.signature.clone();
            }
        }

        let mut linker = Linker { graph, platform };
        let added = linker.link_bodies(unit);

        let before: HashSet<EdgeTriple> = removed.iter().cloned().collect();
        let after: HashSet<EdgeTriple> = added.iter().cloned().collect();
        EdgeDelta {
            removed: removed.into_iter().filter(|e| !after.contains(e)).collect(),
            added: added.into_iter().filter(|e| !before.contains(e)).collect(),
            dropped: Vec::new(),
        }
    }

    /// Remove unresolved placeholders that no edge points at any more.
    ///
    /// Run once after every modified unit has been relinked, so a placeholder
    /// still referenced by a later unit survives. Each dropped placeholder
    /// takes back the warning its creation recorded.
    pub fn drop_orphan_placeholders(graph: &mut ProgramGraph, delta: &mut EdgeDelta) {
        let candidates: BTreeSet<NodeIndex> = delta.removed.iter().map(|&(_, target, _)| target).collect();
        for idx in candidates {
            let orphan = matches!(graph.node_at(idx), Some(Node::Class(c)) if c.origin == Origin::Unresolved)
                && graph.incoming(idx).next().is_none();
            if !orphan {
                continue;
            }
            if let Some(id) = graph.remove_node(idx) {
                debug!("Dropped unreferenced placeholder {}", id);
                graph.discard_warning();
                delta.dropped.push(idx);
            }
        }
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new(PlatformTypes::default())
    }
}

fn unit_node_ids(unit: &ParsedUnit) -> Vec<NodeId> {
    std::iter::once(NodeId::class(&unit.name))
        .chain(
            unit.methods
                .iter()
                .map(|m| NodeId::method(&unit.name, &m.name, &m.descriptor)),
        )
        .chain(
            unit.fields
                .iter()
                .map(|f| NodeId::field(&unit.name, &f.name, &f.descriptor)),
        )
        .collect()
}

fn annotation_types(annotations: &[AnnotationUse]) -> BTreeSet<String> {
    annotations.iter().map(|a| a.type_name.clone()).collect()
}

fn annotation_refs(annotations: &[AnnotationUse]) -> BTreeSet<String> {
    annotations
        .iter()
        .flat_map(|a| a.references.iter().cloned())
        .collect()
}

/// Class and member nodes for a unit, without edges
pub(crate) fn class_node(unit: &ParsedUnit, origin: Origin) -> ClassNode {
    ClassNode {
        name: unit.name.clone(),
        modifiers: unit.modifiers,
        superclass: unit.superclass.clone(),
        interfaces: unit.interfaces.clone(),
        annotations: annotation_types(&unit.annotations),
        annotation_refs: annotation_refs(&unit.annotations),
        signature: unit.signature.clone(),
        inner_classes: unit.inner_classes.clone(),
        members: BTreeSet::new(),
        origin,
    }
}

pub(crate) fn method_node(owner: &str, method: &ParsedMethod) -> MemberNode {
    MemberNode {
        id: NodeId::method(owner, &method.name, &method.descriptor),
        modifiers: method.modifiers,
        annotations: annotation_types(&method.annotations),
        annotation_refs: annotation_refs(&method.annotations),
        exceptions: method.exceptions.clone(),
        annotation_default: method.annotation_default.iter().cloned().collect(),
        signature: method.signature.clone(),
    }
}

pub(crate) fn field_node(owner: &str, field: &crate::unit::ParsedField) -> MemberNode {
    MemberNode {
        id: NodeId::field(owner, &field.name, &field.descriptor),
        modifiers: field.modifiers,
        annotations: annotation_types(&field.annotations),
        annotation_refs: annotation_refs(&field.annotations),
        exceptions: Vec::new(),
        annotation_default: BTreeSet::new(),
        signature: field.signature.clone(),
    }
}

fn insert_declarations(graph: &mut ProgramGraph, unit: &ParsedUnit, origin: Origin) {
    graph.add_class(class_node(unit, origin));
    for method in &unit.methods {
        graph.add_member(method_node(&unit.name, method));
    }
    for field in &unit.fields {
        graph.add_member(field_node(&unit.name, field));
    }
}

/// Resolves references of one unit at a time and writes the edges
struct Linker<'g> {
    graph: &'g mut ProgramGraph,
    platform: &'g PlatformTypes,
}

impl<'g> Linker<'g> {
    /// Node for a referenced class, creating placeholders as needed.
    ///
    /// Platform types only get a placeholder when they appear in the
    /// hierarchy; elsewhere they are dropped since they are never emitted.
    fn class_ref(&mut self, name: &str, from: &str, hierarchy: bool) -> Option<NodeIndex> {
        let name = element_class(name)?;
        if name == OBJECT_CLASS {
            return None;
        }
        if let Some(idx) = self.graph.index(&NodeId::class(&name)) {
            return Some(idx);
        }
        if self.platform.is_platform(&name) {
            return hierarchy.then(|| self.graph.ensure_class(&name, Origin::Library));
        }

        warn!("Unresolved class reference {} from {}", name, from);
        self.graph.record_warning();
        Some(self.graph.ensure_class(&name, Origin::Unresolved))
    }

    fn edge(&mut self, from: NodeIndex, to: NodeIndex, kind: EdgeKind, added: &mut Vec<EdgeTriple>) {
        if self.graph.add_edge_at(from, to, kind.clone()) {
            added.push((from, to, kind));
        }
    }

    fn link_hierarchy(&mut self, unit: &ParsedUnit) {
        let Some(class) = self.graph.index(&NodeId::class(&unit.name)) else {
            return;
        };
        let mut ignored = Vec::new();
        if let Some(superclass) = &unit.superclass {
            if let Some(target) = self.class_ref(superclass, &unit.name, true) {
                self.edge(class, target, EdgeKind::Super, &mut ignored);
            }
        }
        for interface in &unit.interfaces {
            if let Some(target) = self.class_ref(interface, &unit.name, true) {
                self.edge(class, target, EdgeKind::Implements, &mut ignored);
            }
        }
    }

    fn link_annotations(&mut self, source: NodeIndex, annotations: &[AnnotationUse], from: &str) {
        let mut ignored = Vec::new();
        for annotation in annotations {
            if annotation.visible {
                if let Some(target) = self.class_ref(&annotation.type_name, from, false) {
                    self.edge(source, target, EdgeKind::AnnotatedBy, &mut ignored);
                }
            }
            for reference in &annotation.references {
                if let Some(target) = self.class_ref(reference, from, false) {
                    self.edge(source, target, EdgeKind::TypeRef, &mut ignored);
                }
            }
        }
    }

    fn link_type_refs<'a>(&mut self, source: NodeIndex, classes: impl IntoIterator<Item = &'a String>, from: &str) {
        let mut ignored = Vec::new();
        for class in classes {
            if let Some(target) = self.class_ref(class, from, false) {
                self.edge(source, target, EdgeKind::TypeRef, &mut ignored);
            }
        }
    }

    /// Declaration-level edges: containment, annotations, descriptor and
    /// exception types, nesting and implicit members.
    fn link_declarations(&mut self, unit: &ParsedUnit) {
        let Some(class) = self.graph.index(&NodeId::class(&unit.name)) else {
            return;
        };
        let mut ignored = Vec::new();

        self.link_annotations(class, &unit.annotations, &unit.name);

        for record in unit.inner_classes.iter().filter(|r| r.inner == unit.name) {
            if let Some(outer) = &record.outer {
                if let Some(target) = self.class_ref(outer, &unit.name, false) {
                    self.edge(class, target, EdgeKind::NestedIn, &mut ignored);
                }
            }
        }

        for method in &unit.methods {
            let id = NodeId::method(&unit.name, &method.name, &method.descriptor);
            let Some(member) = self.graph.index(&id) else {
                continue;
            };
            self.edge(class, member, EdgeKind::Contains, &mut ignored);

            let descriptor_classes = referenced_classes(&method.descriptor).unwrap_or_default();
            self.link_type_refs(member, &descriptor_classes, &unit.name);
            self.link_type_refs(member, &method.exceptions, &unit.name);
            self.link_annotations(member, &method.annotations, &unit.name);

            for default in &method.annotation_default {
                if let Some(target) = self.class_ref(default, &unit.name, false) {
                    self.edge(member, target, EdgeKind::AnnotationDefault, &mut ignored);
                }
            }

            if method.name == STATIC_INITIALIZER_NAME || unit.modifiers.is_annotation() {
                self.edge(class, member, EdgeKind::Implicit, &mut ignored);
            }
        }

        for field in &unit.fields {
            let id = NodeId::field(&unit.name, &field.name, &field.descriptor);
            let Some(member) = self.graph.index(&id) else {
                continue;
            };
            self.edge(class, member, EdgeKind::Contains, &mut ignored);

            let descriptor_classes = referenced_classes(&field.descriptor).unwrap_or_default();
            self.link_type_refs(member, &descriptor_classes, &unit.name);
            self.link_annotations(member, &field.annotations, &unit.name);
        }
    }

    /// Informational edges for generic signatures; targets must already exist
    fn link_signature(&mut self, source: NodeIndex, signature: Option<&String>, added: &mut Vec<EdgeTriple>) {
        let Some(signature) = signature else {
            return;
        };
        for class in signature_classes(signature) {
            if let Some(target) = self.graph.index(&NodeId::class(&class)) {
                self.edge(source, target, EdgeKind::Signature, added);
            }
        }
    }

    /// `USES` edges from method bodies plus `SIGNATURE` edges, returning
    /// the edges that were newly added
    fn link_bodies(&mut self, unit: &ParsedUnit) -> Vec<EdgeTriple> {
        let mut added = Vec::new();
        if unit.library {
            return added;
        }

        if let Some(class) = self.graph.index(&NodeId::class(&unit.name)) {
            self.link_signature(class, unit.signature.as_ref(), &mut added);
        }
        for field in &unit.fields {
            if let Some(member) = self.graph.index(&NodeId::field(&unit.name, &field.name, &field.descriptor)) {
                self.link_signature(member, field.signature.as_ref(), &mut added);
            }
        }

        for method in &unit.methods {
            let Some(source) = self.graph.index(&NodeId::method(&unit.name, &method.name, &method.descriptor)) else {
                continue;
            };
            self.link_signature(source, method.signature.as_ref(), &mut added);
            for instruction in &method.body {
                self.link_instruction(unit, source, instruction, &mut added);
            }
        }

        added
    }

    fn link_instruction(
        &mut self,
        unit: &ParsedUnit,
        source: NodeIndex,
        instruction: &Instruction,
        added: &mut Vec<EdgeTriple>,
    ) {
        let from = unit.name.as_str();
        match instruction {
            Instruction::Invoke {
                dispatch,
                owner,
                name,
                descriptor,
            } => {
                if owner.starts_with('[') {
                    // Array clone and friends live on the root type
                    return;
                }
                if let Some(target) = self.class_ref(owner, from, false) {
                    self.edge(source, target, EdgeKind::Uses(UseKind::TypeReference), added);
                }

                let super_call = *dispatch == Dispatch::Special && name != CONSTRUCTOR_NAME && owner != from;
                let start = match (&unit.superclass, super_call) {
                    (Some(superclass), true) => superclass.as_str(),
                    _ => owner.as_str(),
                };

                match self.graph.resolve_member(start, NodeKind::Method, name, descriptor) {
                    Resolution::Declared(id) => {
                        let exact = self
                            .graph
                            .member(&id)
                            .map(|m| m.modifiers.is_static() || m.modifiers.is_private() || m.name() == CONSTRUCTOR_NAME)
                            .unwrap_or(true);
                        let kind = match dispatch {
                            Dispatch::Virtual | Dispatch::Interface if !exact => UseKind::VirtualCall {
                                receiver: owner.clone(),
                            },
                            _ => UseKind::Call,
                        };
                        if let Some(target) = self.graph.index(&id) {
                            self.edge(source, target, EdgeKind::Uses(kind), added);
                        }
                    }
                    Resolution::External => {}
                    Resolution::Missing => {
                        warn!("Unresolved method {}.{}:{} referenced from {}", owner, name, descriptor, from);
                        self.graph.record_missing_ref(source);
                    }
                }
            }
            Instruction::Field { owner, name, descriptor } => {
                if let Some(target) = self.class_ref(owner, from, false) {
                    self.edge(source, target, EdgeKind::Uses(UseKind::TypeReference), added);
                }
                match self.graph.resolve_member(owner, NodeKind::Field, name, descriptor) {
                    Resolution::Declared(id) => {
                        if let Some(target) = self.graph.index(&id) {
                            self.edge(source, target, EdgeKind::Uses(UseKind::FieldAccess), added);
                        }
                    }
                    Resolution::External => {}
                    Resolution::Missing => {
                        warn!("Unresolved field {}.{}:{} referenced from {}", owner, name, descriptor, from);
                        self.graph.record_missing_ref(source);
                    }
                }
            }
            Instruction::New { class } => {
                if let Some(target) = self.class_ref(class, from, false) {
                    self.edge(source, target, EdgeKind::Uses(UseKind::Instantiate), added);
                }
            }
            Instruction::Type { class } | Instruction::ClassLiteral { class } => {
                if let Some(target) = self.class_ref(class, from, false) {
                    self.edge(source, target, EdgeKind::Uses(UseKind::TypeReference), added);
                }
            }
            Instruction::Reflect {
                class,
                member,
                descriptor,
            } => {
                let Some(target) = self.class_ref(class, from, false) else {
                    return;
                };
                self.edge(source, target, EdgeKind::Uses(UseKind::Reflection), added);

                let Some(member_name) = member else {
                    return;
                };
                let class_name = element_class(class).unwrap_or_default();
                let matches: Vec<NodeIndex> = self
                    .graph
                    .members_of(&class_name)
                    .into_iter()
                    .filter(|m| m.name() == member_name)
                    .filter(|m| descriptor.as_deref().map_or(true, |d| m.descriptor() == d))
                    .filter_map(|m| self.graph.index(&m.id))
                    .collect();
                for target in matches {
                    self.edge(source, target, EdgeKind::Uses(UseKind::Reflection), added);
                }
            }
        }
    }

    /// `OVERRIDES` edges to program ancestors and `IMPLICIT` edges for
    /// methods that override code outside the program.
    fn link_overrides(&mut self, unit: &ParsedUnit, hierarchy: &Hierarchy) {
        let Some(class) = self.graph.index(&NodeId::class(&unit.name)) else {
            return;
        };
        let ancestors: Vec<NodeIndex> = hierarchy.supertypes(class).to_vec();
        let mut ignored = Vec::new();

        for method in &unit.methods {
            if method.modifiers.is_static()
                || method.modifiers.is_private()
                || method.name == CONSTRUCTOR_NAME
                || method.name == STATIC_INITIALIZER_NAME
            {
                continue;
            }
            let Some(member) = self.graph.index(&NodeId::method(&unit.name, &method.name, &method.descriptor)) else {
                continue;
            };

            let mut external = is_object_method(&method.name, &method.descriptor);
            let mut overridden = Vec::new();
            for &ancestor in &ancestors {
                let Some(node) = self.graph.node_at(ancestor).and_then(|n| n.as_class()) else {
                    continue;
                };
                let declared = self
                    .graph
                    .declared(&node.name, NodeKind::Method, &method.name, &method.descriptor)
                    .filter(|id| {
                        self.graph
                            .member(id)
                            .map(|m| !m.modifiers.is_static() && !m.modifiers.is_private())
                            .unwrap_or(false)
                    });
                match (node.is_program(), declared) {
                    (true, Some(id)) => overridden.extend(self.graph.index(&id)),
                    (false, Some(_)) => external = true,
                    (false, None) if node.is_placeholder() => external = true,
                    _ => {}
                }
            }

            for target in overridden {
                self.edge(member, target, EdgeKind::Overrides, &mut ignored);
            }
            if external {
                debug!("{}.{}:{} overrides external code", unit.name, method.name, method.descriptor);
                self.edge(class, member, EdgeKind::Implicit, &mut ignored);
            }
        }
    }
}

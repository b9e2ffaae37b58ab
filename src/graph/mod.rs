// Program graph - classes, methods and fields with typed dependency edges

mod builder;
mod edge;
mod hierarchy;
mod node;
mod parallel_builder;

pub use builder::{BuildError, BuildStats, EdgeDelta, EdgeTriple, GraphBuilder, PlatformTypes};
pub(crate) use builder::{class_node, field_node, method_node};
pub use edge::{EdgeKind, Propagation, UseKind};
pub use hierarchy::Hierarchy;
pub use node::{ClassNode, MemberNode, MemberRef, Node, NodeId, NodeKind, Origin};
pub use parallel_builder::ParallelGraphBuilder;

use crate::unit::OBJECT_CLASS;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// Methods every class inherits from the root object type
pub const OBJECT_METHODS: [(&str, &str); 11] = [
    ("hashCode", "()I"),
    ("equals", "(Ljava/lang/Object;)Z"),
    ("toString", "()Ljava/lang/String;"),
    ("finalize", "()V"),
    ("clone", "()Ljava/lang/Object;"),
    ("getClass", "()Ljava/lang/Class;"),
    ("notify", "()V"),
    ("notifyAll", "()V"),
    ("wait", "()V"),
    ("wait", "(J)V"),
    ("wait", "(JI)V"),
];

pub fn is_object_method(name: &str, descriptor: &str) -> bool {
    OBJECT_METHODS
        .iter()
        .any(|(n, d)| *n == name && *d == descriptor)
}

/// Outcome of resolving a member reference the way the JVM does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Declared by a program class
    Declared(NodeId),
    /// Declared, or possibly declared, outside the program
    External,
    /// Not found anywhere in a fully known hierarchy
    Missing,
}

/// The whole-program dependency graph
#[derive(Debug, Clone)]
pub struct ProgramGraph {
    /// Nodes are NodeIds, edges are typed dependencies.
    /// Stable indices survive edge removal during incremental runs.
    inner: StableDiGraph<NodeId, EdgeKind>,

    node_map: HashMap<NodeId, NodeIndex>,

    details: HashMap<NodeId, Node>,

    /// Warnings for unresolved class references
    warnings: usize,

    /// Unresolved member references, per referencing node
    missing_refs: BTreeMap<NodeId, usize>,
}

impl ProgramGraph {
    pub fn new() -> Self {
        Self {
            inner: StableDiGraph::new(),
            node_map: HashMap::new(),
            details: HashMap::new(),
            warnings: 0,
            missing_refs: BTreeMap::new(),
        }
    }

    fn insert(&mut self, node: Node) -> NodeIndex {
        let id = node.id();
        let idx = match self.node_map.get(&id) {
            Some(&idx) => idx,
            None => {
                let idx = self.inner.add_node(id.clone());
                self.node_map.insert(id.clone(), idx);
                idx
            }
        };
        self.details.insert(id, node);
        idx
    }

    /// Insert or overwrite a class node, keeping its index
    pub fn add_class(&mut self, class: ClassNode) -> NodeIndex {
        self.insert(Node::Class(class))
    }

    /// Insert or overwrite a member node and register it with its owner
    pub fn add_member(&mut self, member: MemberNode) -> NodeIndex {
        let id = member.id.clone();
        if let Some(Node::Class(owner)) = self.details.get_mut(&NodeId::class(id.class_name())) {
            owner.members.insert(id.clone());
        }
        self.insert(Node::Member(member))
    }

    /// Make sure a class node exists, creating a member-less placeholder
    pub fn ensure_class(&mut self, name: &str, origin: Origin) -> NodeIndex {
        match self.node_map.get(&NodeId::class(name)) {
            Some(&idx) => idx,
            None => self.add_class(ClassNode::placeholder(name, origin)),
        }
    }

    /// Add an edge unless the same (source, target, kind) triple exists
    pub fn add_edge(&mut self, from: &NodeId, to: &NodeId, kind: EdgeKind) -> bool {
        match (self.node_map.get(from), self.node_map.get(to)) {
            (Some(&a), Some(&b)) => self.add_edge_at(a, b, kind),
            _ => false,
        }
    }

    pub fn add_edge_at(&mut self, from: NodeIndex, to: NodeIndex, kind: EdgeKind) -> bool {
        if self.has_edge_at(from, to, &kind) {
            return false;
        }
        self.inner.add_edge(from, to, kind);
        true
    }

    pub fn has_edge(&self, from: &NodeId, to: &NodeId, kind: &EdgeKind) -> bool {
        match (self.node_map.get(from), self.node_map.get(to)) {
            (Some(&a), Some(&b)) => self.has_edge_at(a, b, kind),
            _ => false,
        }
    }

    fn has_edge_at(&self, from: NodeIndex, to: NodeIndex, kind: &EdgeKind) -> bool {
        self.inner
            .edges_directed(from, Direction::Outgoing)
            .any(|e| e.target() == to && e.weight() == kind)
    }

    /// Remove the outgoing edges of `from` selected by `pred`, returning them
    pub fn remove_edges_from(
        &mut self,
        from: NodeIndex,
        pred: impl Fn(&EdgeKind) -> bool,
    ) -> Vec<(NodeIndex, NodeIndex, EdgeKind)> {
        let doomed: Vec<_> = self
            .inner
            .edges_directed(from, Direction::Outgoing)
            .filter(|e| pred(e.weight()))
            .map(|e| e.id())
            .collect();

        doomed
            .into_iter()
            .filter_map(|edge| {
                let (a, b) = self.inner.edge_endpoints(edge)?;
                let kind = self.inner.remove_edge(edge)?;
                Some((a, b, kind))
            })
            .collect()
    }

    /// Remove a node with its edges. Other indices stay valid.
    pub fn remove_node(&mut self, idx: NodeIndex) -> Option<NodeId> {
        let id = self.inner.remove_node(idx)?;
        self.node_map.remove(&id);
        self.missing_refs.remove(&id);
        if let Some(Node::Member(member)) = self.details.remove(&id) {
            if let Some(Node::Class(owner)) = self.details.get_mut(&NodeId::class(member.id.class_name())) {
                owner.members.remove(&id);
            }
        }
        Some(id)
    }

    pub fn index(&self, id: &NodeId) -> Option<NodeIndex> {
        self.node_map.get(id).copied()
    }

    pub fn id_at(&self, idx: NodeIndex) -> Option<&NodeId> {
        self.inner.node_weight(idx)
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.details.get(id)
    }

    pub fn node_at(&self, idx: NodeIndex) -> Option<&Node> {
        self.id_at(idx).and_then(|id| self.details.get(id))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.node_map.contains_key(id)
    }

    pub fn class(&self, name: &str) -> Option<&ClassNode> {
        self.details
            .get(&NodeId::class(name))
            .and_then(Node::as_class)
    }

    pub fn class_mut(&mut self, name: &str) -> Option<&mut ClassNode> {
        match self.details.get_mut(&NodeId::class(name)) {
            Some(Node::Class(c)) => Some(c),
            _ => None,
        }
    }

    pub fn member(&self, id: &NodeId) -> Option<&MemberNode> {
        self.details.get(id).and_then(Node::as_member)
    }

    pub fn member_mut(&mut self, id: &NodeId) -> Option<&mut MemberNode> {
        match self.details.get_mut(id) {
            Some(Node::Member(m)) => Some(m),
            _ => None,
        }
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassNode> {
        self.details.values().filter_map(Node::as_class)
    }

    pub fn program_classes(&self) -> impl Iterator<Item = &ClassNode> {
        self.classes().filter(|c| c.is_program())
    }

    pub fn members(&self) -> impl Iterator<Item = &MemberNode> {
        self.details.values().filter_map(Node::as_member)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.inner
            .node_indices()
            .filter_map(move |idx| self.node_at(idx).map(|n| (idx, n)))
    }

    /// Members declared by a class
    pub fn members_of(&self, class: &str) -> Vec<&MemberNode> {
        self.class(class)
            .map(|c| c.members.iter().filter_map(|id| self.member(id)).collect())
            .unwrap_or_default()
    }

    /// Outgoing edges as (target, kind)
    pub fn outgoing(&self, idx: NodeIndex) -> impl Iterator<Item = (NodeIndex, &EdgeKind)> {
        self.inner
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.target(), e.weight()))
    }

    /// Incoming edges as (source, kind)
    pub fn incoming(&self, idx: NodeIndex) -> impl Iterator<Item = (NodeIndex, &EdgeKind)> {
        self.inner
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (e.source(), e.weight()))
    }

    /// Everything the node depends on
    pub fn references_from(&self, id: &NodeId) -> Vec<(&NodeId, &EdgeKind)> {
        let Some(idx) = self.index(id) else {
            return Vec::new();
        };
        self.outgoing(idx)
            .filter_map(|(target, kind)| Some((self.id_at(target)?, kind)))
            .collect()
    }

    /// Everything depending on the node
    pub fn references_to(&self, id: &NodeId) -> Vec<(&NodeId, &EdgeKind)> {
        let Some(idx) = self.index(id) else {
            return Vec::new();
        };
        self.incoming(idx)
            .filter_map(|(source, kind)| Some((self.id_at(source)?, kind)))
            .collect()
    }

    /// All edges as (source, target, kind)
    pub fn edges(&self) -> impl Iterator<Item = (&NodeId, &NodeId, &EdgeKind)> {
        self.inner.edge_indices().filter_map(move |e| {
            let (a, b) = self.inner.edge_endpoints(e)?;
            Some((self.id_at(a)?, self.id_at(b)?, self.inner.edge_weight(e)?))
        })
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// All unresolved reference warnings
    pub fn warnings(&self) -> usize {
        self.warnings + self.missing_refs.values().sum::<usize>()
    }

    /// Warnings for unresolved class references only
    pub fn class_warnings(&self) -> usize {
        self.warnings
    }

    pub fn record_warning(&mut self) {
        self.warnings += 1;
    }

    pub fn discard_warning(&mut self) {
        self.warnings = self.warnings.saturating_sub(1);
    }

    pub fn set_warnings(&mut self, warnings: usize) {
        self.warnings = warnings;
    }

    pub fn record_missing_ref(&mut self, source: NodeIndex) {
        if let Some(id) = self.inner.node_weight(source) {
            *self.missing_refs.entry(id.clone()).or_insert(0) += 1;
        }
    }

    /// Forget the missing references of a body about to be relinked
    pub fn clear_missing_refs(&mut self, source: &NodeId) {
        self.missing_refs.remove(source);
    }

    pub fn missing_refs(&self) -> &BTreeMap<NodeId, usize> {
        &self.missing_refs
    }

    pub fn set_missing_refs(&mut self, refs: impl IntoIterator<Item = (NodeId, usize)>) {
        self.missing_refs = refs.into_iter().filter(|(_, count)| *count > 0).collect();
    }

    /// Names of unresolved placeholder classes
    pub fn unresolved_classes(&self) -> BTreeSet<&str> {
        self.classes()
            .filter(|c| c.origin == Origin::Unresolved)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Declared member of `class` with the given kind, name and descriptor
    pub fn declared(&self, class: &str, kind: NodeKind, name: &str, descriptor: &str) -> Option<NodeId> {
        let id = match kind {
            NodeKind::Method => NodeId::method(class, name, descriptor),
            NodeKind::Field => NodeId::field(class, name, descriptor),
            NodeKind::Class => return None,
        };
        self.contains(&id).then_some(id)
    }

    /// Resolve a member reference: the named class, its superclasses, then
    /// all superinterfaces breadth first.
    pub fn resolve_member(&self, start: &str, kind: NodeKind, name: &str, descriptor: &str) -> Resolution {
        let mut opaque = false;

        let check = |class_name: &str, opaque: &mut bool| -> Option<Resolution> {
            if class_name == OBJECT_CLASS {
                return (kind == NodeKind::Method && is_object_method(name, descriptor))
                    .then_some(Resolution::External);
            }
            match self.class(class_name) {
                Some(class) => {
                    if let Some(id) = self.declared(class_name, kind, name, descriptor) {
                        return Some(if class.is_program() {
                            Resolution::Declared(id)
                        } else {
                            Resolution::External
                        });
                    }
                    if class.is_placeholder() {
                        *opaque = true;
                    }
                    None
                }
                None => {
                    *opaque = true;
                    None
                }
            }
        };

        let mut chain = Vec::new();
        let mut current = Some(start.to_string());
        let mut seen = HashSet::new();
        while let Some(class_name) = current {
            if !seen.insert(class_name.clone()) {
                break;
            }
            if let Some(found) = check(&class_name, &mut opaque) {
                return found;
            }
            current = self.class(&class_name).and_then(|c| c.superclass.clone());
            chain.push(class_name);
        }

        let mut queue: VecDeque<String> = chain
            .iter()
            .filter_map(|c| self.class(c))
            .flat_map(|c| c.interfaces.iter().cloned())
            .collect();
        while let Some(interface) = queue.pop_front() {
            if !seen.insert(interface.clone()) {
                continue;
            }
            if let Some(found) = check(&interface, &mut opaque) {
                return found;
            }
            if let Some(class) = self.class(&interface) {
                queue.extend(class.interfaces.iter().cloned());
            }
        }

        if opaque {
            Resolution::External
        } else {
            Resolution::Missing
        }
    }
}

impl Default for ProgramGraph {
    fn default() -> Self {
        Self::new()
    }
}

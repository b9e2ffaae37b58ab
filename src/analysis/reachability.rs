use super::retention::{CounterTable, KeepState, Retention};
use super::roots::{NodeDescriptor, RootPredicate};
use crate::graph::{EdgeKind, Hierarchy, Node, NodeId, Origin, ProgramGraph, Propagation, UseKind};
use petgraph::stable_graph::NodeIndex;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Instant;
use tracing::{debug, info};

/// Read-only inputs shared by every counter-set's pass
pub(crate) struct MarkContext<'a> {
    pub graph: &'a ProgramGraph,
    pub hierarchy: &'a Hierarchy,
}

/// Mark state of one counter-set.
///
/// Holds no graph borrow so an incremental run can restore it from the
/// snapshot, mutate the graph, then re-mark.
#[derive(Debug, Default)]
pub(crate) struct Marker {
    pub(crate) marks: HashMap<NodeIndex, Retention>,
    pub(crate) roots: HashSet<NodeIndex>,
    /// Classes with a reachable instantiation, or matched as roots
    pub(crate) live: HashSet<NodeIndex>,
    /// Static receiver type -> reachable virtual-call declarations
    pub(crate) call_sites: HashMap<NodeIndex, HashSet<NodeIndex>>,
    worklist: VecDeque<NodeIndex>,
}

impl Marker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_marked(&self, idx: NodeIndex) -> bool {
        self.marks.get(&idx).map_or(false, |r| r.counter > 0)
    }

    /// Count one more reason to keep `idx`; enqueue on first keep or upgrade
    pub(crate) fn keep(&mut self, cx: &MarkContext<'_>, idx: NodeIndex, state: KeepState) {
        let state = match cx.graph.node_at(idx) {
            Some(Node::Member(_)) => KeepState::Full,
            _ => state,
        };
        match self.marks.get_mut(&idx) {
            Some(retention) => {
                retention.counter += 1;
                if state > retention.state {
                    retention.state = state;
                    self.worklist.push_back(idx);
                }
            }
            None => {
                self.marks.insert(idx, Retention::new(state));
                self.worklist.push_back(idx);
            }
        }
    }

    /// Mark roots and always-kept placeholders
    pub(crate) fn seed(&mut self, cx: &MarkContext<'_>, predicate: &dyn RootPredicate) {
        for (idx, node) in cx.graph.nodes() {
            let program = match node {
                Node::Class(class) => {
                    if class.origin == Origin::Unresolved {
                        self.keep(cx, idx, KeepState::Shell);
                    }
                    class.is_program()
                }
                Node::Member(member) => cx
                    .graph
                    .class(member.id.class_name())
                    .map_or(false, |c| c.is_program()),
            };
            if program && predicate.matches(&NodeDescriptor::of(node)) {
                debug!("Root: {}", node.id());
                self.roots.insert(idx);
                self.keep(cx, idx, KeepState::Full);
                if matches!(node, Node::Class(_)) {
                    self.make_live(cx, idx);
                }
            }
        }
    }

    /// Drain the worklist
    pub(crate) fn propagate(&mut self, cx: &MarkContext<'_>) {
        while let Some(idx) = self.worklist.pop_front() {
            self.process(cx, idx);
        }
    }

    fn process(&mut self, cx: &MarkContext<'_>, idx: NodeIndex) {
        let Some(node) = cx.graph.node_at(idx) else {
            return;
        };

        if let Node::Member(member) = node {
            if let Some(owner) = cx.graph.index(&NodeId::class(member.id.class_name())) {
                self.keep(cx, owner, KeepState::Shell);
            }
        }

        for (target, kind) in cx.graph.outgoing(idx) {
            match kind.propagation() {
                Propagation::Shell => self.keep(cx, target, KeepState::Shell),
                Propagation::Full => self.keep(cx, target, KeepState::Full),
                Propagation::None => continue,
            }
            match kind {
                EdgeKind::Uses(UseKind::Instantiate) => self.make_live(cx, target),
                EdgeKind::Uses(UseKind::VirtualCall { receiver }) => {
                    if let Some(receiver) = cx.graph.index(&NodeId::class(receiver)) {
                        self.register_call_site(cx, receiver, target);
                    }
                }
                _ => {}
            }
        }
    }

    pub(crate) fn make_live(&mut self, cx: &MarkContext<'_>, class: NodeIndex) {
        if !self.live.insert(class) {
            return;
        }
        let pending: Vec<NodeIndex> = std::iter::once(class)
            .chain(cx.hierarchy.supertypes(class).iter().copied())
            .filter_map(|receiver| self.call_sites.get(&receiver))
            .flat_map(|decls| decls.iter().copied())
            .collect();
        for decl in pending {
            self.dispatch(cx, class, decl);
        }
    }

    fn register_call_site(&mut self, cx: &MarkContext<'_>, receiver: NodeIndex, decl: NodeIndex) {
        if !self.call_sites.entry(receiver).or_default().insert(decl) {
            return;
        }
        let targets: Vec<NodeIndex> = std::iter::once(receiver)
            .chain(cx.hierarchy.subtypes(receiver).iter().copied())
            .filter(|class| self.live.contains(class))
            .collect();
        for class in targets {
            self.dispatch(cx, class, decl);
        }
    }

    /// What a live `class` runs when `decl` is invoked on it
    pub(crate) fn implementation_for(cx: &MarkContext<'_>, class: NodeIndex, decl: NodeIndex) -> Option<NodeIndex> {
        let member = cx.graph.node_at(decl)?.as_member()?;
        cx.hierarchy
            .implementation(cx.graph, class, member.name(), member.descriptor())
    }

    fn dispatch(&mut self, cx: &MarkContext<'_>, class: NodeIndex, decl: NodeIndex) {
        if let Some(implementation) = Self::implementation_for(cx, class, decl) {
            self.keep(cx, implementation, KeepState::Full);
        }
    }

    /// Recompute live classes and call sites from the current marks
    pub(crate) fn rebuild_dispatch_state(&mut self, cx: &MarkContext<'_>) {
        self.live = self
            .roots
            .iter()
            .copied()
            .filter(|&idx| matches!(cx.graph.node_at(idx), Some(Node::Class(_))))
            .collect();
        self.call_sites.clear();

        let sources: Vec<NodeIndex> = self
            .marks
            .iter()
            .filter(|(_, r)| r.counter > 0)
            .map(|(&idx, _)| idx)
            .filter(|&idx| matches!(cx.graph.node_at(idx), Some(Node::Member(_))))
            .collect();
        for source in sources {
            for (target, kind) in cx.graph.outgoing(source) {
                match kind {
                    EdgeKind::Uses(UseKind::Instantiate) => {
                        self.live.insert(target);
                    }
                    EdgeKind::Uses(UseKind::VirtualCall { receiver }) => {
                        if let Some(receiver) = cx.graph.index(&NodeId::class(receiver)) {
                            self.call_sites.entry(receiver).or_default().insert(target);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// Load a persisted table; ids missing from the graph are dropped
    pub(crate) fn restore(cx: &MarkContext<'_>, table: &CounterTable) -> Self {
        let mut marker = Self::new();
        for (id, retention) in &table.retention {
            if let Some(idx) = cx.graph.index(id) {
                marker.marks.insert(idx, *retention);
            }
        }
        marker.roots = table.roots.iter().filter_map(|id| cx.graph.index(id)).collect();
        marker.rebuild_dispatch_state(cx);
        marker
    }

    pub(crate) fn into_table(self, graph: &ProgramGraph) -> CounterTable {
        CounterTable {
            roots: self
                .roots
                .iter()
                .filter_map(|&idx| graph.id_at(idx).cloned())
                .collect(),
            retention: self
                .marks
                .into_iter()
                .filter(|(_, r)| r.counter > 0)
                .filter_map(|(idx, r)| Some((graph.id_at(idx)?.clone(), r)))
                .collect(),
        }
    }
}

/// Multi-root, multi-counter-set mark phase over a frozen graph
pub struct ReachabilityEngine<'g> {
    graph: &'g ProgramGraph,
    hierarchy: Hierarchy,
}

impl<'g> ReachabilityEngine<'g> {
    pub fn new(graph: &'g ProgramGraph) -> Self {
        Self {
            graph,
            hierarchy: Hierarchy::new(graph),
        }
    }

    pub fn with_hierarchy(graph: &'g ProgramGraph, hierarchy: Hierarchy) -> Self {
        Self { graph, hierarchy }
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// Mark everything reachable from the nodes `predicate` accepts
    pub fn compute_kept_set(&self, counter_set: &str, predicate: &dyn RootPredicate) -> CounterTable {
        let start = Instant::now();
        let cx = MarkContext {
            graph: self.graph,
            hierarchy: &self.hierarchy,
        };

        let mut marker = Marker::new();
        marker.seed(&cx, predicate);
        let roots = marker.roots.len();
        marker.propagate(&cx);
        let live = marker.live.len();

        let table = marker.into_table(self.graph);
        info!(
            "Counter-set {}: {} roots, {} live classes, {} kept of {} nodes in {:.2}ms",
            counter_set,
            roots,
            live,
            table.len(),
            self.graph.node_count(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        table
    }

    /// Mark independent counter-sets concurrently
    pub fn compute_counter_sets(&self, sets: &[(String, &dyn RootPredicate)]) -> BTreeMap<String, CounterTable> {
        sets.par_iter()
            .map(|(name, predicate)| (name.clone(), self.compute_kept_set(name, *predicate)))
            .collect()
    }
}

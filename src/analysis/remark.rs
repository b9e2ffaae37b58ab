// Incremental re-marking - delete and re-derive after body edge changes

use super::reachability::{MarkContext, Marker};
use super::retention::KeepState;
use crate::graph::{EdgeDelta, EdgeKind, Node, NodeId, Origin, Propagation, UseKind};
use petgraph::stable_graph::NodeIndex;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// What one re-mark pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemarkStats {
    /// Nodes tentatively unmarked
    pub over_deleted: usize,
    /// Tentatively unmarked nodes that turned out to be still reachable
    pub restored: usize,
    /// No longer kept at all
    pub removed: usize,
    /// Newly kept
    pub added: usize,
    /// Full to shell
    pub demoted: usize,
    /// Shell to full
    pub promoted: usize,
}

impl RemarkStats {
    pub fn changed(&self) -> bool {
        self.removed + self.added + self.demoted + self.promoted > 0
    }
}

impl Marker {
    /// Bring the marks up to date with a graph whose body edges changed.
    ///
    /// `self` must hold the marks of the graph before `delta` was applied and
    /// `cx.graph` must already contain the change. Everything that might have
    /// depended on a removed edge is unmarked, then re-derived from surviving
    /// marks. The result equals marking the new graph from scratch.
    pub(crate) fn remark(&mut self, cx: &MarkContext<'_>, delta: &EdgeDelta) -> RemarkStats {
        let before: HashMap<NodeIndex, KeepState> = self
            .marks
            .iter()
            .filter(|(_, r)| r.counter > 0)
            .map(|(&idx, r)| (idx, r.state))
            .collect();

        for idx in &delta.dropped {
            self.marks.remove(idx);
            self.roots.remove(idx);
        }

        let deleted = self.over_delete(cx, delta);
        for idx in &deleted {
            self.marks.remove(idx);
        }
        self.rebuild_dispatch_state(cx);

        // Re-derive from survivors
        for &idx in &deleted {
            let sources: Vec<(NodeIndex, Propagation)> = cx
                .graph
                .incoming(idx)
                .filter(|(source, _)| self.is_marked(*source))
                .map(|(source, kind)| (source, kind.propagation()))
                .collect();
            for (_, propagation) in sources {
                match propagation {
                    Propagation::Shell => self.keep(cx, idx, KeepState::Shell),
                    Propagation::Full => self.keep(cx, idx, KeepState::Full),
                    Propagation::None => {}
                }
            }

            if let Some(Node::Class(class)) = cx.graph.node_at(idx) {
                let member_marked = class
                    .members
                    .iter()
                    .filter_map(|id| cx.graph.index(id))
                    .any(|member| self.is_marked(member));
                if member_marked {
                    self.keep(cx, idx, KeepState::Shell);
                }
            }
        }

        for &(source, target, ref kind) in &delta.added {
            if !self.is_marked(source) {
                continue;
            }
            match kind.propagation() {
                Propagation::Shell => self.keep(cx, target, KeepState::Shell),
                Propagation::Full => self.keep(cx, target, KeepState::Full),
                Propagation::None => {}
            }
        }

        // Placeholders introduced by the new bodies
        let placeholders: Vec<NodeIndex> = cx
            .graph
            .nodes()
            .filter(|(idx, node)| {
                matches!(node, Node::Class(c) if c.origin == Origin::Unresolved) && !self.is_marked(*idx)
            })
            .map(|(idx, _)| idx)
            .collect();
        for idx in placeholders {
            self.keep(cx, idx, KeepState::Shell);
        }

        self.saturate_dispatch(cx);
        self.propagate(cx);

        let mut stats = RemarkStats {
            over_deleted: deleted.len(),
            restored: deleted.iter().filter(|&&idx| self.is_marked(idx)).count(),
            ..RemarkStats::default()
        };
        for (&idx, &old) in &before {
            match self.marks.get(&idx).filter(|r| r.counter > 0).map(|r| r.state) {
                None => stats.removed += 1,
                Some(new) if new < old => stats.demoted += 1,
                Some(new) if new > old => stats.promoted += 1,
                Some(_) => {}
            }
        }
        stats.added = self
            .marks
            .iter()
            .filter(|(idx, r)| r.counter > 0 && !before.contains_key(idx))
            .count();

        debug!(
            "Re-mark: {} over-deleted, {} restored, {} removed, {} added",
            stats.over_deleted, stats.restored, stats.removed, stats.added
        );
        stats
    }

    /// Every marked node whose support might run through a removed edge.
    /// Uses the dispatch state from before the change.
    fn over_delete(&self, cx: &MarkContext<'_>, delta: &EdgeDelta) -> HashSet<NodeIndex> {
        let mut pending = VecDeque::new();

        for (source, target, kind) in &delta.removed {
            if !self.is_marked(*source) {
                continue;
            }
            if kind.propagation() != Propagation::None {
                pending.push_back(*target);
            }
            self.dispatch_consequences(cx, *target, kind, &mut pending);
        }

        let mut deleted = HashSet::new();
        while let Some(idx) = pending.pop_front() {
            if !self.is_marked(idx) || self.roots.contains(&idx) || deleted.contains(&idx) {
                continue;
            }
            let node = match cx.graph.node_at(idx) {
                Some(node) => node,
                None => continue,
            };
            if matches!(node, Node::Class(c) if c.origin == Origin::Unresolved) {
                continue;
            }
            deleted.insert(idx);

            match node {
                Node::Member(member) => {
                    if let Some(owner) = cx.graph.index(&NodeId::class(member.id.class_name())) {
                        pending.push_back(owner);
                    }
                }
                Node::Class(_) => {
                    if self.live.contains(&idx) {
                        self.liveness_consequences(cx, idx, &mut pending);
                    }
                }
            }

            for (target, kind) in cx.graph.outgoing(idx) {
                if kind.propagation() != Propagation::None {
                    pending.push_back(target);
                }
                self.dispatch_consequences(cx, target, kind, &mut pending);
            }
        }
        deleted
    }

    /// Nodes kept only because `edge` made a class live or a call site reachable
    fn dispatch_consequences(
        &self,
        cx: &MarkContext<'_>,
        target: NodeIndex,
        kind: &EdgeKind,
        pending: &mut VecDeque<NodeIndex>,
    ) {
        match kind {
            EdgeKind::Uses(UseKind::Instantiate) => self.liveness_consequences(cx, target, pending),
            EdgeKind::Uses(UseKind::VirtualCall { receiver }) => {
                let Some(receiver) = cx.graph.index(&NodeId::class(receiver)) else {
                    return;
                };
                for class in std::iter::once(receiver).chain(cx.hierarchy.subtypes(receiver).iter().copied()) {
                    if self.live.contains(&class) {
                        if let Some(implementation) = Self::implementation_for(cx, class, target) {
                            pending.push_back(implementation);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Implementations reached because `class` was live
    fn liveness_consequences(&self, cx: &MarkContext<'_>, class: NodeIndex, pending: &mut VecDeque<NodeIndex>) {
        let receivers = std::iter::once(class).chain(cx.hierarchy.supertypes(class).iter().copied());
        for receiver in receivers {
            let Some(decls) = self.call_sites.get(&receiver) else {
                continue;
            };
            for &decl in decls {
                if let Some(implementation) = Self::implementation_for(cx, class, decl) {
                    pending.push_back(implementation);
                }
            }
        }
    }

    /// Keep every implementation the current live set and call sites select
    fn saturate_dispatch(&mut self, cx: &MarkContext<'_>) {
        let mut targets = Vec::new();
        for (&receiver, decls) in &self.call_sites {
            for class in std::iter::once(receiver).chain(cx.hierarchy.subtypes(receiver).iter().copied()) {
                if !self.live.contains(&class) {
                    continue;
                }
                for &decl in decls {
                    if let Some(implementation) = Self::implementation_for(cx, class, decl) {
                        targets.push(implementation);
                    }
                }
            }
        }
        for implementation in targets {
            if !self.is_marked(implementation) {
                self.keep(cx, implementation, KeepState::Full);
            }
        }
    }
}

// Class hierarchy index - transitive supertypes/subtypes and dispatch lookup

use super::{Node, NodeKind, ProgramGraph};
use petgraph::algo::toposort;
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::{Bfs, EdgeFiltered, EdgeRef};
use std::collections::{HashMap, HashSet};

/// Precomputed type hierarchy over the class nodes of a graph.
///
/// Built from the `SUPER` and `IMPLEMENTS` edges. Structural edges never
/// change during an incremental run, so one instance serves every
/// counter-set and both mark and re-mark.
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    supertypes: HashMap<NodeIndex, Vec<NodeIndex>>,
    subtypes: HashMap<NodeIndex, Vec<NodeIndex>>,
}

impl Hierarchy {
    pub fn new(graph: &ProgramGraph) -> Self {
        let view = EdgeFiltered::from_fn(&graph.inner, |e| e.weight().is_hierarchy());

        let mut supertypes = HashMap::new();
        let mut subtypes: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
        for (idx, node) in graph.nodes() {
            if !matches!(node, Node::Class(_)) {
                continue;
            }
            let mut bfs = Bfs::new(&view, idx);
            let mut ancestors = Vec::new();
            while let Some(ancestor) = bfs.next(&view) {
                if ancestor != idx {
                    ancestors.push(ancestor);
                }
            }
            for &ancestor in &ancestors {
                subtypes.entry(ancestor).or_default().push(idx);
            }
            supertypes.insert(idx, ancestors);
        }

        Self {
            supertypes,
            subtypes,
        }
    }

    /// Transitive supertypes, nearest first
    pub fn supertypes(&self, class: NodeIndex) -> &[NodeIndex] {
        self.supertypes.get(&class).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Transitive subtypes
    pub fn subtypes(&self, class: NodeIndex) -> &[NodeIndex] {
        self.subtypes.get(&class).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Reflexive subtype check
    pub fn is_subtype(&self, sub: NodeIndex, sup: NodeIndex) -> bool {
        sub == sup || self.supertypes(sub).contains(&sup)
    }

    /// The method a receiver of class `class` runs for `name`+`descriptor`.
    ///
    /// Walks the superclass chain for the first non-abstract instance
    /// declaration, then falls back to default methods on superinterfaces.
    /// Returns `None` when the implementation is abstract, outside the
    /// program, or absent.
    pub fn implementation(
        &self,
        graph: &ProgramGraph,
        class: NodeIndex,
        name: &str,
        descriptor: &str,
    ) -> Option<NodeIndex> {
        let mut current = graph.id_at(class).map(|id| id.class_name().to_string());
        let mut seen = HashSet::new();

        while let Some(class_name) = current {
            if !seen.insert(class_name.clone()) {
                break;
            }
            let Some(node) = graph.class(&class_name) else {
                break;
            };
            if let Some(id) = graph.declared(&class_name, NodeKind::Method, name, descriptor) {
                let member = graph.member(&id)?;
                if !member.modifiers.is_static() && !member.modifiers.is_private() {
                    if member.modifiers.is_abstract() || !node.is_program() {
                        return None;
                    }
                    return graph.index(&id);
                }
            }
            current = node.superclass.clone();
        }

        // Default methods
        self.supertypes(class).iter().find_map(|&ancestor| {
            let node = graph.node_at(ancestor)?.as_class()?;
            if !node.modifiers.is_interface() || !node.is_program() {
                return None;
            }
            let id = graph.declared(&node.name, NodeKind::Method, name, descriptor)?;
            let member = graph.member(&id)?;
            if member.modifiers.is_abstract() || member.modifiers.is_static() {
                return None;
            }
            graph.index(&id)
        })
    }
}

/// Find a class whose supertype chain leads back to itself.
///
/// Looks only at linked `SUPER` and `IMPLEMENTS` edges.
pub fn find_cycle(graph: &ProgramGraph) -> Option<String> {
    let view = EdgeFiltered::from_fn(&graph.inner, |e| e.weight().is_hierarchy());
    let cycle = toposort(&view, None).err()?;
    graph.id_at(cycle.node_id()).map(|id| id.class_name().to_string())
}

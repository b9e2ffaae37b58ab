use crate::graph::{Node, NodeKind};
use crate::unit::Modifiers;
use std::collections::BTreeSet;

/// What a root predicate gets to see of a node
#[derive(Debug, Clone, Copy)]
pub struct NodeDescriptor<'a> {
    pub kind: NodeKind,
    /// Owning class for members, the class itself otherwise
    pub class_name: &'a str,
    pub member_name: Option<&'a str>,
    pub descriptor: Option<&'a str>,
    pub modifiers: Modifiers,
    pub annotations: &'a BTreeSet<String>,
}

impl<'a> NodeDescriptor<'a> {
    pub fn of(node: &'a Node) -> Self {
        match node {
            Node::Class(class) => Self {
                kind: NodeKind::Class,
                class_name: &class.name,
                member_name: None,
                descriptor: None,
                modifiers: class.modifiers,
                annotations: &class.annotations,
            },
            Node::Member(member) => Self {
                kind: member.id.kind(),
                class_name: member.id.class_name(),
                member_name: Some(member.name()),
                descriptor: Some(member.descriptor()),
                modifiers: member.modifiers,
                annotations: &member.annotations,
            },
        }
    }
}

/// Membership test for one counter-set's root set
pub trait RootPredicate: Send + Sync {
    fn matches(&self, node: &NodeDescriptor<'_>) -> bool;
}

impl<F> RootPredicate for F
where
    F: Fn(&NodeDescriptor<'_>) -> bool + Send + Sync,
{
    fn matches(&self, node: &NodeDescriptor<'_>) -> bool {
        self(node)
    }
}

/// Matches nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRoots;

impl RootPredicate for NoRoots {
    fn matches(&self, _node: &NodeDescriptor<'_>) -> bool {
        false
    }
}

/// A named root universe and a fingerprint of the rules behind it
#[derive(Clone, Copy)]
pub struct CounterSet<'a> {
    pub name: &'a str,
    /// Changes whenever the predicate would match differently
    pub fingerprint: &'a str,
    pub predicate: &'a dyn RootPredicate,
}

impl<'a> CounterSet<'a> {
    pub fn new(name: &'a str, fingerprint: &'a str, predicate: &'a dyn RootPredicate) -> Self {
        Self {
            name,
            fingerprint,
            predicate,
        }
    }
}

use crate::graph::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Nodes with a positive retention counter
pub type KeptSet = BTreeSet<NodeId>;

/// How much of a kept node survives
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeepState {
    /// Exists for structural validity; members not implied
    Shell,
    /// Needed by a live code path
    Full,
}

/// Retention counter of one node under one counter-set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retention {
    pub counter: u32,
    pub state: KeepState,
}

impl Retention {
    pub fn new(state: KeepState) -> Self {
        Self { counter: 1, state }
    }
}

/// Result of marking one counter-set: roots and per-node retention
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterTable {
    pub roots: BTreeSet<NodeId>,
    pub retention: BTreeMap<NodeId, Retention>,
}

impl CounterTable {
    pub fn is_kept(&self, id: &NodeId) -> bool {
        self.retention.get(id).map_or(false, |r| r.counter > 0)
    }

    pub fn state(&self, id: &NodeId) -> Option<KeepState> {
        self.retention
            .get(id)
            .filter(|r| r.counter > 0)
            .map(|r| r.state)
    }

    pub fn is_fully_kept(&self, id: &NodeId) -> bool {
        self.state(id) == Some(KeepState::Full)
    }

    pub fn is_root(&self, id: &NodeId) -> bool {
        self.roots.contains(id)
    }

    pub fn counter(&self, id: &NodeId) -> u32 {
        self.retention.get(id).map_or(0, |r| r.counter)
    }

    /// Node ids with a positive counter
    pub fn kept(&self) -> impl Iterator<Item = &NodeId> {
        self.retention
            .iter()
            .filter(|(_, r)| r.counter > 0)
            .map(|(id, _)| id)
    }

    pub fn kept_set(&self) -> KeptSet {
        self.kept().cloned().collect()
    }

    /// Kept nodes with their shell/full flag, ignoring counter magnitudes
    pub fn kept_states(&self) -> BTreeMap<NodeId, KeepState> {
        self.retention
            .iter()
            .filter(|(_, r)| r.counter > 0)
            .map(|(id, r)| (id.clone(), r.state))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.kept().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kept classes, in name order
    pub fn kept_classes(&self) -> Vec<&str> {
        self.kept()
            .filter_map(|id| match id {
                NodeId::Class(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

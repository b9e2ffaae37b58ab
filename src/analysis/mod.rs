// Analysis module - keep-set computation over the program graph

mod reachability;
mod remark;
mod retention;
mod roots;

pub use reachability::ReachabilityEngine;
pub use remark::RemarkStats;
pub use retention::{CounterTable, KeepState, KeptSet, Retention};
pub use roots::{CounterSet, NoRoots, NodeDescriptor, RootPredicate};

pub(crate) use reachability::{MarkContext, Marker};

//! classshrink - whole-program shrinking of compiled class units
//!
//! This library decides which classes, methods and fields of a program are
//! needed from a set of keep rules, writes pruned copies of the needed units
//! and keeps enough state to redo the work incrementally after body edits.
//!
//! # Architecture
//!
//! The pipeline consists of:
//! 1. **Discovery** - Find program and library unit files
//! 2. **Graph Building** - Link units into a typed dependency graph
//! 3. **Marking** - Compute a keep set per counter-set, with virtual dispatch
//! 4. **Pruning** - Strip unkept members and write the surviving units
//! 5. **Persistence** - Snapshot the graph and counter tables
//! 6. **Incremental runs** - Re-link changed bodies and re-mark from the snapshot
//! 7. **Reporting** - Terminal or JSON summaries

pub mod analysis;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod graph;
pub mod incremental;
pub mod prune;
pub mod report;
pub mod shrinker;
pub mod unit;
pub mod watch;

pub use analysis::{CounterSet, CounterTable, KeepState, NodeDescriptor, ReachabilityEngine, RootPredicate};
pub use cache::{Snapshot, SnapshotError};
pub use config::{Config, KeepRuleConfig, KeepRules};
pub use discovery::FileFinder;
pub use error::ShrinkError;
pub use graph::{EdgeKind, GraphBuilder, NodeId, ParallelGraphBuilder, ProgramGraph};
pub use incremental::{IncrementalCoordinator, IncrementalError, StructuralChange};
pub use prune::{JsonUnitWriter, KeepMask, OutputPruner, UnitWriter};
pub use report::{ReportFormat, Reporter};
pub use shrinker::{RunMode, RunSummary, Shrinker};
pub use unit::{ParsedUnit, UnitReader};

// Top-level error for a shrinker run

use crate::cache::SnapshotError;
use crate::config::KeepRuleError;
use crate::graph::BuildError;
use crate::incremental::IncrementalError;
use crate::prune::WriteError;
use crate::unit::UnitError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShrinkError {
    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error("Malformed input: {0}")]
    Build(#[from] BuildError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Incremental(#[from] IncrementalError),

    #[error("Invalid keep rules: {0}")]
    KeepRules(#[from] KeepRuleError),

    #[error("Failed to write output: {0}")]
    Write(#[from] WriteError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ShrinkError {
    /// Whether falling back to a full run would succeed where this failed
    pub fn is_recoverable(&self) -> bool {
        match self {
            ShrinkError::Incremental(e) => e.is_recoverable(),
            ShrinkError::Snapshot(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShrinkError>;

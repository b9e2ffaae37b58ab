//! Persisted shrinker state
//!
//! The snapshot carries the whole program graph, the counter table of every
//! counter-set and a fingerprint per input unit, so the next run can tell
//! which units changed and re-mark from where the last run stopped.

use crate::analysis::CounterTable;
use crate::graph::{ClassNode, EdgeKind, MemberNode, Node, NodeId, PlatformTypes, ProgramGraph};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::debug;

/// Anything that makes a snapshot unusable. Callers fall back to a full run.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("No snapshot at {0}")]
    Missing(PathBuf),
    #[error("Failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse snapshot: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Snapshot version {found} does not match {expected}")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("Snapshot is inconsistent: {0}")]
    Corrupt(String),
    #[error("Failed to fingerprint {path}: {source}")]
    Fingerprint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Change detection data for one input unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitFingerprint {
    /// Modification time, seconds since the UNIX epoch
    pub mtime: u64,
    pub size: u64,
    pub content_hash: String,
}

impl UnitFingerprint {
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let mtime = metadata
            .modified()?
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let content = fs::read(path)?;

        Ok(Self {
            mtime,
            size: metadata.len(),
            content_hash: Self::compute_hash(&content),
        })
    }

    /// Size and mtime differ (fast path)
    pub fn quick_changed(&self, path: &Path) -> bool {
        match fs::metadata(path) {
            Ok(metadata) => {
                let mtime = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                mtime != self.mtime || metadata.len() != self.size
            }
            Err(_) => true,
        }
    }

    /// Content hash differs (slow path)
    pub fn content_changed(&self, path: &Path) -> bool {
        match fs::read(path) {
            Ok(content) => Self::compute_hash(&content) != self.content_hash,
            Err(_) => true,
        }
    }

    /// Touching a file without editing it is not a change
    pub fn changed(&self, path: &Path) -> bool {
        self.quick_changed(path) && self.content_changed(path)
    }

    pub(crate) fn compute_hash(content: &[u8]) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

/// Fingerprints for a set of unit files
pub fn fingerprint_all(paths: &[PathBuf]) -> Result<BTreeMap<PathBuf, UnitFingerprint>, SnapshotError> {
    paths
        .iter()
        .map(|path| {
            let fingerprint = UnitFingerprint::from_path(path).map_err(|source| SnapshotError::Fingerprint {
                path: path.clone(),
                source,
            })?;
            Ok((path.clone(), fingerprint))
        })
        .collect()
}

/// Input files compared against a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitChanges {
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
}

impl UnitChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Compare the files present now with the fingerprints of the last run
    pub fn detect(known: &BTreeMap<PathBuf, UnitFingerprint>, current: &[PathBuf]) -> Self {
        let present: BTreeSet<&PathBuf> = current.iter().collect();
        let mut changes = Self::default();

        for path in current {
            match known.get(path) {
                None => changes.added.push(path.clone()),
                Some(fingerprint) if fingerprint.changed(path) => changes.modified.push(path.clone()),
                Some(_) => {}
            }
        }
        changes.removed = known.keys().filter(|p| !present.contains(p)).cloned().collect();

        changes.added.sort();
        changes.modified.sort();
        changes
    }
}

/// Output settings a snapshot was emitted with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitSettings {
    pub counter_set: String,
    pub output: Option<PathBuf>,
    pub omit_empty_shells: bool,
}

/// Marking result of one counter-set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSetState {
    /// Fingerprint of the keep rules the table was computed with
    pub fingerprint: String,
    pub table: CounterTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
}

/// Everything one run leaves for the next
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub created_at: u64,
    pub platform: PlatformTypes,
    pub emit: EmitSettings,
    pub classes: Vec<ClassNode>,
    pub members: Vec<MemberNode>,
    pub edges: Vec<PersistedEdge>,
    pub counter_sets: BTreeMap<String, CounterSetState>,
    /// Program unit files
    pub units: BTreeMap<PathBuf, UnitFingerprint>,
    /// Library unit files
    pub libraries: BTreeMap<PathBuf, UnitFingerprint>,
    /// Unresolved class reference warnings
    pub warnings: usize,
    /// Unresolved member references per referencing node
    #[serde(default)]
    pub missing_refs: Vec<(NodeId, usize)>,
}

impl Snapshot {
    /// Capture the graph; counter-sets and fingerprints are filled in by the caller
    pub fn new(graph: &ProgramGraph, platform: PlatformTypes, emit: EmitSettings) -> Self {
        let mut classes = Vec::new();
        let mut members = Vec::new();
        for (_, node) in graph.nodes() {
            match node {
                Node::Class(class) => classes.push(class.clone()),
                Node::Member(member) => members.push(member.clone()),
            }
        }
        classes.sort_by(|a, b| a.name.cmp(&b.name));
        members.sort_by(|a, b| a.id.cmp(&b.id));

        let mut edges: Vec<PersistedEdge> = graph
            .edges()
            .map(|(from, to, kind)| PersistedEdge {
                from: from.clone(),
                to: to.clone(),
                kind: kind.clone(),
            })
            .collect();
        edges.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));

        Self {
            version: SNAPSHOT_VERSION,
            created_at: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            platform,
            emit,
            classes,
            members,
            edges,
            counter_sets: BTreeMap::new(),
            units: BTreeMap::new(),
            libraries: BTreeMap::new(),
            warnings: graph.class_warnings(),
            missing_refs: graph.missing_refs().iter().map(|(id, &count)| (id.clone(), count)).collect(),
        }
    }

    pub fn with_counter_set(mut self, name: impl Into<String>, fingerprint: impl Into<String>, table: CounterTable) -> Self {
        self.counter_sets.insert(
            name.into(),
            CounterSetState {
                fingerprint: fingerprint.into(),
                table,
            },
        );
        self
    }

    pub fn with_units(
        mut self,
        units: BTreeMap<PathBuf, UnitFingerprint>,
        libraries: BTreeMap<PathBuf, UnitFingerprint>,
    ) -> Self {
        self.units = units;
        self.libraries = libraries;
        self
    }

    /// Default snapshot location inside a project
    pub fn default_path(project_root: &Path) -> PathBuf {
        project_root.join(".classshrink-state.json")
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        if !path.exists() {
            return Err(SnapshotError::Missing(path.to_path_buf()));
        }
        let file = fs::File::open(path)?;
        let reader = BufReader::new(file);

        // Check the version before committing to the full layout
        let value: serde_json::Value = serde_json::from_reader(reader)?;
        let found = value.get("version").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        if found != SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                found,
                expected: SNAPSHOT_VERSION,
            });
        }

        let snapshot: Self = serde_json::from_value(value)?;
        debug!(
            "Loaded snapshot: {} classes, {} members, {} edges",
            snapshot.classes.len(),
            snapshot.members.len(),
            snapshot.edges.len()
        );
        Ok(snapshot)
    }

    /// Write to a sibling temporary file, then rename over `path`
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = path.with_extension("json.tmp");
        {
            let file = fs::File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Rebuild the program graph
    pub fn to_graph(&self) -> Result<ProgramGraph, SnapshotError> {
        let mut graph = ProgramGraph::new();
        for class in &self.classes {
            graph.add_class(class.clone());
        }
        for member in &self.members {
            if !graph.contains(&NodeId::class(member.id.class_name())) {
                return Err(SnapshotError::Corrupt(format!("member {} has no owner", member.id)));
            }
            graph.add_member(member.clone());
        }
        for edge in &self.edges {
            if !graph.contains(&edge.from) || !graph.contains(&edge.to) {
                return Err(SnapshotError::Corrupt(format!(
                    "edge {} -> {} names an unknown node",
                    edge.from, edge.to
                )));
            }
            graph.add_edge(&edge.from, &edge.to, edge.kind.clone());
        }
        graph.set_warnings(self.warnings);
        graph.set_missing_refs(self.missing_refs.iter().cloned());
        Ok(graph)
    }

    pub fn counter_set(&self, name: &str) -> Option<&CounterSetState> {
        self.counter_sets.get(name)
    }

    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            classes: self.classes.len(),
            members: self.members.len(),
            edges: self.edges.len(),
            counter_sets: self.counter_sets.len(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SnapshotStats {
    pub classes: usize,
    pub members: usize,
    pub edges: usize,
    pub counter_sets: usize,
}

impl std::fmt::Display for SnapshotStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} classes, {} members, {} edges, {} counter-sets",
            self.classes, self.members, self.edges, self.counter_sets
        )
    }
}

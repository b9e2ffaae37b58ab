// Unit writers - where pruned units end up

use super::KeepMask;
use crate::unit::ParsedUnit;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {class}: {source}")]
    Serialize {
        class: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Receives each kept unit after its mask has been applied
pub trait UnitWriter: Send + Sync {
    /// Write the pruned unit, returning where it went
    fn write(&self, unit: &ParsedUnit, mask: &KeepMask) -> Result<PathBuf, WriteError>;

    /// Remove any earlier output for `class`; `true` if something was removed
    fn delete(&self, class: &str) -> Result<bool, WriteError>;

    /// Classes that currently have an output
    fn existing(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Writes `<root>/<internal/name>.unit.json`
#[derive(Debug, Clone)]
pub struct JsonUnitWriter {
    root: PathBuf,
    pretty: bool,
}

impl JsonUnitWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pretty: true,
        }
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn output_path(&self, class: &str) -> PathBuf {
        self.root.join(format!("{}.unit.json", class))
    }
}

impl UnitWriter for JsonUnitWriter {
    fn write(&self, unit: &ParsedUnit, _mask: &KeepMask) -> Result<PathBuf, WriteError> {
        let path = self.output_path(&unit.name);
        let io_err = |source| WriteError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = File::create(&path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);

        let result = if self.pretty {
            serde_json::to_writer_pretty(&mut writer, unit)
        } else {
            serde_json::to_writer(&mut writer, unit)
        };
        result.map_err(|source| WriteError::Serialize {
            class: unit.name.clone(),
            source,
        })?;
        writer.flush().map_err(io_err)?;

        Ok(path)
    }

    fn delete(&self, class: &str) -> Result<bool, WriteError> {
        let path = self.output_path(class);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(WriteError::Io { path, source }),
        }
    }

    fn existing(&self) -> Vec<String> {
        let mut classes: Vec<String> = walkdir::WalkDir::new(&self.root)
            .into_iter()
            .flatten()
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&self.root).ok()?;
                let name = relative.to_str()?.strip_suffix(".unit.json")?;
                Some(name.replace(std::path::MAIN_SEPARATOR, "/"))
            })
            .collect();
        classes.sort();
        classes
    }
}

// Unit file reader - JSON and YAML encodings of ParsedUnit

use super::{ParsedUnit, UnitError};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Anything able to hand back the parsed unit stored at a path.
///
/// The shrinker re-reads units when emitting, so tests can swap the
/// filesystem for an in-memory map.
pub trait UnitSource: Send + Sync {
    fn load(&self, path: &Path) -> Result<ParsedUnit, UnitError>;
}

/// Reads `*.unit.json` and `*.unit.yaml` files from disk
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitReader;

impl UnitReader {
    pub fn new() -> Self {
        Self
    }

    /// Whether the path looks like a unit file
    pub fn is_unit_file(path: &Path) -> bool {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        name.ends_with(".unit.json") || name.ends_with(".unit.yaml") || name.ends_with(".unit.yml")
    }

    /// Read and validate one unit
    pub fn read(&self, path: &Path) -> Result<ParsedUnit, UnitError> {
        trace!("Reading unit {}", path.display());

        let file = File::open(path).map_err(|source| UnitError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let unit: ParsedUnit = match ext {
            "json" => serde_json::from_reader(reader).map_err(|e| UnitError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?,
            "yaml" | "yml" => serde_yaml::from_reader(reader).map_err(|e| UnitError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?,
            _ => return Err(UnitError::UnsupportedFormat(path.to_path_buf())),
        };

        unit.validate()?;
        Ok(unit)
    }
}

impl UnitSource for UnitReader {
    fn load(&self, path: &Path) -> Result<ParsedUnit, UnitError> {
        self.read(path)
    }
}

impl UnitSource for HashMap<PathBuf, ParsedUnit> {
    fn load(&self, path: &Path) -> Result<ParsedUnit, UnitError> {
        self.get(path).cloned().ok_or_else(|| UnitError::Read {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "unit not registered"),
        })
    }
}

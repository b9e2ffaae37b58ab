// Unit file discovery

use crate::config::Config;
use crate::unit::UnitReader;
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Finds program and library unit files under the configured directories
pub struct FileFinder<'a> {
    config: &'a Config,
}

impl<'a> FileFinder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Program units, sorted
    pub fn find_program_units(&self) -> Vec<PathBuf> {
        self.find_units(&self.config.inputs)
    }

    /// Library units, sorted
    pub fn find_library_units(&self) -> Vec<PathBuf> {
        self.find_units(&self.config.libraries)
    }

    /// Unit files under `dirs`, deduplicated and in a stable order
    pub fn find_units(&self, dirs: &[PathBuf]) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = dirs.par_iter().flat_map(|dir| self.scan_directory(dir)).collect();
        files.sort();
        files.dedup();
        debug!("Found {} unit files", files.len());
        files
    }

    fn scan_directory(&self, dir: &Path) -> Vec<PathBuf> {
        if !dir.exists() {
            trace!("Directory does not exist: {}", dir.display());
            return Vec::new();
        }

        // Unit files are build outputs, usually git-ignored
        let walker = WalkBuilder::new(dir)
            .hidden(true)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .ignore(true)
            .parents(false)
            .follow_links(false)
            .build();

        walker
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                let path = entry.path();
                if !UnitReader::is_unit_file(path) {
                    return None;
                }
                // Pruned output is never input
                if self.config.output.as_ref().map_or(false, |out| path.starts_with(out)) {
                    return None;
                }
                if self.config.should_exclude(path) {
                    trace!("Excluding: {}", path.display());
                    return None;
                }
                Some(path.to_path_buf())
            })
            .collect()
    }
}

// Parallel graph builder using rayon

use super::{BuildError, GraphBuilder, PlatformTypes, ProgramGraph};
use crate::unit::{ParsedUnit, UnitError, UnitReader};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::info;

/// Reads units on the rayon pool, then links them on one thread
pub struct ParallelGraphBuilder {
    platform: PlatformTypes,
    progress: bool,
}

impl ParallelGraphBuilder {
    pub fn new(platform: PlatformTypes) -> Self {
        Self {
            platform,
            progress: false,
        }
    }

    /// Show a progress bar while reading
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Read and validate unit files in parallel. Any malformed unit fails
    /// the whole batch.
    pub fn read_units(&self, files: &[PathBuf]) -> Result<Vec<(PathBuf, ParsedUnit)>, UnitError> {
        let pb = if self.progress {
            let pb = ProgressBar::new(files.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb
        } else {
            ProgressBar::hidden()
        };

        let reader = UnitReader::new();
        let results: Vec<Result<(PathBuf, ParsedUnit), UnitError>> = files
            .par_iter()
            .map(|path| {
                let unit = reader.read(path);
                pb.inc(1);
                unit.map(|u| (path.clone(), u))
            })
            .collect();
        pb.finish_and_clear();

        results.into_iter().collect()
    }

    /// Build the program graph from program and library unit files.
    ///
    /// Returns the graph plus the program units, which the caller needs
    /// again when emitting pruned output.
    pub fn build_from_files(
        &self,
        program: &[PathBuf],
        libraries: &[PathBuf],
    ) -> Result<(ProgramGraph, Vec<(ParsedUnit, PathBuf)>), BuildError> {
        info!("Reading {} program and {} library units in parallel...", program.len(), libraries.len());

        let program_units = self.read_units(program)?;
        let library_units = self.read_units(libraries)?;

        let mut builder = GraphBuilder::new(self.platform.clone());
        for (path, unit) in program_units {
            builder.add_unit(unit, path)?;
        }
        for (_, unit) in library_units {
            builder.add_library_unit(unit)?;
        }

        builder.build_keeping_units()
    }
}

impl Default for ParallelGraphBuilder {
    fn default() -> Self {
        Self::new(PlatformTypes::default())
    }
}

//! Watch mode
//!
//! Monitors the unit directories and re-runs the shrinker whenever a unit
//! file changes. Each change is usually a body edit, so re-runs go through
//! the incremental path.

use colored::Colorize;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Watch mode errors
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to create file watcher: {0}")]
    WatcherError(#[from] notify::Error),
    #[error("Failed to receive events: {0}")]
    RecvError(#[from] std::sync::mpsc::RecvError),
}

/// File watcher for continuous shrinking
pub struct FileWatcher {
    /// Debounce duration in milliseconds
    debounce_ms: u64,
    /// Paths whose changes never trigger a run (output dir, state file)
    ignored: Vec<PathBuf>,
}

impl FileWatcher {
    pub fn new() -> Self {
        Self {
            debounce_ms: 500,
            ignored: Vec::new(),
        }
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    /// Ignore changes below `path`
    pub fn ignoring(mut self, path: impl Into<PathBuf>) -> Self {
        self.ignored.push(path.into());
        self
    }

    /// Check if a path should trigger a run
    fn should_trigger(&self, path: &Path) -> bool {
        if self.ignored.iter().any(|ignored| path.starts_with(ignored)) {
            return false;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        name.ends_with(".unit.json") || name.ends_with(".unit.yaml") || name.ends_with(".unit.yml")
    }

    /// Watch `dirs` and call `on_change` once up front and after every
    /// batch of relevant changes. The callback returns false to stop.
    pub fn watch<F>(&self, dirs: &[PathBuf], mut on_change: F) -> Result<(), WatchError>
    where
        F: FnMut() -> bool,
    {
        let (tx, rx) = channel();
        let mut debouncer = new_debouncer(Duration::from_millis(self.debounce_ms), tx)?;

        for dir in dirs.iter().filter(|d| d.exists()) {
            debouncer.watcher().watch(dir, RecursiveMode::Recursive)?;
        }

        println!();
        println!("{}", "👁  Watch mode active. Press Ctrl+C to stop.".cyan().bold());
        for dir in dirs {
            println!("{}", format!("   Watching: {}", dir.display()).dimmed());
        }
        println!();

        if !on_change() {
            return Ok(());
        }

        loop {
            match rx.recv()? {
                Ok(events) => {
                    let relevant: Vec<_> = events
                        .iter()
                        .filter(|e| {
                            matches!(e.kind, DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous)
                                && self.should_trigger(&e.path)
                        })
                        .collect();

                    if relevant.is_empty() {
                        debug!("Ignoring {} unrelated events", events.len());
                        continue;
                    }

                    println!();
                    println!(
                        "{}",
                        format!("🔄 {} unit file(s) changed, re-running...", relevant.len()).yellow()
                    );
                    for event in relevant.iter().take(5) {
                        if let Some(name) = event.path.file_name() {
                            println!("   • {}", name.to_string_lossy().dimmed());
                        }
                    }
                    if relevant.len() > 5 {
                        println!("   • ... and {} more", relevant.len() - 5);
                    }
                    println!();

                    if !on_change() {
                        break;
                    }
                }
                Err(e) => {
                    eprintln!("{}: {:?}", "Watch error".red(), e);
                }
            }
        }

        Ok(())
    }
}

impl Default for FileWatcher {
    fn default() -> Self {
        Self::new()
    }
}

// Configuration loader

use super::keep_rules::{KeepRuleConfig, KeepRuleError, KeepRules};
use crate::graph::PlatformTypes;
use miette::{IntoDiagnostic, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the counter-set used when none is configured
pub const DEFAULT_COUNTER_SET: &str = "shrink";

/// Configuration for a shrinker run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directories holding program unit files
    pub inputs: Vec<PathBuf>,

    /// Directories holding library unit files
    pub libraries: Vec<PathBuf>,

    /// Where pruned units are written; nothing is written without it
    pub output: Option<PathBuf>,

    /// Snapshot file for incremental runs
    pub state: Option<PathBuf>,

    /// Path patterns to skip during discovery
    pub exclude: Vec<String>,

    /// Class name prefixes treated as platform types
    pub platform: PlatformTypes,

    /// Keep rules per counter-set
    pub keep: BTreeMap<String, Vec<KeepRuleConfig>>,

    /// Counter-set whose result is written to `output`
    pub emit: String,

    /// Skip writing classes kept only as empty shells with no kept subtypes
    pub omit_empty_shells: bool,

    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Output format: terminal, json
    pub format: String,

    /// List kept and removed classes, not just the totals
    pub list_classes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inputs: vec![],
            libraries: vec![],
            output: None,
            state: None,
            exclude: vec!["**/build/tmp/**".to_string(), "**/.gradle/**".to_string()],
            platform: PlatformTypes::default(),
            keep: BTreeMap::new(),
            emit: DEFAULT_COUNTER_SET.to_string(),
            omit_empty_shells: false,
            report: ReportConfig::default(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: "terminal".to_string(),
            list_classes: false,
        }
    }
}

impl Config {
    /// Load configuration from a file (YAML or TOML)
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match extension {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse YAML config"),
            "toml" => toml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse TOML config"),
            _ => {
                // Try YAML first, then TOML
                if let Ok(config) = serde_yaml::from_str(&contents) {
                    Ok(config)
                } else {
                    toml::from_str(&contents)
                        .into_diagnostic()
                        .wrap_err("Failed to parse config file")
                }
            }
        }
    }

    /// Try to load configuration from default locations
    pub fn from_default_locations(project_root: &Path) -> Result<Self> {
        let default_names = [
            ".shrinker.yml",
            ".shrinker.yaml",
            ".shrinker.toml",
            "shrinker.yml",
            "shrinker.yaml",
            "shrinker.toml",
        ];

        for name in &default_names {
            let path = project_root.join(name);
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Resolve relative directories against the project root
    pub fn rooted(mut self, project_root: &Path) -> Self {
        let root = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = project_root.join(&*p);
            }
        };
        self.inputs.iter_mut().for_each(root);
        self.libraries.iter_mut().for_each(root);
        self.output.iter_mut().for_each(root);
        self.state.iter_mut().for_each(root);
        if self.inputs.is_empty() {
            self.inputs.push(project_root.to_path_buf());
        }
        self
    }

    /// Snapshot location, defaulting to a file in the project root
    pub fn state_path(&self, project_root: &Path) -> PathBuf {
        self.state
            .clone()
            .unwrap_or_else(|| crate::cache::Snapshot::default_path(project_root))
    }

    /// Check if a pattern matches for exclusion
    pub fn should_exclude(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.exclude.iter().any(|pattern| glob_match(pattern, &path_str))
    }

    /// Counter-set names, always including the emitted one
    pub fn counter_set_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.keep.keys().cloned().collect();
        if !self.keep.contains_key(&self.emit) {
            names.push(self.emit.clone());
            names.sort();
        }
        names
    }

    /// Compile the keep rules of every counter-set
    pub fn keep_rules(&self) -> std::result::Result<Vec<KeepRules>, KeepRuleError> {
        self.counter_set_names()
            .iter()
            .map(|name| {
                let rules = self.keep.get(name).map(Vec::as_slice).unwrap_or(&[]);
                KeepRules::compile(name, rules)
            })
            .collect()
    }
}

/// Simple glob matching for path patterns like "**/build/**" or "*.tmp"
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern.starts_with('*') && !pattern.contains('/') {
        return text.ends_with(&pattern[1..]);
    }

    if pattern.ends_with('*') && !pattern.contains('/') {
        return text.starts_with(&pattern[..pattern.len() - 1]);
    }

    if pattern.contains("**") {
        // "**/dir/**" matches `dir` as a whole path component anywhere
        if pattern.starts_with("**/") && pattern.ends_with("/**") {
            let dir = pattern.trim_start_matches("**/").trim_end_matches("/**");
            return text.contains(&format!("/{}/", dir));
        }

        let parts: Vec<&str> = pattern.split("**").collect();
        if parts.len() == 2 {
            let prefix = parts[0].trim_end_matches('/');
            let suffix = parts[1].trim_start_matches('/');
            return match (prefix.is_empty(), suffix.is_empty()) {
                (true, true) => true,
                (true, false) => text.ends_with(suffix),
                (false, true) => text.starts_with(prefix) || text.contains(&format!("{}/", prefix)),
                (false, false) => {
                    (text.starts_with(prefix) || text.contains(&format!("/{}/", prefix))) && text.ends_with(suffix)
                }
            };
        }
    }

    text == pattern
}

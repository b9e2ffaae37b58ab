mod json;
mod terminal;

pub use json::JsonReporter;
pub use terminal::TerminalReporter;

use crate::shrinker::RunSummary;
use miette::Result;
use std::path::PathBuf;

/// Output format for run summaries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Terminal,
    Json,
}

impl ReportFormat {
    /// Parse the `report.format` config value
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "terminal" | "text" => Some(Self::Terminal),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Reporter for run summaries
pub struct Reporter {
    format: ReportFormat,
    output_path: Option<PathBuf>,
    list_classes: bool,
}

impl Reporter {
    pub fn new(format: ReportFormat, output_path: Option<PathBuf>) -> Self {
        Self {
            format,
            output_path,
            list_classes: false,
        }
    }

    pub fn with_class_lists(mut self, list: bool) -> Self {
        self.list_classes = list;
        self
    }

    pub fn report(&self, summary: &RunSummary) -> Result<()> {
        match self.format {
            ReportFormat::Terminal => TerminalReporter::new()
                .with_class_lists(self.list_classes)
                .report(summary),
            ReportFormat::Json => JsonReporter::new(self.output_path.clone()).report(summary),
        }
    }
}

use crate::shrinker::RunSummary;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::PathBuf;

/// JSON reporter for programmatic output
pub struct JsonReporter {
    output_path: Option<PathBuf>,
}

impl JsonReporter {
    pub fn new(output_path: Option<PathBuf>) -> Self {
        Self { output_path }
    }

    pub fn report(&self, summary: &RunSummary) -> Result<()> {
        let json = self.render(summary)?;

        if let Some(path) = &self.output_path {
            std::fs::write(path, &json).into_diagnostic()?;
            println!("Report written to: {}", path.display());
        } else {
            println!("{}", json);
        }

        Ok(())
    }

    pub fn render(&self, summary: &RunSummary) -> Result<String> {
        serde_json::to_string_pretty(&JsonReport::new(summary)).into_diagnostic()
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    version: &'static str,
    tool: &'static str,
    tool_version: &'static str,
    #[serde(flatten)]
    summary: &'a RunSummary,
}

impl<'a> JsonReport<'a> {
    fn new(summary: &'a RunSummary) -> Self {
        Self {
            version: "1.0",
            tool: env!("CARGO_PKG_NAME"),
            tool_version: env!("CARGO_PKG_VERSION"),
            summary,
        }
    }
}

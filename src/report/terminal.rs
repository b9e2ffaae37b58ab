use crate::shrinker::{CounterSetSummary, RunMode, RunSummary};
use colored::Colorize;
use miette::Result;
use std::fmt::Write;

/// Terminal reporter with colored output
pub struct TerminalReporter {
    /// Print kept and removed class names under each counter-set
    list_classes: bool,
}

impl TerminalReporter {
    pub fn new() -> Self {
        Self { list_classes: false }
    }

    pub fn with_class_lists(mut self, list: bool) -> Self {
        self.list_classes = list;
        self
    }

    pub fn report(&self, summary: &RunSummary) -> Result<()> {
        print!("{}", self.render(summary));
        Ok(())
    }

    /// The full report as text
    pub fn render(&self, summary: &RunSummary) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = self.write_report(&mut out, summary);
        out
    }

    fn write_report(&self, out: &mut String, summary: &RunSummary) -> std::fmt::Result {
        writeln!(out)?;
        let mode = match summary.mode {
            RunMode::Incremental => "Incremental run".cyan().bold(),
            _ => "Full run".cyan().bold(),
        };
        writeln!(
            out,
            "{} {}",
            mode,
            format!("({}ms)", summary.duration_ms).dimmed()
        )?;
        if let Some(reason) = &summary.fallback {
            writeln!(out, "  {} {}", "fell back:".yellow(), reason.dimmed())?;
        }
        if summary.mode == RunMode::Incremental {
            writeln!(out, "  {} modified units re-linked", summary.modified_units)?;
        }

        let graph = &summary.graph;
        writeln!(
            out,
            "  {} program, {} library, {} unresolved classes; {} members, {} edges",
            graph.program_classes, graph.library_classes, graph.unresolved_classes, graph.members, graph.edges
        )?;
        writeln!(out)?;

        for set in &summary.counter_sets {
            self.write_counter_set(out, set, set.name == summary.emitted)?;
        }

        writeln!(out, "{}", "─".repeat(60).dimmed())?;
        match &summary.output {
            Some(output) => {
                writeln!(
                    out,
                    "Output: {} written, {} deleted, {} omitted in {}",
                    summary.emit.written.to_string().green(),
                    summary.emit.deleted.to_string().red(),
                    summary.emit.omitted,
                    output.display().to_string().cyan()
                )?;
                if summary.mode == RunMode::Incremental {
                    writeln!(
                        out,
                        "  {} rewritten, {} retracted",
                        summary.rewritten.len(),
                        summary.retracted.len()
                    )?;
                }
            }
            None => writeln!(out, "{}", "No output directory configured; nothing written.".dimmed())?,
        }

        if summary.warnings > 0 {
            writeln!(
                out,
                "{}",
                format!("⚠ {} unresolved references", summary.warnings).yellow()
            )?;
        }
        Ok(())
    }

    fn write_counter_set(&self, out: &mut String, set: &CounterSetSummary, emitted: bool) -> std::fmt::Result {
        let marker = if emitted { "●".green().bold() } else { "○".dimmed() };
        writeln!(
            out,
            "{} {} {}",
            marker,
            set.name.bold(),
            format!("({} roots)", set.roots).dimmed()
        )?;
        writeln!(
            out,
            "    classes: {} kept ({} shells), {} removed",
            set.kept_classes.to_string().green(),
            set.shell_classes,
            set.removed_classes.to_string().red()
        )?;
        writeln!(
            out,
            "    members: {} kept, {} removed",
            set.kept_members.to_string().green(),
            set.removed_members.to_string().red()
        )?;

        if self.list_classes {
            for class in &set.kept {
                writeln!(out, "      {} {}", "+".green(), class)?;
            }
            for class in &set.removed {
                writeln!(out, "      {} {}", "-".red(), class.dimmed())?;
            }
        }
        writeln!(out)
    }
}

impl Default for TerminalReporter {
    fn default() -> Self {
        Self::new()
    }
}

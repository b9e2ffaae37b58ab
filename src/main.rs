use clap::Parser;
use colored::Colorize;
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use classshrink::config::Config;
use classshrink::report::{ReportFormat, Reporter};
use classshrink::shrinker::{RunMode, RunSummary, Shrinker};
use classshrink::watch::FileWatcher;

/// classshrink - Whole-program class shrinker with incremental re-runs
#[derive(Parser, Debug)]
#[command(name = "classshrink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project directory; relative paths in the config resolve against it
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directories holding program unit files (can be specified multiple times)
    #[arg(short, long)]
    input: Vec<PathBuf>,

    /// Directories holding library unit files (can be specified multiple times)
    #[arg(short, long)]
    library: Vec<PathBuf>,

    /// Directory the pruned units are written to
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Snapshot file used between runs (default: .classshrink-state.json)
    #[arg(long, value_name = "FILE")]
    state: Option<PathBuf>,

    /// Patterns to exclude from discovery (can be specified multiple times)
    #[arg(short, long)]
    exclude: Vec<String>,

    /// Full run, incremental run, or incremental with full fallback
    #[arg(short, long, value_enum, default_value = "auto")]
    mode: Mode,

    /// Counter-set whose result is written to the output directory
    #[arg(long, value_name = "NAME")]
    counter_set: Option<String>,

    /// Report format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Write the JSON report to a file instead of stdout (implies --format json)
    #[arg(short, long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// List kept and removed classes in the report
    #[arg(long)]
    list_classes: bool,

    /// Watch mode - re-run whenever a unit file changes
    #[arg(long)]
    watch: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode - only output results
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default)]
enum Mode {
    Full,
    Incremental,
    #[default]
    Auto,
}

impl From<Mode> for RunMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Full => RunMode::Full,
            Mode::Incremental => RunMode::Incremental,
            Mode::Auto => RunMode::Auto,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default)]
enum OutputFormat {
    #[default]
    Terminal,
    Json,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Terminal => ReportFormat::Terminal,
            OutputFormat::Json => ReportFormat::Json,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    info!("classshrink v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;
    let reporter = reporter(&cli, &config)?;
    let shrinker = Shrinker::new(config, cli.path.clone()).with_progress(!cli.quiet);

    if cli.watch {
        run_watch_mode(&shrinker, &reporter, &cli)
    } else {
        let summary = shrinker.run(cli.mode.into()).into_diagnostic()?;
        reporter.report(&summary)
    }
}

fn run_watch_mode(shrinker: &Shrinker, reporter: &Reporter, cli: &Cli) -> Result<()> {
    let mut watcher = FileWatcher::new().ignoring(shrinker.state_path());
    if let Some(output) = &shrinker.config().output {
        watcher = watcher.ignoring(output);
    }

    let mut mode: RunMode = cli.mode.into();
    watcher
        .watch(&shrinker.watched_dirs(), || {
            match run_once(shrinker, reporter, mode) {
                Ok(_) => {
                    println!();
                    println!("{}", "✓ Shrink complete. Waiting for changes...".green());
                }
                Err(e) => eprintln!("{}: {:?}", "Shrink error".red(), e),
            }
            // Later runs start from the state the previous one saved
            mode = RunMode::Auto;
            true
        })
        .map_err(|e| miette::miette!("Watch error: {}", e))
}

fn run_once(shrinker: &Shrinker, reporter: &Reporter, mode: RunMode) -> Result<RunSummary> {
    let summary = shrinker.run(mode).into_diagnostic()?;
    reporter.report(&summary)?;
    Ok(summary)
}

fn init_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        Config::from_default_locations(&cli.path)?
    };

    // Override with CLI arguments
    if !cli.input.is_empty() {
        config.inputs = cli.input.clone();
    }
    if !cli.library.is_empty() {
        config.libraries = cli.library.clone();
    }
    if cli.output.is_some() {
        config.output = cli.output.clone();
    }
    if cli.state.is_some() {
        config.state = cli.state.clone();
    }
    if !cli.exclude.is_empty() {
        config.exclude.extend(cli.exclude.clone());
    }
    if let Some(name) = &cli.counter_set {
        config.emit = name.clone();
    }
    if cli.list_classes {
        config.report.list_classes = true;
    }

    ensure_directory(&cli.path)?;
    Ok(config.rooted(&cli.path))
}

fn ensure_directory(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(miette::miette!("Invalid project path: {} is not a directory", path.display()))
    }
}

fn reporter(cli: &Cli, config: &Config) -> Result<Reporter> {
    let format = match cli.format {
        Some(format) => format.into(),
        None if cli.report.is_some() => ReportFormat::Json,
        None => ReportFormat::from_name(&config.report.format)
            .ok_or_else(|| miette::miette!("Unknown report format `{}`", config.report.format))?,
    };
    Ok(Reporter::new(format, cli.report.clone()).with_class_lists(config.report.list_classes))
}

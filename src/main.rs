use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

use karakuri::{KarakuriError, Manifest, Registry, standard_registry};

#[derive(Parser)]
#[command(name = "karakuri", version, about = "Asset build pipeline orchestrator")]
struct Cli {
    /// Path to the build manifest.
    #[arg(short, long, default_value = karakuri::config::DEFAULT_MANIFEST)]
    config: Utf8PathBuf,

    #[command(subcommand)]
    task: Option<Task>,
}

#[derive(Subcommand)]
enum Task {
    /// Delete the public directory tree
    Clean,
    /// Lint, concatenate and minify the scripts
    Scripts,
    /// Compile, prefix and minify the stylesheets
    Styles,
    /// Optimize images newer than their outputs
    Images,
    /// Copy the remaining static files
    Copy,
    /// Run clean, then every generator in parallel
    Build,
    /// Re-run tasks when their inputs change
    Watch,
    /// Build, watch, live-reload and supervise the app
    Develop,
}

impl Task {
    fn name(&self) -> &'static str {
        match self {
            Task::Clean => "clean",
            Task::Scripts => "scripts",
            Task::Styles => "styles",
            Task::Images => "images",
            Task::Copy => "copy",
            Task::Build => "build",
            Task::Watch => "watch",
            Task::Develop => "develop",
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, KarakuriError> {
    let Some(task) = cli.task else {
        print_task_listing();
        return Ok(ExitCode::SUCCESS);
    };

    let manifest = Manifest::load(&cli.config)?;
    let registry = standard_registry()?;

    match task {
        Task::Watch => {
            karakuri::watch(&manifest, &registry, |_| {})?;
            Ok(ExitCode::SUCCESS)
        }
        Task::Develop => {
            karakuri::develop(&manifest, &registry)?;
            Ok(ExitCode::SUCCESS)
        }
        other => run_once(&registry, other.name(), &manifest),
    }
}

/// Exit status reflects the aggregate task outcome: failures and skips have
/// already been reported through the sink while the run progressed.
fn run_once(
    registry: &Registry,
    name: &str,
    manifest: &Manifest,
) -> Result<ExitCode, KarakuriError> {
    let summary = registry.run(name, manifest)?;

    if summary.success() {
        Ok(ExitCode::SUCCESS)
    } else {
        let failures = summary.failures().count();
        eprintln!(
            "{} '{}' finished with {} failed task(s).",
            style("✗").red().bold(),
            name,
            failures
        );
        Ok(ExitCode::FAILURE)
    }
}

/// The default task: list the two primary entry points.
fn print_task_listing() {
    let divider = style("----------").green();

    eprintln!("{divider}");
    eprintln!("The following main {} are available:", style("tasks").cyan());
    eprintln!(
        "{}: builds the contents to the public directory.",
        style("build").cyan()
    );
    eprintln!(
        "{}: performs an initial build then sets up watches.",
        style("develop").cyan()
    );
    eprintln!("{divider}");
}

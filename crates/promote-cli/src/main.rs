#![forbid(unsafe_code)]

mod azdo;
mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use promote_core::config::{ConfigError, resolve_settings};
use promote_core::error::ErrorCode;
use promote_core::graph::TreeError;
use promote_core::pipeline::SyncError;
use promote_core::snapshot::SnapshotError;
use promote_core::source::{SinkError, SourceError};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "promote",
    author,
    version,
    about = "promote: roll child work items up onto their parents",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Output format (defaults to pretty on a terminal, text when piped).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Settings file to use instead of ./promote.toml.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Write a settings template",
        long_about = "Write a commented promote.toml (or the --config path) with report-only enabled.",
        after_help = "EXAMPLES:\n    # Create promote.toml in the current directory\n    promote init\n\n    # Overwrite an existing file\n    promote init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Show effective settings",
        long_about = "Show settings after layering project file, user file and PROMOTE_* variables. The token is masked.",
        after_help = "EXAMPLES:\n    # Show settings\n    promote config\n\n    # Fail when anything required is missing\n    promote config --check"
    )]
    Config(cmd::config::ConfigArgs),

    #[command(
        next_help_heading = "Read",
        about = "Print the work-item hierarchy",
        long_about = "Materialize the hierarchy from Azure DevOps or a snapshot and print it.",
        after_help = "EXAMPLES:\n    # Print the live hierarchy\n    promote tree\n\n    # Print a saved snapshot as JSON\n    promote tree --from-snapshot work-items.json --format json"
    )]
    Tree(cmd::tree::TreeArgs),

    #[command(
        next_help_heading = "Read",
        about = "Save the hierarchy to a JSON file",
        long_about = "Fetch the hierarchy and write the node registry as JSON for offline runs.",
        after_help = "EXAMPLES:\n    # Write work-items.json\n    promote snapshot\n\n    # Choose the path\n    promote snapshot --output backlog.json"
    )]
    Snapshot(cmd::snapshot::SnapshotArgs),

    #[command(
        next_help_heading = "Promote",
        about = "Roll children up onto their parents",
        long_about = "Roll task descriptions and states up to stories, story descriptions and tags up to features, and tags up to epics.",
        after_help = "EXAMPLES:\n    # Preview without writing\n    promote sync --report-only\n\n    # Write updates\n    promote sync\n\n    # Preview against a snapshot\n    promote sync --from-snapshot work-items.json --json"
    )]
    Sync(cmd::sync::SyncArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show who added and removed promotable tags",
        long_about = "Read every work item's revision history and report, per promotable tag, when it was added, by whom, when it was removed and how long it stayed.",
        after_help = "EXAMPLES:\n    # Report on the configured tags\n    promote tags-report\n\n    # Report on one more tag, only where it is still set\n    promote tags-report --tag blocked --open\n\n    # Machine-readable\n    promote tags-report --format json"
    )]
    TagsReport(cmd::tags_report::TagsReportArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completions",
        long_about = "Generate a completion script for the given shell on stdout.",
        after_help = "EXAMPLES:\n    # Bash\n    promote completions bash --output ~/.local/share/bash-completion/completions/promote\n\n    # Zsh, on stdout\n    promote completions zsh > ~/.zfunc/_promote"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_env("PROMOTE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if quiet {
            "error"
        } else if verbose || env::var("DEBUG").is_ok() {
            "promote=debug,info"
        } else {
            "promote=info,warn"
        })
    });

    let format = env::var("PROMOTE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// First coded error in the chain, outermost first.
fn error_code(err: &anyhow::Error) -> Option<ErrorCode> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<ConfigError>() {
            Some(e.code())
        } else if let Some(e) = cause.downcast_ref::<SyncError>() {
            Some(e.code())
        } else if let Some(e) = cause.downcast_ref::<SnapshotError>() {
            Some(e.code())
        } else if let Some(e) = cause.downcast_ref::<TreeError>() {
            Some(e.code())
        } else if let Some(e) = cause.downcast_ref::<SinkError>() {
            Some(e.code())
        } else if cause.downcast_ref::<SourceError>().is_some() {
            Some(ErrorCode::EdgeQueryFailed)
        } else if cause.downcast_ref::<cmd::sync::WriteFailures>().is_some() {
            Some(ErrorCode::PatchFailed)
        } else {
            None
        }
    })
}

fn describe(err: &anyhow::Error) -> CliError {
    let message = format!("{err:#}");
    match error_code(err) {
        Some(code) => CliError::with_code(message, code),
        None => CliError::new(message),
    }
}

fn run(cli: &Cli, output: OutputMode) -> anyhow::Result<()> {
    let project_root = env::current_dir()?;
    let config = cli.config.as_deref();

    match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, config, &project_root, output),
        Commands::Config(args) => {
            let settings = resolve_settings(config, &project_root)?;
            cmd::config::run_config(args, &settings, config, &project_root, output)
        }
        Commands::Tree(args) => {
            let settings = resolve_settings(config, &project_root)?;
            cmd::tree::run_tree(args, &settings, output)
        }
        Commands::Snapshot(args) => {
            let settings = resolve_settings(config, &project_root)?;
            cmd::snapshot::run_snapshot(args, &settings, output)
        }
        Commands::Sync(args) => {
            let settings = resolve_settings(config, &project_root)?;
            cmd::sync::run_sync(args, &settings, output)
        }
        Commands::TagsReport(args) => {
            let settings = resolve_settings(config, &project_root)?;
            cmd::tags_report::run_tags_report(args, &settings, output)
        }
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args, &mut command)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let output = cli.output_mode();
    debug!(?output, command = ?cli.command, "starting");

    match run(&cli, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            debug!(error = ?err, "command failed");
            if render_error(output, &describe(&err)).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

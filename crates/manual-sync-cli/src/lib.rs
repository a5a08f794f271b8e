use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use manual_sync_config::{Config, ConfigError, LoadOptions, ReportFormat};
use manual_sync_core::{
    load_source, render_outline, run_sync, Classifier, ExitCode, SyncError, SyncOptions,
    SyncRequest,
};
use manual_sync_docx::{Docx, DocxError};
use manual_sync_source::{MarkerMatcher, SourceError};
use tracing::level_filters::LevelFilter;

/// Entry point for CLI execution. Returns the desired exit code.
pub fn run() -> Result<ExitCode> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                ExitCode::InvalidArguments
            } else {
                ExitCode::Success
            };
            let _ = err.print();
            return Ok(code);
        }
    };
    init_logging(cli.verbose);

    let config = Config::load(LoadOptions {
        override_path: cli.config.clone(),
        working_dir: None,
    })?;
    tracing::debug!(layers = config.sources.layers.len(), "configuration loaded");

    match cli.command {
        Command::Sync(args) => handle_sync(config, args),
        Command::Blocks(args) => handle_blocks(&config, args),
        Command::Outline(args) => handle_outline(&config, args),
    }
}

/// Exit status for an error that escaped [`run`].
pub fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if let Some(sync) = err.downcast_ref::<SyncError>() {
        return sync.exit_code();
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return ExitCode::Config;
    }
    if err.downcast_ref::<SourceError>().is_some() {
        return ExitCode::SourceParse;
    }
    if err.downcast_ref::<DocxError>().is_some() {
        return ExitCode::TargetIo;
    }
    ExitCode::InvalidArguments
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

fn handle_sync(config: Config, args: SyncArgs) -> Result<ExitCode> {
    let SyncArgs {
        source,
        target,
        manifest,
        output,
        dry_run,
        diff,
        format,
        backup,
        no_backup,
        quiet,
    } = args;

    let format = match format {
        Some(FormatValue::Plain) => ReportFormat::Plain,
        Some(FormatValue::Json) => ReportFormat::Json,
        None => config.output.format,
    };
    let backup = match (backup, no_backup) {
        (_, true) => false,
        (true, false) => true,
        (false, false) => config.output.backup,
    };

    let request = SyncRequest {
        source,
        manifest,
        target,
        config,
        options: SyncOptions {
            dry_run,
            backup,
            diff,
            output,
        },
    };
    let outcome = run_sync(request)?;

    if !quiet {
        match format {
            ReportFormat::Plain => print!("{}", outcome.report),
            ReportFormat::Json => println!("{}", outcome.report.to_json()),
        }
    }
    if let Some(diff) = outcome.diff.as_deref() {
        print!("{diff}");
    }
    Ok(outcome.exit_code)
}

fn handle_blocks(config: &Config, args: BlocksArgs) -> Result<ExitCode> {
    let document = load_source(&args.source, args.manifest.as_deref(), config)?;
    let rendered =
        serde_json::to_string_pretty(&document).context("failed to serialise blocks")?;
    println!("{rendered}");
    Ok(ExitCode::Success)
}

fn handle_outline(config: &Config, args: OutlineArgs) -> Result<ExitCode> {
    let matcher = MarkerMatcher::new(&config.markers)?;
    let classifier = Classifier::new(&config.styles, &matcher);
    let docx = Docx::open(&args.target)?;
    print!("{}", render_outline(&docx, &classifier, !args.no_indices));
    Ok(ExitCode::Success)
}

#[derive(Parser)]
#[command(
    name = "manual-sync",
    author,
    version,
    about = "Synchronise manual content into a styled DOCX template"
)]
struct Cli {
    /// Configuration file overriding `.manual-sync.toml` discovery
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Patch source blocks into the target document
    Sync(SyncArgs),
    /// Print the blocks extracted from a source as JSON
    Blocks(BlocksArgs),
    /// Print the structure of a target document
    Outline(OutlineArgs),
}

#[derive(Args)]
struct SyncArgs {
    /// LaTeX manual; its directory anchors relative image paths
    #[arg(long, value_name = "PATH")]
    source: PathBuf,
    /// DOCX document to update
    #[arg(long, value_name = "PATH")]
    target: PathBuf,
    /// JSON block manifest read instead of the LaTeX source
    #[arg(long, value_name = "PATH")]
    manifest: Option<PathBuf>,
    /// Write the result here instead of over the target
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// Run every step except writing the result
    #[arg(long = "dry-run")]
    dry_run: bool,
    /// Print a unified diff of the document outline
    #[arg(long)]
    diff: bool,
    /// Report format (defaults to the configured one)
    #[arg(long, value_enum)]
    format: Option<FormatValue>,
    /// Copy the previous file to `<output>.bak` before overwriting
    #[arg(long)]
    backup: bool,
    /// Disable backup creation
    #[arg(long = "no-backup", conflicts_with = "backup")]
    no_backup: bool,
    /// Do not print the report (errors are still printed)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Args)]
struct BlocksArgs {
    /// LaTeX manual
    #[arg(long, value_name = "PATH")]
    source: PathBuf,
    /// JSON block manifest read instead of the LaTeX source
    #[arg(long, value_name = "PATH")]
    manifest: Option<PathBuf>,
}

#[derive(Args)]
struct OutlineArgs {
    /// DOCX document to describe
    #[arg(long, value_name = "PATH")]
    target: PathBuf,
    /// Leave out body element indices
    #[arg(long = "no-indices")]
    no_indices: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatValue {
    Plain,
    Json,
}

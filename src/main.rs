//! Command line interface for ferry.
//!
//! Every command works on one source folder; its progress lives in
//! `progress_{folder}.json` inside the configured progress directory.

mod commands;
mod error;

use clap::{Args, Parser, Subcommand};
use ferry_progress::FileStatus;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ferry", version, about = "Resumable media migration into an object store")]
struct Cli {
    /// Configuration file (default: config.{toml,yaml,json} in the platform config directory).
    #[arg(short, long, global = true, env = "FERRY_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Debug output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a folder and register new files without processing them.
    Scan(Folder),
    /// Show files whose names need a human to look at them.
    Review(Folder),
    /// Scan a folder, then migrate every file not finished yet.
    Migrate(MigrateArgs),
    /// Continue a previous migration without listing the folder again.
    Resume(ResumeArgs),
    /// Show file counts per status.
    Status(Folder),
    /// Write the files in one status to a JSON file.
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct Folder {
    /// Source folder id.
    folder: String,
}

#[derive(Args, Debug)]
struct MigrateArgs {
    #[command(flatten)]
    folder: Folder,

    /// Files processed at the same time (default: from configuration).
    #[arg(long)]
    concurrency: Option<usize>,

    /// Look identifiers up, but never download, upload or create anything.
    #[arg(long)]
    dry_run: bool,

    /// Treat files whose object is already linked as completed.
    #[arg(long)]
    skip_existing: bool,
}

#[derive(Args, Debug)]
struct ResumeArgs {
    #[command(flatten)]
    folder: Folder,

    /// Files processed at the same time (default: from configuration).
    #[arg(long)]
    concurrency: Option<usize>,

    /// Treat files whose object is already linked as completed.
    #[arg(long)]
    skip_existing: bool,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[command(flatten)]
    folder: Folder,

    /// Status of the files to export.
    #[arg(short, long, value_parser = parse_status)]
    status: FileStatus,

    /// File the records are written to.
    #[arg(short, long, value_name = "PATH")]
    output: PathBuf,
}

fn parse_status(value: &str) -> Result<FileStatus, String> {
    FileStatus::parse(value).ok_or_else(|| {
        let known: Vec<&str> = FileStatus::ALL.iter().map(FileStatus::as_str).collect();
        format!("unknown status `{value}`, expected one of: {}", known.join(", "))
    })
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "ferry=debug" } else { "ferry=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

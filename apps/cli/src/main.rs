mod config;
mod format;
mod progress;

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    time::Duration,
};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use client_core::{
    spawn_access_record, BackendClient, CompressorSession, ConfigError, FlowError, FlowState,
    SelectionError, StatsError,
};
use shared::error::ErrorCategory;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::{config::Settings, format::format_file_size};

/// How long an unfinished access record may hold up exit.
const ACCESS_RECORD_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "image-compressor", version, about = "Compress images through the compression backend")]
struct Cli {
    /// Overrides the configured backend base URL.
    #[arg(long, global = true)]
    backend_url: Option<String>,
    /// Config file; defaults to ./image-compressor.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compress images into an archive and optionally email it.
    Compress {
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// File or directory to save the archive to.
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Mail the archive to this address once it is ready.
        #[arg(long)]
        email: Option<String>,
    },
    /// Show the daily usage table.
    Stats,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let category = category_of(&err);
            eprintln!("{}: {err:#}", report_label(category));
            ExitCode::from(exit_code(category))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = config::load_settings(cli.config.as_deref())?;
    if let Some(url) = cli.backend_url {
        settings.backend_url = url;
    }
    let backend = BackendClient::new(&settings.backend_url)?;
    info!(backend = %backend.base_url(), "cli: using backend");

    let access = settings
        .record_access
        .then(|| spawn_access_record(backend.clone()));

    let result = match cli.command {
        Command::Compress { images, out, email } => {
            run_compress(backend, &settings, &images, &out, email.as_deref()).await
        }
        Command::Stats => run_stats(&backend).await,
    };

    if let Some(handle) = access {
        settle_access_record(handle, ACCESS_RECORD_GRACE).await;
    }
    result
}

/// Returns true when the record finished within `grace`.
async fn settle_access_record(handle: JoinHandle<()>, grace: Duration) -> bool {
    if tokio::time::timeout(grace, handle).await.is_err() {
        debug!("telemetry: access record still pending at exit, abandoning it");
        return false;
    }
    true
}

fn category_of(err: &anyhow::Error) -> Option<ErrorCategory> {
    if let Some(err) = err.downcast_ref::<FlowError>() {
        return Some(err.category());
    }
    if let Some(err) = err.downcast_ref::<SelectionError>() {
        return Some(err.category());
    }
    if let Some(err) = err.downcast_ref::<StatsError>() {
        return Some(err.category());
    }
    err.downcast_ref::<ConfigError>().map(ConfigError::category)
}

fn report_label(category: Option<ErrorCategory>) -> &'static str {
    match category {
        Some(ErrorCategory::Validation) => "invalid input",
        Some(ErrorCategory::Submission) => "request failed",
        Some(ErrorCategory::Polling) => "task abandoned",
        Some(ErrorCategory::Telemetry) => "usage statistics unavailable",
        None => "error",
    }
}

/// Input problems exit with 2, like a clap usage error; everything else with 1.
fn exit_code(category: Option<ErrorCategory>) -> u8 {
    match category {
        Some(ErrorCategory::Validation) => 2,
        _ => 1,
    }
}

async fn run_compress(
    backend: BackendClient,
    settings: &Settings,
    images: &[PathBuf],
    out: &Path,
    email: Option<&str>,
) -> Result<()> {
    let session = CompressorSession::new(backend, settings.session_options());
    session.load_images(images).await?;
    let snapshot = session.snapshot();
    for image in &snapshot.images {
        println!("  {}  {}", image.name, format_file_size(image.size));
    }
    println!(
        "{} image(s), {} total",
        snapshot.images.len(),
        format_file_size(snapshot.total_bytes)
    );

    let printer = progress::spawn_printer(session.subscribe_events());
    let outcome = drive(&session, out, email).await;
    // Dropping the session closes the event channel; the printer drains and exits.
    drop(session);
    let _ = printer.await;
    outcome
}

async fn drive(session: &CompressorSession, out: &Path, email: Option<&str>) -> Result<()> {
    match session.compress().await? {
        FlowState::Succeeded => {}
        FlowState::Failed { reason } => bail!("compression failed: {reason}"),
        FlowState::TimedOut => bail!("compression timed out; please try again later"),
        other => bail!("compression ended in an unexpected state: {other:?}"),
    }

    let saved = session.save_archive(out).await?;
    println!("saved archive to {}", saved.display());

    let Some(address) = email else {
        return Ok(());
    };
    match session.send_email(address).await? {
        FlowState::Succeeded => {
            let confirmation = session.email_confirmation().unwrap_or_default();
            println!("{confirmation}");
            Ok(())
        }
        FlowState::Failed { reason } => bail!("email failed: {reason}"),
        FlowState::TimedOut => bail!("email timed out; please try again later"),
        other => bail!("email ended in an unexpected state: {other:?}"),
    }
}

async fn run_stats(backend: &BackendClient) -> Result<()> {
    let stats = backend.daily_stats().await?;
    if stats.is_empty() {
        println!("no usage data yet");
        return Ok(());
    }

    println!("{:<8} {:>8}", "day", "visits");
    for stat in &stats {
        println!("{:<8} {:>8}", stat.short_label(), stat.count);
    }
    let total: u64 = stats.iter().map(|stat| stat.count).sum();
    println!("{:<8} {:>8}", "total", total);
    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;

//! CLI entry point for the dirmirror tool.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use dirmirror_core::{
    Exporter, FileConfig, ProcessExit, determine_exit_outcome, remove_scheme_dirs,
};
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let file_config = match args.config.as_deref() {
        Some(path) => Some(FileConfig::load(path)?),
        None => FileConfig::load_default()?.map(|(_, config)| config),
    };
    let settings = args.resolve(file_config.as_ref())?;

    init_tracing(settings.export.silent(), args.verbose);

    debug!(?args, "CLI arguments parsed");
    info!(
        budget = settings.export.budget(),
        schedule = settings.export.schedule().as_str(),
        "dirmirror starting"
    );

    let exporter = Exporter::new(settings.export.clone())?;
    let summary = exporter
        .export(&args.export, &args.target)
        .await
        .with_context(|| format!("Failed to export '{}'", args.export))?;

    if settings.skip_cleanup {
        debug!("cleanup pass skipped");
    } else {
        let target = args.target.clone();
        let report = tokio::task::spawn_blocking(move || remove_scheme_dirs(&target))
            .await
            .context("Cleanup pass panicked")?;
        debug!(
            removed = report.removed.len(),
            failed = report.failed.len(),
            "cleanup pass finished"
        );
    }

    let exit = determine_exit_outcome(
        summary.completed,
        summary.failure_count(),
        settings.export.max_failures(),
    );
    if exit != ProcessExit::Success {
        warn!(
            failures = summary.failure_count(),
            max_failures = settings.export.max_failures(),
            "failure threshold exceeded"
        );
    }

    println!("Done! Export completed to: {}", args.target.display());
    Ok(exit.into())
}

/// Installs the stdout subscriber.
///
/// Priority: silent flag > RUST_LOG env var > verbose flag > default (info).
fn init_tracing(silent: bool, verbose: u8) {
    let filter = if silent {
        tracing_subscriber::EnvFilter::new("off")
    } else {
        let default_level = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level))
    };

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

mod cli;
mod telemetry;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use bulkcopy_core::config::load_dotenv;
use bulkcopy_core::{EngineTuning, MigrationConfig, MigrationError};
use bulkcopy_migration::{dry_run, AwsClients, Migration};

use crate::cli::{Cli, Command, DryRunArgs, RunArgs};

#[tokio::main]
async fn main() -> ExitCode {
    load_dotenv();
    let _log_guard = telemetry::init();

    let cli = Cli::parse();
    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let class = e
                .downcast_ref::<MigrationError>()
                .map(MigrationError::class)
                .unwrap_or("internal");
            error!(class, error = %format!("{e:#}"), "bulk-copy failed");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let tuning = EngineTuning::from_env();
    match cli.command {
        Command::Run(args) => run(args, tuning).await,
        Command::DryRun(args) => preflight(args, tuning).await,
    }
}

async fn run(args: RunArgs, tuning: EngineTuning) -> Result<()> {
    let config =
        MigrationConfig::from_args(args.migration_args(), tuning).context("invalid arguments")?;
    let clients = AwsClients::for_region(&config.region).await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown signal received, cancelling migration");
        trigger.cancel();
    });

    let report = Migration::new(&clients.store, &clients.jobs)
        .with_cancellation(cancel)
        .run(&config)
        .await
        .context("migration failed")?;

    info!(
        manifest = %report.manifest.key,
        plan = ?report.plan,
        jobs = report.jobs.len(),
        success_ratio = ?report.success_ratio,
        "bulk-copy finished"
    );
    Ok(())
}

async fn preflight(args: DryRunArgs, tuning: EngineTuning) -> Result<()> {
    let config =
        MigrationConfig::from_args(args.migration_args(), tuning).context("invalid arguments")?;
    let clients = AwsClients::for_region(&config.region).await;

    let report = dry_run(&clients.store, &config, args.local_inventory.as_deref())
        .await
        .context("dry run failed")?;
    report.log();
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl_c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}

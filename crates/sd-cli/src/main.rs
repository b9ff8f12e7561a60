//! ssh-deploy CLI
//!
//! Exit status: 0 when every host succeeded, 1 when any host failed,
//! 2 when the job could not be built and nothing was attempted.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sd_core::config::DeployConfig;
use sd_core::{ConfigError, DeploymentJob};
use sd_deploy::Orchestrator;
use ssh_deploy::cli::Args;
use ssh_deploy::output::{format_results, format_summary, print_error, print_event, print_warning};

const EXIT_HOST_FAILED: u8 = 1;
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_filter().into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let (job, config) = match prepare(&args) {
        Ok(prepared) => prepared,
        Err(e) => {
            print_error(&e.to_string());
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if !config.verify_host_key {
        tracing::warn!("Host key verification is disabled; any server key is accepted");
    }

    match deploy(&args, job, config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_HOST_FAILED),
        Err(e) => {
            print_error(&format!("{:#}", e));
            ExitCode::from(EXIT_HOST_FAILED)
        }
    }
}

/// Validate everything before any packaging or network activity
fn prepare(args: &Args) -> Result<(DeploymentJob, DeployConfig), ConfigError> {
    let job = DeploymentJob::from_inputs(args.job_inputs()?)?;
    let config = args.deploy_config()?;
    tracing::debug!(?job, "Job validated");
    Ok((job, config))
}

/// Run the job; returns whether every host succeeded
async fn deploy(args: &Args, job: DeploymentJob, config: DeployConfig) -> Result<bool> {
    let (tx, mut rx) = mpsc::channel(64);
    let quiet_progress = args.json;

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if !quiet_progress {
                print_event(&event);
            }
        }
    });

    let orchestrator = Orchestrator::ssh(&job, config).with_events(tx);
    let outcome = orchestrator.run(&job).await;
    // closes the event channel
    drop(orchestrator);
    printer.await.context("Progress printer failed")?;

    if args.json {
        let json = serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?;
        println!("{}", json);
    } else {
        println!();
        println!("{}", format_results(&outcome));
        println!("{}", format_summary(&outcome));
        if !outcome.is_success() {
            print_warning(&format!("{} host(s) failed", outcome.failed().count()));
        }
    }

    Ok(outcome.is_success())
}

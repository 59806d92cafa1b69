//! Command routing and execution
//!
//! This module handles routing CLI commands to their respective implementations.

use crate::batch::{effective_concurrency, plan, resolve_concurrency};
use crate::cli::args::Commands;
use crate::config::{RunArgs, RunnerConfig, SubmitArgs};
use crate::runner::PipelineRunner;
use crate::server::{PipelineSubmitter, SubmitRequest};
use crate::subprocess::SubprocessManager;
use anyhow::{Context, Result};
use clap::CommandFactory;
use tracing::{info, warn};

/// Execute a CLI command based on the parsed arguments
pub async fn execute_command(command: Option<Commands>) -> Result<()> {
    match command {
        Some(Commands::Run(args)) => run_pipeline(*args).await,
        Some(Commands::Plan {
            units,
            number_threads,
        }) => print_plan(units, number_threads),
        Some(Commands::Submit(args)) => submit_pipeline(*args).await,
        None => {
            crate::cli::Cli::command().print_help()?;
            Ok(())
        }
    }
}

async fn run_pipeline(args: RunArgs) -> Result<()> {
    let config = RunnerConfig::from_args(args).context("Invalid run configuration")?;
    let processes = SubprocessManager::production(config.settings.spawn_retry_delay());
    let runner = PipelineRunner::new(config, processes.runner())?;

    let report = runner.run().await?;

    if report.failed_workers() > 0 {
        warn!(
            "{} of {} simulations failed",
            report.failed_workers(),
            report.total_units
        );
    }
    match &report.outputs {
        Some(outputs) => {
            info!("Final bias measurements: {}", outputs.measurements);
            if let Some(residuals) = &outputs.residuals {
                info!("Calibration residuals: {}", residuals);
            }
        }
        None => info!("Shear estimated for {} simulations", report.total_units),
    }
    info!("Execution complete.");
    Ok(())
}

fn print_plan(units: usize, number_threads: usize) -> Result<()> {
    let concurrency = effective_concurrency(resolve_concurrency(number_threads), units);
    let batches = plan(units, concurrency)?;

    println!(
        "{} simulations, {} workers, {} batches",
        units,
        concurrency,
        batches.len()
    );
    println!("{:>6} {:>8} {:>8} {:>8}", "batch", "min", "max", "workers");
    for batch in &batches {
        println!(
            "{:>6} {:>8} {:>8} {:>8}",
            batch.batch_number, batch.min_index, batch.max_index, batch.worker_count
        );
    }
    Ok(())
}

async fn submit_pipeline(args: SubmitArgs) -> Result<()> {
    let request = SubmitRequest::from_args(args).context("Invalid submission")?;
    let processes = SubprocessManager::production(request.settings.spawn_retry_delay());

    let run = PipelineSubmitter::new(processes.runner())
        .submit(&request)
        .await?;

    info!(
        "Submitted {} to {} with ISF {}",
        request.pipeline,
        request.server_url,
        run.path.display()
    );
    Ok(())
}

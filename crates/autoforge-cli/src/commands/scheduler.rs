//! Scheduled and one-shot pipeline runs.

use anyhow::{Context, Result, bail};
use autoforge_config::{ScheduleConfig, SystemConfig};
use autoforge_core::backend::BuildBackend;
use autoforge_core::run::RunOutcome;
use autoforge_scheduler::RunScheduler;
use tracing::info;

use super::{Services, cancel_on_interrupt, print_run};

fn scheduler(config: &SystemConfig, services: &Services) -> Result<RunScheduler> {
    let schedule = ScheduleConfig::load(config.schedule_file.as_deref(), config.timezone)
        .context("Failed to load schedule")?;
    Ok(RunScheduler::new(
        schedule,
        services.coordinator.clone(),
        services.probe.clone(),
    ))
}

/// Check the backend and credentials, then run the pipeline once. Ctrl-C
/// abandons the run, which is still journaled.
pub async fn run_once(config: SystemConfig) -> Result<()> {
    config.require_credentials()?;
    let services = Services::build(&config)?;

    let healthy = services
        .backend
        .health()
        .await
        .context("Backend health check failed")?;
    if !healthy {
        bail!("Backend at {} is not healthy", config.backend.base_url);
    }

    let scheduler = scheduler(&config, &services)?;
    cancel_on_interrupt(scheduler.cancellation_token());
    let run = scheduler.run_once().await;
    print_run(&run);

    if run.outcome == RunOutcome::Failed {
        bail!("Pipeline run failed");
    }
    Ok(())
}

/// Run until Ctrl-C.
pub async fn run_daemon(config: SystemConfig) -> Result<()> {
    config.require_credentials()?;
    let services = Services::build(&config)?;
    let mut scheduler = scheduler(&config, &services)?;

    let history = services
        .coordinator
        .journal()
        .load()
        .await
        .context("Failed to read run history")?;
    info!(
        runs = history.runs,
        built = history.built.len(),
        last_run = ?history.last_run,
        "Loaded run history"
    );

    println!("Scheduled jobs:");
    for entry in scheduler.entries() {
        let next = entry
            .next_fire_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {:<22} {:<18} {:<8} next: {}",
            entry.job_name,
            entry.cron_spec,
            entry.kind.to_string(),
            next
        );
    }

    scheduler.start();
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    scheduler.shutdown().await;
    Ok(())
}

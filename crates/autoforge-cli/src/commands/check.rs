//! Environment check.

use anyhow::{Result, bail};
use autoforge_config::{ScheduleConfig, SystemConfig};
use autoforge_core::backend::BuildBackend;

use super::Services;

pub async fn run(config: &SystemConfig) -> Result<()> {
    let services = Services::build(config)?;
    let mut problems = 0;

    println!("Backend:   {}", config.backend.base_url);
    match services.backend.health().await {
        Ok(true) => println!("  ✓ healthy"),
        Ok(false) => {
            problems += 1;
            println!("  ✗ not healthy");
        }
        Err(e) => {
            problems += 1;
            println!("  ✗ {}", e);
        }
    }

    println!("GitHub:");
    if config.github.token.is_some() {
        match services.publisher.authenticated_user().await {
            Ok(login) => println!("  ✓ authenticated as {}", login),
            Err(e) => {
                problems += 1;
                println!("  ✗ {}", e);
            }
        }
    } else {
        problems += 1;
        println!("  ✗ GITHUB_TOKEN not set");
    }

    println!("Model API key:");
    if config.llm_api_key.is_some() {
        println!("  ✓ set");
    } else {
        problems += 1;
        println!("  ✗ API_KEY not set");
    }

    println!("Notion:");
    match &config.notion {
        Some(notion) => println!("  ✓ database {}", notion.database_id),
        None => println!("  - not configured, ideas are not tracked"),
    }

    println!("Schedule ({}):", config.timezone);
    match ScheduleConfig::load(config.schedule_file.as_deref(), config.timezone) {
        Ok(schedule) => {
            for job in &schedule.jobs {
                println!("  ✓ {} \"{}\" ({})", job.name, job.cron.as_str(), job.kind);
            }
        }
        Err(e) => {
            problems += 1;
            println!("  ✗ {}", e);
        }
    }

    match services.coordinator.journal().load().await {
        Ok(history) => println!(
            "History:   {} runs, {} ideas built, last run {}",
            history.runs,
            history.built.len(),
            history
                .last_run
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string())
        ),
        Err(e) => {
            problems += 1;
            println!("History:   ✗ {}", e);
        }
    }

    if problems > 0 {
        bail!("{} check(s) failed", problems);
    }
    println!("All checks passed.");
    Ok(())
}

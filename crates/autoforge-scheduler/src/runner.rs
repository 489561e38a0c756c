//! Cron-driven run scheduler.
//!
//! Every scheduled job gets its own task that sleeps until the job's next
//! fire time. Develop jobs share one [`PipelineCoordinator`]; a trigger that
//! fires while a run is in flight is skipped, not queued.

use autoforge_config::{JobKind, ScheduleConfig, ScheduledJob};
use autoforge_core::run::PipelineRun;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::coordinator::PipelineCoordinator;
use crate::health::HealthProbe;

/// Trigger name of runs started on demand.
pub const MANUAL_TRIGGER: &str = "manual";

/// A scheduled job and when it fires next.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub job_name: String,
    pub cron_spec: String,
    pub kind: JobKind,
    /// Absent when the expression never matches again.
    pub next_fire_time: Option<DateTime<Tz>>,
}

pub struct RunScheduler {
    schedule: ScheduleConfig,
    coordinator: Arc<PipelineCoordinator>,
    probe: Arc<HealthProbe>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl RunScheduler {
    pub fn new(
        schedule: ScheduleConfig,
        coordinator: Arc<PipelineCoordinator>,
        probe: Arc<HealthProbe>,
    ) -> Self {
        Self {
            schedule,
            coordinator,
            probe,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    pub fn entries(&self) -> Vec<ScheduleEntry> {
        self.entries_at(Utc::now())
    }

    pub fn entries_at(&self, now: DateTime<Utc>) -> Vec<ScheduleEntry> {
        self.schedule
            .jobs
            .iter()
            .map(|job| ScheduleEntry {
                job_name: job.name.clone(),
                cron_spec: job.cron.as_str().to_string(),
                kind: job.kind,
                next_fire_time: next_fire(job, self.schedule.timezone, now),
            })
            .collect()
    }

    /// Spawn one task per scheduled job.
    pub fn start(&mut self) {
        if !self.tasks.is_empty() {
            warn!("Scheduler already started");
            return;
        }

        for job in &self.schedule.jobs {
            info!(job = %job.name, cron = %job.cron.as_str(), kind = %job.kind, "Scheduling job");
            self.tasks.push(tokio::spawn(trigger_loop(
                job.clone(),
                self.schedule.timezone,
                self.coordinator.clone(),
                self.probe.clone(),
                self.cancel.clone(),
            )));
        }
        info!(jobs = self.tasks.len(), timezone = %self.schedule.timezone, "Scheduler started");
    }

    /// Run the pipeline once now, waiting for any run already in flight.
    pub async fn run_once(&self) -> PipelineRun {
        self.coordinator.run_once(MANUAL_TRIGGER, &self.cancel).await
    }

    /// Token fired by [`RunScheduler::shutdown`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop every trigger and wait for in-flight work to wind down.
    pub async fn shutdown(mut self) {
        info!("Scheduler shutting down");
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!(error = %e, "Trigger task ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }
}

fn next_fire(job: &ScheduledJob, tz: Tz, after: DateTime<Utc>) -> Option<DateTime<Tz>> {
    job.cron.next_after(&after.with_timezone(&tz))
}

async fn trigger_loop(
    job: ScheduledJob,
    tz: Tz,
    coordinator: Arc<PipelineCoordinator>,
    probe: Arc<HealthProbe>,
    cancel: CancellationToken,
) {
    let mut after = Utc::now();

    loop {
        let Some(next) = next_fire(&job, tz, after) else {
            warn!(job = %job.name, cron = %job.cron.as_str(), "Job never fires again");
            return;
        };
        let next = next.with_timezone(&Utc);
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        debug!(job = %job.name, next = %next.with_timezone(&tz), "Waiting for next fire time");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = sleep(wait) => {}
        }

        info!(job = %job.name, kind = %job.kind, "Trigger fired");
        match job.kind {
            JobKind::Develop => {
                if coordinator.try_run_once(&job.name, &cancel).await.is_none() {
                    warn!(job = %job.name, "Pipeline run already in flight, skipping trigger");
                }
            }
            JobKind::Health => {
                probe.run().await;
            }
        }

        // A run can outlast several fire times; those are skipped, not replayed.
        after = next.max(Utc::now());
    }
}

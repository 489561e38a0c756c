//! CLI command implementations.

pub mod check;
pub mod develop;
pub mod discover;
pub mod scheduler;

use anyhow::{Context, Result};
use autoforge_backend::{ChatDevBackend, LogActiveSessionCounter};
use autoforge_config::catalog::load_catalog;
use autoforge_config::SystemConfig;
use autoforge_core::collaborator::IdeaTracker;
use autoforge_core::run::{PipelineRun, RunOutcome};
use autoforge_publisher::{GitHubPublisher, NoopTracker, NotionTracker};
use autoforge_scheduler::{
    AdmissionController, CatalogDiscoverer, HealthProbe, HistoryJournal, PipelineCoordinator,
    SessionOrchestrator,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Concrete pipeline wired from the system configuration.
pub struct Services {
    pub backend: Arc<ChatDevBackend>,
    pub publisher: Arc<GitHubPublisher>,
    pub coordinator: Arc<PipelineCoordinator>,
    pub probe: Arc<HealthProbe>,
}

impl Services {
    pub fn build(config: &SystemConfig) -> Result<Self> {
        let backend = Arc::new(
            ChatDevBackend::new(&config.backend).context("Failed to set up backend client")?,
        );
        let publisher = Arc::new(
            GitHubPublisher::new(&config.github, config.http_timeout)
                .context("Failed to set up GitHub client")?,
        );
        let tracker: Arc<dyn IdeaTracker> = match &config.notion {
            Some(notion) => Arc::new(
                NotionTracker::new(notion, config.http_timeout)
                    .context("Failed to set up Notion client")?,
            ),
            None => Arc::new(NoopTracker),
        };

        let counter = Arc::new(LogActiveSessionCounter::new(config.backend_log_file()));
        let coordinator = PipelineCoordinator::new(
            Arc::new(discoverer(config)?),
            AdmissionController::new(counter, config.admission.max_active_sessions),
            SessionOrchestrator::new(backend.clone(), &config.backend),
            publisher.clone(),
            tracker,
            HistoryJournal::new(config.history_file()),
            &config.admission,
        );
        let probe = HealthProbe::new(
            backend.clone(),
            publisher.clone(),
            config.llm_api_key.is_some(),
            config.health_log_file(),
        );

        Ok(Self {
            backend,
            publisher,
            coordinator: Arc::new(coordinator),
            probe: Arc::new(probe),
        })
    }
}

/// Built-in pool, the configured catalog and the history journal.
pub fn discoverer(config: &SystemConfig) -> Result<CatalogDiscoverer> {
    let mut discoverer = CatalogDiscoverer::builtin()?;
    if let Some(path) = &config.ideas_file {
        let ideas = load_catalog(path)
            .with_context(|| format!("Failed to load idea catalog: {}", path.display()))?;
        discoverer = discoverer.with_catalog(ideas);
    }
    Ok(discoverer.with_history(HistoryJournal::new(config.history_file())))
}

/// Token cancelled on Ctrl-C.
pub fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    cancel_on_interrupt(token.clone());
    token
}

/// Cancel `token` on Ctrl-C so in-flight sessions are abandoned and journaled.
pub fn cancel_on_interrupt(token: CancellationToken) -> JoinHandle<()> {
    cancel_when(
        async {
            let interrupted = tokio::signal::ctrl_c().await.is_ok();
            if interrupted {
                tracing::info!("Interrupted, abandoning in-flight work");
            }
            interrupted
        },
        token,
    )
}

/// Cancel `token` once `signal` resolves to `true`.
fn cancel_when<F>(signal: F, token: CancellationToken) -> JoinHandle<()>
where
    F: Future<Output = bool> + Send + 'static,
{
    tokio::spawn(async move {
        if signal.await {
            token.cancel();
        }
    })
}

pub fn print_run(run: &PipelineRun) {
    let idea = run.idea.as_ref().map(|i| i.name.as_str()).unwrap_or("-");
    let mark = match run.outcome {
        RunOutcome::Success => "✓",
        RunOutcome::Failed => "✗",
        RunOutcome::Skipped => "⊘",
    };

    println!("{} Run {} ({}): {}", mark, run.id, run.trigger, run.outcome);
    println!("  Idea:     {}", idea);
    if let Some(session) = &run.session {
        println!(
            "  Session:  {} [{}] {} agent steps, {:.0}s",
            session.session_id.as_deref().unwrap_or("-"),
            session.state,
            session.agent_steps,
            session.execution_seconds
        );
    }
    if !run.artifacts.is_empty() {
        println!("  Files:    {}", run.artifacts.len());
    }
    if let Some(url) = &run.github_url {
        println!("  URL:      {}", url);
    }
    if let (Some(step), Some(reason)) = (run.failed_step, &run.reason) {
        println!("  Failed:   {} - {}", step, reason);
    } else if let Some(reason) = &run.reason {
        println!("  Reason:   {}", reason);
    }
    println!("  Duration: {:.1}s", run.duration_seconds);
}

//! One pipeline run: discover, admit, build, publish, record.

use autoforge_config::AdmissionConfig;
use autoforge_core::collaborator::{Discoverer, IdeaStatus, IdeaTracker, Publisher};
use autoforge_core::run::{PendingRun, PipelineRun, RunOutcome, RunStep};
use autoforge_core::{Error, Idea};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::admission::AdmissionController;
use crate::history::HistoryJournal;
use crate::orchestrator::SessionOrchestrator;

/// Sequences pipeline runs. Only one run executes at a time.
pub struct PipelineCoordinator {
    discoverer: Arc<dyn Discoverer>,
    admission: AdmissionController,
    orchestrator: SessionOrchestrator,
    publisher: Arc<dyn Publisher>,
    tracker: Arc<dyn IdeaTracker>,
    journal: HistoryJournal,
    max_wait: Duration,
    poll_interval: Duration,
    run_lock: Mutex<()>,
}

impl PipelineCoordinator {
    pub fn new(
        discoverer: Arc<dyn Discoverer>,
        admission: AdmissionController,
        orchestrator: SessionOrchestrator,
        publisher: Arc<dyn Publisher>,
        tracker: Arc<dyn IdeaTracker>,
        journal: HistoryJournal,
        config: &AdmissionConfig,
    ) -> Self {
        Self {
            discoverer,
            admission,
            orchestrator,
            publisher,
            tracker,
            journal,
            max_wait: config.max_wait,
            poll_interval: config.poll_interval,
            run_lock: Mutex::new(()),
        }
    }

    pub fn journal(&self) -> &HistoryJournal {
        &self.journal
    }

    /// Execute one run, waiting for any run already in flight.
    pub async fn run_once(&self, trigger: &str, cancel: &CancellationToken) -> PipelineRun {
        let _guard = self.run_lock.lock().await;
        self.discover_and_build(trigger, cancel).await
    }

    /// Execute one run unless another is in flight.
    pub async fn try_run_once(&self, trigger: &str, cancel: &CancellationToken) -> Option<PipelineRun> {
        let _guard = self.run_lock.try_lock().ok()?;
        Some(self.discover_and_build(trigger, cancel).await)
    }

    /// Build a given idea, skipping discovery.
    pub async fn run_idea(&self, idea: Idea, trigger: &str, cancel: &CancellationToken) -> PipelineRun {
        let _guard = self.run_lock.lock().await;
        let pending = PendingRun::start(trigger);
        info!(run_id = %pending.id(), trigger, idea = %idea.name, "Pipeline run started");
        let run = self.build_and_publish(pending, idea, cancel).await;
        self.finish(run).await
    }

    async fn discover_and_build(&self, trigger: &str, cancel: &CancellationToken) -> PipelineRun {
        let pending = PendingRun::start(trigger);
        info!(run_id = %pending.id(), trigger, "Pipeline run started");

        let run = match self.discoverer.discover(1).await {
            Err(e) => pending.fail(RunStep::Discovery, &e),
            Ok(ideas) => match ideas.into_iter().next() {
                None => pending.skip("no ideas discovered"),
                Some(idea) => self.build_and_publish(pending, idea, cancel).await,
            },
        };
        self.finish(run).await
    }

    async fn build_and_publish(
        &self,
        mut pending: PendingRun,
        idea: Idea,
        cancel: &CancellationToken,
    ) -> PipelineRun {
        info!(run_id = %pending.id(), idea = %idea.name, priority = %idea.priority, "Selected idea");
        pending.set_idea(idea.clone());
        let tracker_id = self.record_idea(&idea).await;

        let admitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            admitted = self.admission.acquire_slot(self.max_wait, self.poll_interval) => Some(admitted),
        };
        match admitted {
            Some(true) => {}
            Some(false) => {
                self.update_tracker(tracker_id.as_deref(), IdeaStatus::Failed, None).await;
                let e = Error::Timeout(format!(
                    "no capacity: backend stayed busy for {}s",
                    self.max_wait.as_secs()
                ));
                return pending.fail(RunStep::Admission, &e);
            }
            None => {
                self.update_tracker(tracker_id.as_deref(), IdeaStatus::Failed, None).await;
                let e = Error::Cancelled("shut down while waiting for admission".to_string());
                return pending.fail(RunStep::Admission, &e);
            }
        }

        self.update_tracker(tracker_id.as_deref(), IdeaStatus::InProgress, None).await;

        let result = self.orchestrator.develop(&idea, cancel).await;
        pending.set_build(&result);
        if !result.is_success() {
            self.update_tracker(tracker_id.as_deref(), IdeaStatus::Failed, None).await;
            let e = result
                .error
                .unwrap_or_else(|| Error::Internal(format!("session ended {}", result.state)));
            return pending.fail(RunStep::Build, &e);
        }

        match self.publisher.publish(&idea, &result.files).await {
            Ok(location) => {
                info!(idea = %idea.name, url = %location.url, "Published");
                self.update_tracker(tracker_id.as_deref(), IdeaStatus::Completed, Some(&location.url))
                    .await;
                pending.set_published(location);
                pending.succeed()
            }
            Err(e) => {
                self.update_tracker(tracker_id.as_deref(), IdeaStatus::Failed, None).await;
                pending.fail(RunStep::Publish, &e)
            }
        }
    }

    async fn finish(&self, run: PipelineRun) -> PipelineRun {
        if let Err(e) = self.journal.append(&run).await {
            error!(run_id = %run.id, error = %e, "Failed to append run to history");
        }

        let idea = run.idea.as_ref().map(|i| i.name.as_str()).unwrap_or("-");
        match run.outcome {
            RunOutcome::Success => info!(
                run_id = %run.id,
                idea,
                url = run.github_url.as_deref().unwrap_or("-"),
                duration_secs = run.duration_seconds,
                "Pipeline run succeeded"
            ),
            RunOutcome::Skipped => info!(
                run_id = %run.id,
                reason = run.reason.as_deref().unwrap_or("-"),
                "Pipeline run skipped"
            ),
            RunOutcome::Failed => error!(
                run_id = %run.id,
                idea,
                step = ?run.failed_step,
                reason = run.reason.as_deref().unwrap_or("-"),
                "Pipeline run failed"
            ),
        }
        run
    }

    async fn record_idea(&self, idea: &Idea) -> Option<String> {
        match self.tracker.record_idea(idea).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(idea = %idea.name, error = %e, "Could not record idea in tracker");
                None
            }
        }
    }

    async fn update_tracker(&self, id: Option<&str>, status: IdeaStatus, url: Option<&str>) {
        let Some(id) = id else { return };
        if let Err(e) = self.tracker.update_status(id, status, url).await {
            warn!(tracker_id = id, %status, error = %e, "Could not update idea status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use autoforge_config::BackendConfig;
    use autoforge_core::SessionState;
    use autoforge_core::backend::ActiveSessionCounter;

    struct Fixture {
        coordinator: PipelineCoordinator,
        backend: Arc<ScriptedBackend>,
        discoverer: Arc<FakeDiscoverer>,
        publisher: Arc<CountingPublisher>,
        tracker: Arc<RecordingTracker>,
        _dir: tempfile::TempDir,
    }

    struct Setup {
        script: Vec<Step>,
        discoverer: FakeDiscoverer,
        counter: ScriptedCounter,
        publisher: CountingPublisher,
        tracker: RecordingTracker,
    }

    impl Default for Setup {
        fn default() -> Self {
            Self {
                script: vec![connected("3f2a-01"), started(), completed(&["cli.py"])],
                discoverer: FakeDiscoverer::with(vec![scanner()]),
                counter: ScriptedCounter::idle(),
                publisher: CountingPublisher::succeeding(),
                tracker: RecordingTracker::default(),
            }
        }
    }

    fn scanner() -> Idea {
        Idea::new(
            "secrets-leak-scanner",
            "Scan code repositories for accidentally committed secrets and API keys",
        )
        .unwrap()
    }

    fn backend_config() -> BackendConfig {
        BackendConfig {
            base_url: "http://localhost:6400".parse().unwrap(),
            workflow_id: "ChatDev_v1.yaml".to_string(),
            log_level: "info".to_string(),
            log_file: None,
            handshake_timeout: Duration::from_secs(10),
            monitor_ceiling: Duration::from_secs(4 * 3600),
            health_timeout: Duration::from_secs(5),
        }
    }

    fn fixture(setup: Setup) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new(setup.script));
        let discoverer = Arc::new(setup.discoverer);
        let publisher = Arc::new(setup.publisher);
        let tracker = Arc::new(setup.tracker);
        let counter: Arc<dyn ActiveSessionCounter> = Arc::new(setup.counter);

        let coordinator = PipelineCoordinator::new(
            discoverer.clone(),
            AdmissionController::new(counter, 1),
            SessionOrchestrator::new(backend.clone(), &backend_config()),
            publisher.clone(),
            tracker.clone(),
            HistoryJournal::new(dir.path().join("project_history.jsonl")),
            &AdmissionConfig {
                max_active_sessions: 1,
                max_wait: Duration::from_secs(300),
                poll_interval: Duration::from_secs(30),
            },
        );

        Fixture {
            coordinator,
            backend,
            discoverer,
            publisher,
            tracker,
            _dir: dir,
        }
    }

    async fn run(f: &Fixture) -> PipelineRun {
        f.coordinator
            .run_once("daily_development", &CancellationToken::new())
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_run() {
        let f = fixture(Setup::default());
        let run = run(&f).await;

        assert_eq!(run.outcome, RunOutcome::Success);
        assert_eq!(run.trigger, "daily_development");
        assert_eq!(run.idea.as_ref().unwrap().name, "secrets-leak-scanner");
        assert_eq!(
            run.github_url.as_deref(),
            Some("https://github.com/acme/secrets-leak-scanner")
        );
        assert_eq!(run.artifacts.keys().collect::<Vec<_>>(), vec!["cli.py"]);
        assert_eq!(run.session.as_ref().unwrap().state, SessionState::Completed);

        assert_eq!(f.publisher.calls(), 1);
        assert!(f.publisher.published()[0].contains_key("cli.py"));
        assert_eq!(
            f.tracker.statuses(),
            vec![
                IdeaStatus::Discovered,
                IdeaStatus::InProgress,
                IdeaStatus::Completed
            ]
        );
        assert_eq!(
            f.tracker.last_url().as_deref(),
            Some("https://github.com/acme/secrets-leak-scanner")
        );

        let history = f.coordinator.journal().runs().await.unwrap();
        assert_eq!(history, vec![run]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_error_never_publishes() {
        let f = fixture(Setup {
            script: vec![connected("s-1"), started(), backend_error("quota exceeded")],
            ..Default::default()
        });
        let run = run(&f).await;

        assert_eq!(run.outcome, RunOutcome::Failed);
        assert_eq!(run.failed_step, Some(RunStep::Build));
        assert!(run.reason.as_deref().unwrap().contains("quota exceeded"));
        assert_eq!(f.publisher.calls(), 0);
        assert_eq!(f.tracker.statuses().last(), Some(&IdeaStatus::Failed));
        assert_eq!(f.backend.probe().closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_failure_keeps_artifacts() {
        let f = fixture(Setup {
            publisher: CountingPublisher::failing("403 Forbidden"),
            ..Default::default()
        });
        let run = run(&f).await;

        assert_eq!(run.outcome, RunOutcome::Failed);
        assert_eq!(run.failed_step, Some(RunStep::Publish));
        assert!(run.reason.as_deref().unwrap().contains("403 Forbidden"));
        assert!(run.artifacts.contains_key("cli.py"));
        assert!(run.github_url.is_none());
        assert_eq!(f.publisher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ideas_skips_and_journals_once() {
        let f = fixture(Setup {
            discoverer: FakeDiscoverer::with(vec![]),
            ..Default::default()
        });

        let first = run(&f).await;
        let second = run(&f).await;
        assert_eq!(first.outcome, RunOutcome::Skipped);
        assert_eq!(second.outcome, RunOutcome::Skipped);
        assert!(first.idea.is_none());

        let history = f.coordinator.journal().runs().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(f.backend.connects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_error_fails_run() {
        let f = fixture(Setup {
            discoverer: FakeDiscoverer::failing(),
            ..Default::default()
        });
        let run = run(&f).await;

        assert_eq!(run.outcome, RunOutcome::Failed);
        assert_eq!(run.failed_step, Some(RunStep::Discovery));
        assert_eq!(f.discoverer.calls(), 1);
        assert_eq!(f.backend.connects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_capacity_fails_without_submitting() {
        let f = fixture(Setup {
            counter: ScriptedCounter::new([Ok(1)]),
            ..Default::default()
        });

        let start = tokio::time::Instant::now();
        let run = run(&f).await;

        assert_eq!(run.outcome, RunOutcome::Failed);
        assert_eq!(run.failed_step, Some(RunStep::Admission));
        assert!(run.reason.as_deref().unwrap().contains("no capacity"));
        assert!(run.session.is_none());
        assert_eq!(start.elapsed(), Duration::from_secs(300));
        assert_eq!(f.backend.connects(), 0);
        assert_eq!(f.publisher.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_admission() {
        let f = fixture(Setup {
            counter: ScriptedCounter::new([Ok(1)]),
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        cancel.cancel();

        let run = f.coordinator.run_once("manual", &cancel).await;
        assert_eq!(run.failed_step, Some(RunStep::Admission));
        assert!(run.reason.as_deref().unwrap().starts_with("cancelled"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_failures_do_not_change_outcome() {
        let f = fixture(Setup {
            tracker: RecordingTracker::failing(),
            ..Default::default()
        });
        let run = run(&f).await;
        assert_eq!(run.outcome, RunOutcome::Success);
        assert!(f.tracker.statuses().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_trigger_is_rejected() {
        let f = Arc::new(fixture(Setup {
            script: vec![
                connected("s-1"),
                started(),
                Step::Delay(Duration::from_secs(3600)),
                completed(&["cli.py"]),
            ],
            ..Default::default()
        }));

        let cancel = CancellationToken::new();
        let first = {
            let f = f.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { f.coordinator.try_run_once("daily_development", &cancel).await })
        };
        tokio::time::sleep(Duration::from_secs(60)).await;

        let second = f.coordinator.try_run_once("weekday_development", &cancel).await;
        assert!(second.is_none());

        let first = first.await.unwrap().unwrap();
        assert_eq!(first.outcome, RunOutcome::Success);
        assert_eq!(f.coordinator.journal().runs().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_idea_skips_discovery() {
        let f = fixture(Setup {
            discoverer: FakeDiscoverer::failing(),
            ..Default::default()
        });
        let idea = Idea::new("todo-cli", "Manage TODOs from the terminal").unwrap();
        let run = f
            .coordinator
            .run_idea(idea, "manual", &CancellationToken::new())
            .await;

        assert_eq!(run.outcome, RunOutcome::Success);
        assert_eq!(f.discoverer.calls(), 0);
        assert_eq!(f.coordinator.journal().runs().await.unwrap().len(), 1);
    }
}

//! Drives one build session from submission to a terminal state.

use autoforge_config::BackendConfig;
use autoforge_config::prompt::{DEFAULT_TASK_TEMPLATE, PromptContext};
use autoforge_core::backend::{BuildBackend, SessionChannel};
use autoforge_core::event::{BackendEvent, OutboundMessage};
use autoforge_core::session::BuildMetadata;
use autoforge_core::{DevelopmentResult, Error, Idea, Result, Session, SessionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A submitted session and the channel it is bound to.
pub struct SessionHandle {
    session: Session,
    channel: Box<dyn SessionChannel>,
    submitted_at: Instant,
}

impl SessionHandle {
    pub fn session(&self) -> &Session {
        &self.session
    }
}

/// Owns the lifecycle of build sessions on one backend.
///
/// There are no retries at this level; a failed session is reported to the
/// caller and the next scheduled run starts over.
pub struct SessionOrchestrator {
    backend: Arc<dyn BuildBackend>,
    workflow_id: String,
    log_level: String,
    handshake_timeout: Duration,
    monitor_ceiling: Duration,
}

impl SessionOrchestrator {
    pub fn new(backend: Arc<dyn BuildBackend>, config: &BackendConfig) -> Self {
        Self {
            backend,
            workflow_id: config.workflow_id.clone(),
            log_level: config.log_level.clone(),
            handshake_timeout: config.handshake_timeout,
            monitor_ceiling: config.monitor_ceiling,
        }
    }

    /// Open a session for `idea` and start its workflow.
    ///
    /// Fails with [`Error::Submission`] when the backend cannot be reached,
    /// assigns no session id within the handshake window, or closes the
    /// channel first. The channel is closed before any error is returned.
    pub async fn submit(&self, idea: &Idea) -> Result<SessionHandle> {
        let mut channel = self.backend.connect().await.map_err(|e| {
            Error::Submission(format!("connecting to {}: {}", self.backend.name(), e))
        })?;

        let deadline = Instant::now() + self.handshake_timeout;
        let session_id = match timeout_at(deadline, await_session_id(channel.as_mut())).await {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => return Err(abort_submission(channel.as_mut(), e).await),
            Err(_) => {
                let e = Error::Submission(format!(
                    "no session id within {}s",
                    self.handshake_timeout.as_secs()
                ));
                return Err(abort_submission(channel.as_mut(), e).await);
            }
        };

        let request = OutboundMessage::StartWorkflow {
            yaml_file: self.workflow_id.clone(),
            task_prompt: PromptContext::today(idea).interpolate(DEFAULT_TASK_TEMPLATE),
            log_level: self.log_level.clone(),
        };
        if let Err(e) = channel.send(&request).await {
            let e = Error::Submission(format!("sending start_workflow: {}", e));
            return Err(abort_submission(channel.as_mut(), e).await);
        }

        let mut session = Session::new(session_id, idea.clone());
        if let Err(e) = session.transition(SessionState::Submitted) {
            return Err(abort_submission(channel.as_mut(), e).await);
        }

        info!(
            session_id = %session.id(),
            idea = %idea.name,
            workflow = %self.workflow_id,
            started_at = %session.started_at(),
            "Session submitted"
        );

        Ok(SessionHandle {
            session,
            channel,
            submitted_at: Instant::now(),
        })
    }

    /// Consume the session's events until it reaches a terminal state.
    ///
    /// Monitoring is bounded by the configured ceiling, measured from when
    /// this call starts. Firing `cancel` abandons the session locally; the
    /// backend may keep running it.
    pub async fn monitor(&self, handle: SessionHandle, cancel: &CancellationToken) -> DevelopmentResult {
        let SessionHandle {
            mut session,
            mut channel,
            submitted_at,
        } = handle;
        let deadline = Instant::now() + self.monitor_ceiling;
        let mut metadata = BuildMetadata::default();

        let outcome: std::result::Result<(), (SessionState, Error)> = loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    break Err((
                        SessionState::Cancelled,
                        Error::Cancelled("monitoring abandoned".to_string()),
                    ));
                }
                _ = sleep_until(deadline) => {
                    break Err((
                        SessionState::TimedOut,
                        Error::Timeout(format!(
                            "no terminal event within {}s",
                            self.monitor_ceiling.as_secs()
                        )),
                    ));
                }
                received = channel.recv() => received,
            };

            let event = match received {
                Some(Ok(event)) => event,
                Some(Err(e @ Error::Stream(_))) => break Err((SessionState::Failed, e)),
                Some(Err(e)) => break Err((SessionState::Failed, Error::Stream(e.to_string()))),
                None => {
                    break Err((
                        SessionState::Failed,
                        Error::Stream("channel closed before the workflow finished".to_string()),
                    ));
                }
            };

            session.record(event.clone());
            match event {
                BackendEvent::Started => {
                    if let Err(e) = session.transition(SessionState::Running) {
                        warn!(session_id = %session.id(), error = %e, "Ignoring repeated workflow_started");
                    } else {
                        info!(session_id = %session.id(), "Workflow started");
                    }
                }
                BackendEvent::AgentMessage { agent } => {
                    metadata.agent_steps += 1;
                    debug!(session_id = %session.id(), %agent, step = metadata.agent_steps, "Agent step");
                }
                BackendEvent::Completed(payload) => {
                    session.add_artifacts(payload.artifacts());
                    metadata.token_usage = payload.token_usage;
                    break Ok(());
                }
                BackendEvent::Cancelled => {
                    break Err((
                        SessionState::Cancelled,
                        Error::Cancelled("workflow cancelled by the backend".to_string()),
                    ));
                }
                BackendEvent::Error { message } => {
                    break Err((SessionState::Failed, Error::BackendReported(message)));
                }
                other @ (BackendEvent::Connected { .. } | BackendEvent::Unknown { .. }) => {
                    debug!(session_id = %session.id(), kind = %other.kind(), "Ignoring event");
                }
            }
        };

        close_channel(channel.as_mut()).await;

        let error = match outcome {
            Ok(()) => session.transition(SessionState::Completed).err(),
            Err((next, e)) => {
                if let Err(transition) = session.fail(next, &e) {
                    warn!(session_id = %session.id(), error = %transition, "Could not record failure");
                }
                Some(e)
            }
        };

        let result = DevelopmentResult {
            session_id: Some(session.id().to_string()),
            state: session.state(),
            files: session.take_artifacts(),
            execution_time: submitted_at.elapsed(),
            metadata,
            error,
        };

        match &result.error {
            None => info!(
                session_id = %session.id(),
                idea = %session.idea().name,
                files = result.files.len(),
                agent_steps = result.metadata.agent_steps,
                elapsed_secs = result.execution_time.as_secs(),
                "Session completed"
            ),
            Some(e) => error!(
                session_id = %session.id(),
                idea = %session.idea().name,
                state = %result.state,
                error = %e,
                "Session did not complete"
            ),
        }

        result
    }

    /// Submit and monitor in one step. Submission failures become a failed result.
    pub async fn develop(&self, idea: &Idea, cancel: &CancellationToken) -> DevelopmentResult {
        let started = Instant::now();
        match self.submit(idea).await {
            Ok(handle) => self.monitor(handle, cancel).await,
            Err(e) => {
                error!(idea = %idea.name, error = %e, "Submission failed");
                DevelopmentResult::not_submitted(e, started.elapsed())
            }
        }
    }
}

async fn await_session_id(channel: &mut dyn SessionChannel) -> Result<String> {
    loop {
        match channel.recv().await {
            Some(Ok(BackendEvent::Connected { session_id })) => return Ok(session_id),
            Some(Ok(other)) => debug!(kind = %other.kind(), "Ignoring event before session id"),
            Some(Err(e)) => return Err(Error::Submission(e.to_string())),
            None => {
                return Err(Error::Submission(
                    "channel closed before a session id was assigned".to_string(),
                ));
            }
        }
    }
}

async fn abort_submission(channel: &mut dyn SessionChannel, error: Error) -> Error {
    close_channel(channel).await;
    error
}

async fn close_channel(channel: &mut dyn SessionChannel) {
    if let Err(e) = channel.close().await {
        debug!(error = %e, "Closing session channel failed");
    }
}

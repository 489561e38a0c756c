//! Build sessions and their lifecycle.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::event::BackendEvent;
use crate::{Error, Idea, Result};

/// State of a build session.
///
/// ```text
/// Created -> Submitted -> Running -> {Completed | Failed | Cancelled | TimedOut}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[display("created")]
    Created,
    #[display("submitted")]
    Submitted,
    #[display("running")]
    Running,
    #[display("completed")]
    Completed,
    #[display("failed")]
    Failed,
    #[display("cancelled")]
    Cancelled,
    #[display("timed_out")]
    TimedOut,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed
                | SessionState::Failed
                | SessionState::Cancelled
                | SessionState::TimedOut
        )
    }

    /// Whether `next` is reachable from `self` in one step.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match self {
            Created => matches!(next, Submitted | Failed | Cancelled),
            // Some backends skip `workflow_started`, so a submitted session
            // may end directly.
            Submitted => matches!(next, Running | Completed | Failed | Cancelled | TimedOut),
            Running => next.is_terminal(),
            Completed | Failed | Cancelled | TimedOut => false,
        }
    }
}

/// An event as received by a session.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub received_at: DateTime<Utc>,
    pub event: BackendEvent,
}

/// One backend-tracked execution of the build process for an idea.
#[derive(Debug)]
pub struct Session {
    id: String,
    idea: Idea,
    state: SessionState,
    started_at: DateTime<Utc>,
    events: Vec<SessionEvent>,
    artifacts: BTreeMap<String, String>,
    error: Option<String>,
}

impl Session {
    pub fn new(id: impl Into<String>, idea: Idea) -> Self {
        Self {
            id: id.into(),
            idea,
            state: SessionState::Created,
            started_at: Utc::now(),
            events: Vec::new(),
            artifacts: BTreeMap::new(),
            error: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn idea(&self) -> &Idea {
        &self.idea
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    pub fn artifacts(&self) -> &BTreeMap<String, String> {
        &self.artifacts
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Move to `next`, rejecting transitions the state machine does not allow.
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Move to a terminal failure state and record the error. The error is set at most once.
    pub fn fail(&mut self, next: SessionState, error: &Error) -> Result<()> {
        if !next.is_terminal() || next == SessionState::Completed {
            return Err(Error::Internal(format!(
                "{} is not a failure state",
                next
            )));
        }
        self.transition(next)?;
        self.error = Some(error.to_string());
        Ok(())
    }

    /// Append an inbound event to the session log.
    pub fn record(&mut self, event: BackendEvent) {
        self.events.push(SessionEvent {
            received_at: Utc::now(),
            event,
        });
    }

    pub fn add_artifacts(&mut self, files: BTreeMap<String, String>) {
        self.artifacts.extend(files);
    }

    pub fn take_artifacts(&mut self) -> BTreeMap<String, String> {
        std::mem::take(&mut self.artifacts)
    }
}

/// Metadata gathered while monitoring a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildMetadata {
    /// Number of `agent_message` events seen.
    pub agent_steps: u32,
    /// Usage reported by the backend with `workflow_completed`.
    pub token_usage: Option<Value>,
}

/// Outcome of driving one session to a terminal state.
#[derive(Debug)]
pub struct DevelopmentResult {
    /// Absent when the backend never assigned a session.
    pub session_id: Option<String>,
    pub state: SessionState,
    pub files: BTreeMap<String, String>,
    pub execution_time: Duration,
    pub metadata: BuildMetadata,
    pub error: Option<Error>,
}

impl DevelopmentResult {
    pub fn is_success(&self) -> bool {
        self.state == SessionState::Completed && self.error.is_none()
    }

    /// Result for a session that never got past submission.
    pub fn not_submitted(error: Error, execution_time: Duration) -> Self {
        Self {
            session_id: None,
            state: SessionState::Failed,
            files: BTreeMap::new(),
            execution_time,
            metadata: BuildMetadata::default(),
            error: Some(error),
        }
    }
}

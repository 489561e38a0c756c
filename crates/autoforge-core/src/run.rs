//! Pipeline run records.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;

use crate::collaborator::PublishedLocation;
use crate::session::{DevelopmentResult, SessionState};
use crate::{Error, Idea, RunId};

/// Final outcome of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    #[display("success")]
    Success,
    #[display("failed")]
    Failed,
    #[display("skipped")]
    Skipped,
}

/// Step of a pipeline run that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum RunStep {
    #[display("discovery")]
    Discovery,
    #[display("admission")]
    Admission,
    #[display("build")]
    Build,
    #[display("publish")]
    Publish,
}

/// What a run learned about its build session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Option<String>,
    pub state: SessionState,
    pub agent_steps: u32,
    pub execution_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<Value>,
}

impl From<&DevelopmentResult> for SessionSummary {
    fn from(result: &DevelopmentResult) -> Self {
        Self {
            session_id: result.session_id.clone(),
            state: result.state,
            agent_steps: result.metadata.agent_steps,
            execution_seconds: result.execution_time.as_secs_f64(),
            token_usage: result.metadata.token_usage.clone(),
        }
    }
}

/// One completed discover -> build -> publish sequence, as stored in the history journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: RunId,
    pub timestamp: DateTime<Utc>,
    /// Name of the job that started the run.
    pub trigger: String,
    pub idea: Option<Idea>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionSummary>,
    #[serde(rename = "githubUrl", default, skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    pub outcome: RunOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<RunStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Produced files, kept even when publishing failed.
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
    pub duration_seconds: f64,
}

impl PipelineRun {
    /// Build succeeded but publishing did not.
    pub fn is_unpublished_build(&self) -> bool {
        self.outcome == RunOutcome::Failed && self.failed_step == Some(RunStep::Publish)
    }
}

/// A run in progress.
///
/// The finishing methods consume the value, so every run settles its
/// outcome exactly once.
#[derive(Debug)]
pub struct PendingRun {
    id: RunId,
    timestamp: DateTime<Utc>,
    started: Instant,
    trigger: String,
    idea: Option<Idea>,
    session: Option<SessionSummary>,
    published: Option<PublishedLocation>,
    artifacts: BTreeMap<String, String>,
}

impl PendingRun {
    pub fn start(trigger: impl Into<String>) -> Self {
        Self {
            id: RunId::new(),
            timestamp: Utc::now(),
            started: Instant::now(),
            trigger: trigger.into(),
            idea: None,
            session: None,
            published: None,
            artifacts: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn set_idea(&mut self, idea: Idea) {
        self.idea = Some(idea);
    }

    pub fn set_build(&mut self, result: &DevelopmentResult) {
        self.session = Some(SessionSummary::from(result));
        self.artifacts = result.files.clone();
    }

    pub fn set_published(&mut self, location: PublishedLocation) {
        self.published = Some(location);
    }

    pub fn succeed(self) -> PipelineRun {
        self.finish(RunOutcome::Success, None, None)
    }

    pub fn skip(self, reason: impl Into<String>) -> PipelineRun {
        self.finish(RunOutcome::Skipped, None, Some(reason.into()))
    }

    pub fn fail(self, step: RunStep, error: &Error) -> PipelineRun {
        self.finish(RunOutcome::Failed, Some(step), Some(error.to_string()))
    }

    fn finish(
        self,
        outcome: RunOutcome,
        failed_step: Option<RunStep>,
        reason: Option<String>,
    ) -> PipelineRun {
        let (github_url, repository) = match self.published {
            Some(location) => (Some(location.url), Some(location.repository)),
            None => (None, None),
        };

        PipelineRun {
            id: self.id,
            timestamp: self.timestamp,
            trigger: self.trigger,
            idea: self.idea,
            session: self.session,
            github_url,
            repository,
            outcome,
            failed_step,
            reason,
            artifacts: self.artifacts,
            duration_seconds: self.started.elapsed().as_secs_f64(),
        }
    }
}

//! Collaborators around the build pipeline: discovery, publishing and idea tracking.

use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Idea, Result};

/// Produces candidate ideas, best first.
#[async_trait]
pub trait Discoverer: Send + Sync {
    async fn discover(&self, limit: usize) -> Result<Vec<Idea>>;
}

/// Where a build's artifacts ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedLocation {
    pub url: String,
    /// Fully-qualified repository name, e.g. `owner/name`.
    pub repository: String,
}

/// Publishes produced artifacts to a hosting service.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Whether credentials for the hosting service are present.
    fn is_configured(&self) -> bool;

    async fn publish(
        &self,
        idea: &Idea,
        files: &BTreeMap<String, String>,
    ) -> Result<PublishedLocation>;
}

/// Lifecycle status of an idea in the tracking document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum IdeaStatus {
    #[display("discovered")]
    Discovered,
    #[display("in_progress")]
    InProgress,
    #[display("completed")]
    Completed,
    #[display("failed")]
    Failed,
}

/// Mirrors ideas and their status into an external document store.
#[async_trait]
pub trait IdeaTracker: Send + Sync {
    /// Record a newly discovered idea, returning the store's id for it.
    async fn record_idea(&self, idea: &Idea) -> Result<String>;

    async fn update_status(&self, id: &str, status: IdeaStatus, url: Option<&str>) -> Result<()>;
}

//! Error types for autoforge.

use thiserror::Error;

use crate::session::SessionState;

#[derive(Debug, Error)]
pub enum Error {
    /// The backend never assigned a session.
    #[error("submission failed: {0}")]
    Submission(String),

    /// The duplex channel dropped while monitoring.
    #[error("stream error: {0}")]
    Stream(String),

    /// No terminal event within the ceiling, or no admission slot within the wait budget.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The backend sent an explicit `error` event.
    #[error("backend error: {0}")]
    BackendReported(String),

    /// The backend could not be reached at all.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Publishing failed after a successful build.
    #[error("publish failed: {0}")]
    Publish(String),

    #[error("discovery failed: {0}")]
    Discovery(String),

    #[error("tracker error: {0}")]
    Tracker(String),

    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

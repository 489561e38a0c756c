//! Publishing and idea tracking for autoforge.
//!
//! Provides:
//! - A GitHub publisher (repository per idea, one commit per file)
//! - A Notion idea tracker
//! - A no-op tracker for runs without a document store

pub mod error;
pub mod github;
pub mod notion;

pub use error::HttpError;
pub use github::GitHubPublisher;
pub use notion::{NoopTracker, NotionTracker};

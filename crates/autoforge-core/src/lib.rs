//! Core domain types and traits for the autoforge build pipeline.
//!
//! This crate contains:
//! - Ideas and their validation
//! - Build sessions, their state machine and results
//! - Backend wire messages (inbound events, outbound requests)
//! - Traits for the build backend, admission counting and collaborators
//! - Pipeline run records

pub mod backend;
pub mod collaborator;
pub mod error;
pub mod event;
pub mod id;
pub mod idea;
pub mod run;
pub mod secret;
pub mod session;

pub use error::{Error, Result};
pub use id::RunId;
pub use idea::{Difficulty, Idea, Priority, ProjectType};
pub use secret::Secret;
pub use session::{DevelopmentResult, Session, SessionState};

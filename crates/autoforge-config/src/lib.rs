//! Configuration for autoforge.
//!
//! This crate handles:
//! - System configuration read once from the environment
//! - KDL schedule files (cron jobs) and idea catalogs
//! - Cron expressions
//! - Task prompt templates

pub mod catalog;
pub mod cron;
pub mod error;
mod kdl_util;
pub mod prompt;
pub mod schedule;
pub mod system;

pub use cron::CronExpr;
pub use error::{ConfigError, ConfigResult};
pub use prompt::PromptContext;
pub use schedule::{JobKind, ScheduleConfig, ScheduledJob};
pub use system::{AdmissionConfig, BackendConfig, GitHubConfig, NotionConfig, SystemConfig};

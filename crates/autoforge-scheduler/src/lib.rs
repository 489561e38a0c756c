//! Pipeline orchestration for autoforge.
//!
//! Admits build sessions against a capacity-limited backend, drives each
//! session to a terminal state, sequences discover -> build -> publish runs
//! and fires them on cron schedules.

pub mod admission;
pub mod coordinator;
pub mod discovery;
pub mod health;
pub mod history;
pub mod orchestrator;
pub mod runner;

#[cfg(test)]
mod testing;

pub use admission::AdmissionController;
pub use coordinator::PipelineCoordinator;
pub use discovery::CatalogDiscoverer;
pub use health::{HealthProbe, HealthReport};
pub use history::{HistoryJournal, HistorySummary};
pub use orchestrator::{SessionHandle, SessionOrchestrator};
pub use runner::{RunScheduler, ScheduleEntry};

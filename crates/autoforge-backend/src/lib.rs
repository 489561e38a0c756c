//! Build backend client for autoforge.
//!
//! Provides:
//! - A WebSocket session channel and HTTP health probe for the ChatDev backend
//! - An active-session counter derived from the backend's server log

pub mod activity;
pub mod chatdev;

pub use activity::LogActiveSessionCounter;
pub use chatdev::{ChatDevBackend, WebSocketChannel};

//! Build backend traits.
//!
//! The build backend is an external multi-agent engine reached over a
//! session-based duplex channel. These traits keep the orchestration code
//! independent of the transport so it can be driven by scripted channels
//! in tests.

use async_trait::async_trait;

use crate::Result;
use crate::event::{BackendEvent, OutboundMessage};

/// A duplex channel bound to one backend session.
#[async_trait]
pub trait SessionChannel: Send {
    /// Send a request to the backend.
    async fn send(&mut self, message: &OutboundMessage) -> Result<()>;

    /// Receive the next classified event.
    ///
    /// Returns `None` once the peer has closed the channel. Must be cancel
    /// safe: dropping the future before it completes loses no event.
    async fn recv(&mut self) -> Option<Result<BackendEvent>>;

    /// Close the channel. Calling it more than once is a no-op.
    async fn close(&mut self) -> Result<()>;
}

/// Entry point to the build backend.
#[async_trait]
pub trait BuildBackend: Send + Sync {
    /// Name of this backend, for logs.
    fn name(&self) -> &'static str;

    /// Open a new session channel.
    async fn connect(&self) -> Result<Box<dyn SessionChannel>>;

    /// Whether the backend reports itself healthy.
    async fn health(&self) -> Result<bool>;
}

/// Source of the number of sessions currently active on the backend.
///
/// The backend runs in a separate process whose session table cannot be
/// queried, so implementations derive the count from whatever activity
/// record the backend leaves behind.
#[async_trait]
pub trait ActiveSessionCounter: Send + Sync {
    async fn active_sessions(&self) -> Result<usize>;
}

//! Transport traits
//!
//! The connection engine only talks to a remote machine through these
//! traits, so the SSH implementation can be swapped for a scripted one.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::TransportError;
use crate::types::{CommandEvent, Endpoint};

/// Opens remote-shell sessions
#[async_trait]
pub trait Transport: Send + Sync {
    /// The session type produced by this transport
    type Session: RemoteSession;

    /// Establish an authenticated session, bounded by `timeout`.
    ///
    /// A deadline expiry must be reported as an error for which
    /// [`TransportError::is_timeout`] returns true.
    async fn open(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<Self::Session, TransportError>;
}

/// An established remote-shell session
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// The running-command type produced by this session
    type Command: RemoteCommand;

    /// Low-level activity indicator of the underlying connection
    fn is_active(&self) -> bool;

    /// Start a command on the remote machine
    async fn exec(&self, command: &str) -> Result<Self::Command, TransportError>;

    /// Close the session
    async fn close(&self) -> Result<(), TransportError>;
}

/// A command running on the remote machine
#[async_trait]
pub trait RemoteCommand: Send {
    /// Wait for the next event.
    ///
    /// Returns `Ok(None)` once the command has finished and its channel is
    /// closed; all output has been delivered by then.
    async fn next_event(&mut self) -> Result<Option<CommandEvent>, TransportError>;

    /// Best-effort cancellation: close the command's channel
    async fn cancel(&mut self) -> Result<(), TransportError>;
}

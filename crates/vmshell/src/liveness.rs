//! Liveness probing

use std::time::Duration;

use tracing::Instrument;

use vmshell_core::traits::{RemoteCommand, RemoteSession, Transport};
use vmshell_core::{CommandEvent, TransportError};

use crate::connection::Connection;

/// Trivial command used to confirm the session still runs commands
pub const LIVENESS_COMMAND: &str = "echo alive";

/// Upper bound on a liveness probe
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);

impl<T: Transport> Connection<T> {
    /// Check that the session is up and the remote machine runs commands.
    ///
    /// Never fails; every problem is reported as `false`. An inactive
    /// transport or a transport error marks the connection disconnected. A
    /// probe that merely runs out of time does not.
    pub async fn is_alive(&mut self) -> bool {
        let span = self.span.clone();
        self.probe().instrument(span).await
    }

    async fn probe(&mut self) -> bool {
        if !self.connected {
            return false;
        }
        let Some(session) = self.session.as_ref() else {
            return false;
        };

        if !session.is_active() {
            tracing::debug!("Transport inactive, marking disconnected");
            self.connected = false;
            return false;
        }

        match tokio::time::timeout(LIVENESS_TIMEOUT, exit_status(session)).await {
            Ok(Ok(Some(0))) => true,
            Ok(Ok(status)) => {
                tracing::debug!("Liveness probe exited with {:?}", status);
                false
            }
            Ok(Err(e)) => {
                tracing::debug!("Liveness probe failed, marking disconnected: {}", e);
                self.connected = false;
                false
            }
            Err(_) => {
                tracing::warn!("Liveness probe got no answer within {:?}", LIVENESS_TIMEOUT);
                false
            }
        }
    }
}

/// Run the probe command and wait for its exit status
async fn exit_status<S: RemoteSession>(session: &S) -> Result<Option<u32>, TransportError> {
    let mut command = session.exec(LIVENESS_COMMAND).await?;
    while let Some(event) = command.next_event().await? {
        if let CommandEvent::ExitStatus(code) = event {
            return Ok(Some(code));
        }
    }
    Ok(None)
}

//! Reconnection with a bounded number of constant-delay attempts

use std::time::Duration;

use tracing::Instrument;

use vmshell_core::config::ReconnectConfig;
use vmshell_core::traits::Transport;
use vmshell_core::ConnectionError;

use crate::connection::Connection;
use crate::exec::OutputSink;

/// How hard [`Connection::reconnect`] tries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Number of connect attempts
    pub max_retries: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl ReconnectPolicy {
    /// Create a new policy
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectConfig::default().into()
    }
}

impl From<ReconnectConfig> for ReconnectPolicy {
    fn from(config: ReconnectConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: config.delay,
        }
    }
}

impl<T: Transport> Connection<T> {
    /// Drop the current session and try to establish a working one.
    ///
    /// Each attempt connects with the configured connect timeout and then
    /// probes liveness; only a live session counts as success. Attempts are
    /// separated by `policy.delay`, with no pause after the last one.
    /// Returns whether a live session was established.
    pub async fn reconnect(&mut self, policy: ReconnectPolicy) -> bool {
        self.disconnect().await;

        let span = self.span.clone();
        async {
            for attempt in 1..=policy.max_retries {
                tracing::info!("Reconnect attempt {}/{}", attempt, policy.max_retries);

                match self.connect(self.config.connect_timeout).await {
                    Ok(()) => {
                        if self.is_alive().await {
                            tracing::info!("Reconnected to {}", self.endpoint);
                            return true;
                        }
                        tracing::warn!("Reconnected but session is not responsive");
                    }
                    Err(e) => tracing::warn!("Reconnect attempt {} failed: {}", attempt, e),
                }

                if attempt < policy.max_retries {
                    tokio::time::sleep(policy.delay).await;
                }
            }

            tracing::warn!("Giving up after {} reconnect attempts", policy.max_retries);
            false
        }
        .instrument(span)
        .await
    }

    /// Reconnect using the policy from this connection's configuration
    pub async fn reconnect_with_config(&mut self) -> bool {
        let policy = ReconnectPolicy::from(self.config.reconnect);
        self.reconnect(policy).await
    }

    /// Run `command`, and if the connection is lost, reconnect once with the
    /// configured policy and run it again.
    ///
    /// Any other error, including an unexpected reboot, is returned as is.
    /// If the reconnect fails the original error is returned.
    pub async fn execute_with_reconnect(
        &mut self,
        command: &str,
        timeout: Duration,
        mut sink: Option<OutputSink<'_>>,
    ) -> Result<i32, ConnectionError> {
        let first = match sink {
            Some(ref mut sink) => Some(&mut **sink as OutputSink<'_>),
            None => None,
        };
        let result = self.execute(command, timeout, first).await;
        match result {
            Err(e) if e.needs_reconnect() => {
                tracing::warn!("{}; reconnecting", e);
                if !self.reconnect_with_config().await {
                    return Err(e);
                }
                self.execute(command, timeout, sink).await
            }
            result => result,
        }
    }
}

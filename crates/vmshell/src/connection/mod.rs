//! Connection lifecycle
//!
//! [`Connection`] owns the session handle for one endpoint and tracks whether
//! it is usable. Command execution, liveness probing and reconnection are
//! implemented on top of it in their own modules.

mod scoped;

use std::time::Duration;

use tokio::time::Instant;
use tracing::Instrument;

use vmshell_core::config::ConnectionConfig;
use vmshell_core::traits::{RemoteSession, Transport};
use vmshell_core::{ConnectionError, Endpoint};

use crate::reboot::{Fingerprint, RebootDetector};
use crate::transport::SshTransport;

/// A persistent remote-shell connection to one machine.
///
/// The connection starts disconnected. It becomes connected only through a
/// successful [`connect`](Connection::connect) and can cycle between the two
/// states any number of times. All operations take `&mut self`, so at most
/// one command runs against a connection at a time.
pub struct Connection<T: Transport> {
    pub(crate) config: ConnectionConfig,
    pub(crate) endpoint: Endpoint,
    pub(crate) transport: T,
    /// Present while connected; may linger after a failure until the next
    /// `disconnect` or `connect`
    pub(crate) session: Option<T::Session>,
    pub(crate) connected: bool,
    /// Captured at the most recent successful connect
    pub(crate) fingerprint: Option<Fingerprint>,
    pub(crate) detector: RebootDetector,
    pub(crate) span: tracing::Span,
}

impl Connection<SshTransport> {
    /// Create an SSH connection from configuration
    pub fn ssh(config: ConnectionConfig) -> Self {
        Self::new(config, SshTransport::new())
    }
}

impl<T: Transport> Connection<T> {
    /// Create a disconnected connection using `transport`
    pub fn new(config: ConnectionConfig, transport: T) -> Self {
        let endpoint = Endpoint::from(&config);
        let span = tracing::info_span!(
            "connection",
            host = %endpoint.host,
            port = endpoint.port,
            user = %endpoint.user,
        );
        Self {
            config,
            endpoint,
            transport,
            session: None,
            connected: false,
            fingerprint: None,
            detector: RebootDetector::new(),
            span,
        }
    }

    /// The endpoint this connection targets
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The configuration this connection was created from
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Whether the connection is currently usable
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Boot fingerprint captured at the last successful connect
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    /// Establish the session, bounded by `timeout`.
    ///
    /// Any session still held from an earlier connect is released first. On
    /// success the boot fingerprint is captured; failing to capture it is
    /// not an error and leaves the fingerprint absent.
    pub async fn connect(&mut self, timeout: Duration) -> Result<(), ConnectionError> {
        let span = self.span.clone();
        self.connect_inner(timeout).instrument(span).await
    }

    async fn connect_inner(&mut self, timeout: Duration) -> Result<(), ConnectionError> {
        self.release_session().await;

        let deadline = Instant::now() + timeout;
        tracing::debug!("Connecting to {} (timeout {:?})", self.endpoint, timeout);
        let opened =
            tokio::time::timeout(timeout, self.transport.open(&self.endpoint, timeout)).await;

        let session = match opened {
            Ok(Ok(session)) => session,
            Ok(Err(e)) if e.is_timeout() => {
                tracing::warn!("Connection to {} timed out: {}", self.endpoint, e);
                return Err(ConnectionError::Timeout {
                    host: self.endpoint.host.clone(),
                    timeout,
                });
            }
            Ok(Err(e)) => {
                tracing::warn!("Connection to {} failed: {}", self.endpoint, e);
                return Err(ConnectionError::Failure {
                    host: self.endpoint.host.clone(),
                    source: e,
                });
            }
            Err(_) => {
                tracing::warn!("Connection to {} timed out after {:?}", self.endpoint, timeout);
                return Err(ConnectionError::Timeout {
                    host: self.endpoint.host.clone(),
                    timeout,
                });
            }
        };

        // The fingerprint query shares the connect deadline
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.fingerprint = match self.detector.fingerprint(&session, remaining).await {
            Ok(fingerprint) => {
                tracing::debug!("Boot fingerprint: {}", fingerprint);
                Some(fingerprint)
            }
            Err(e) => {
                tracing::debug!("Boot fingerprint unavailable, reboot detection disabled: {}", e);
                None
            }
        };
        self.session = Some(session);
        self.connected = true;

        tracing::info!("Connected to {}", self.endpoint);
        Ok(())
    }

    /// Tear down the session.
    ///
    /// Idempotent and infallible: a close error is logged and dropped, and
    /// the connection always ends up disconnected.
    pub async fn disconnect(&mut self) {
        let span = self.span.clone();
        async {
            if self.release_session().await {
                tracing::info!("Disconnected from {}", self.endpoint);
            }
        }
        .instrument(span)
        .await
    }

    /// Close and drop the session if one is held. Returns whether one was.
    async fn release_session(&mut self) -> bool {
        self.connected = false;
        let Some(session) = self.session.take() else {
            return false;
        };
        if let Err(e) = session.close().await {
            tracing::debug!("Ignoring error while closing session: {}", e);
        }
        true
    }
}

//! Reboot detection
//!
//! The modification time of `/proc/1` changes whenever the machine boots, so
//! it serves as a cheap boot fingerprint. A fingerprint is captured on
//! connect and compared before every command.

use std::fmt;
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;

use vmshell_core::traits::{RemoteCommand, RemoteSession};
use vmshell_core::{CommandEvent, TransportError};

/// Remote query whose output identifies the current boot
pub const FINGERPRINT_COMMAND: &str = "stat -c %Y /proc/1";

/// Upper bound on a fingerprint query
pub const FINGERPRINT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opaque boot fingerprint, compared byte for byte
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap raw fingerprint text
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the raw fingerprint text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a fingerprint could not be fetched
#[derive(Debug, Error)]
pub enum FingerprintError {
    /// The query could not run
    #[error("fingerprint query failed: {0}")]
    Transport(#[from] TransportError),

    /// The query did not finish in time
    #[error("fingerprint query timed out after {0:?}")]
    Timeout(Duration),

    /// The query ran but failed
    #[error("fingerprint query exited with status {0}")]
    ExitStatus(u32),

    /// The query printed nothing
    #[error("fingerprint query returned no output")]
    Empty,
}

/// Outcome of comparing the stored fingerprint with a fresh one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebootCheck {
    /// Nothing was captured at connect time, so there is nothing to compare
    NoBaseline,
    /// The machine has not rebooted
    Unchanged,
    /// The fresh fingerprint could not be fetched; callers proceed as if
    /// unchanged
    Inconclusive(String),
    /// The machine booted again since the fingerprint was captured
    Rebooted {
        previous: Fingerprint,
        current: Fingerprint,
    },
}

impl RebootCheck {
    /// Whether execution may proceed.
    ///
    /// Only a confirmed mismatch blocks; an inconclusive check passes.
    pub fn may_proceed(&self) -> bool {
        !matches!(self, RebootCheck::Rebooted { .. })
    }
}

/// Fetches and compares boot fingerprints
#[derive(Debug, Clone)]
pub struct RebootDetector {
    command: String,
    timeout: Duration,
}

impl Default for RebootDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl RebootDetector {
    /// Detector using `stat -c %Y /proc/1`
    pub fn new() -> Self {
        Self {
            command: FINGERPRINT_COMMAND.to_string(),
            timeout: FINGERPRINT_TIMEOUT,
        }
    }

    /// Query the current boot fingerprint.
    ///
    /// The query is bounded by [`FINGERPRINT_TIMEOUT`] or `limit`, whichever
    /// is shorter, so it never outlasts the caller's own deadline.
    pub async fn fingerprint<S: RemoteSession>(
        &self,
        session: &S,
        limit: Duration,
    ) -> Result<Fingerprint, FingerprintError> {
        let bound = self.timeout.min(limit);
        let query = async {
            let mut command = session.exec(&self.command).await?;
            let mut stdout = BytesMut::new();
            let mut status = None;
            while let Some(event) = command.next_event().await? {
                match event {
                    CommandEvent::Stdout(data) => stdout.extend_from_slice(&data),
                    CommandEvent::Stderr(_) => {}
                    CommandEvent::ExitStatus(code) => status = Some(code),
                }
            }
            Ok::<_, FingerprintError>((stdout, status))
        };

        let (stdout, status) = tokio::time::timeout(bound, query)
            .await
            .map_err(|_| FingerprintError::Timeout(bound))??;

        if let Some(code) = status.filter(|&code| code != 0) {
            return Err(FingerprintError::ExitStatus(code));
        }

        let text = String::from_utf8_lossy(&stdout).trim().to_string();
        if text.is_empty() {
            return Err(FingerprintError::Empty);
        }
        Ok(Fingerprint(text))
    }

    /// Compare `stored` against the machine's current fingerprint, spending
    /// at most `limit` on the query
    pub async fn check<S: RemoteSession>(
        &self,
        session: &S,
        stored: Option<&Fingerprint>,
        limit: Duration,
    ) -> RebootCheck {
        let Some(stored) = stored else {
            return RebootCheck::NoBaseline;
        };

        match self.fingerprint(session, limit).await {
            Ok(current) if current == *stored => RebootCheck::Unchanged,
            Ok(current) => RebootCheck::Rebooted {
                previous: stored.clone(),
                current,
            },
            Err(e) => RebootCheck::Inconclusive(e.to_string()),
        }
    }
}

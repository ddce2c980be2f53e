//! Core error types for vmshell

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by connection and command operations.
///
/// Every failure a caller of `connect` or `execute` can observe is one of
/// these five kinds.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Session establishment failed for a reason other than a deadline
    #[error("Connection to {host} failed: {source}")]
    Failure {
        host: String,
        #[source]
        source: TransportError,
    },

    /// Session establishment exceeded its timeout
    #[error("Connection to {host} timed out after {timeout:?}")]
    Timeout { host: String, timeout: Duration },

    /// A running command exceeded its timeout
    #[error("Command timed out after {timeout:?}: {command}")]
    CommandTimeout { command: String, timeout: Duration },

    /// The remote machine restarted since the session was established
    #[error("Remote machine rebooted unexpectedly (boot fingerprint {previous} -> {current})")]
    UnexpectedReboot { previous: String, current: String },

    /// Not connected, or the transport failed mid-command
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
}

impl ConnectionError {
    /// Whether a reconnect and retry may recover from this error.
    ///
    /// Only a lost connection qualifies. After an unexpected reboot the
    /// machine's state is unknown, so the command is not retried.
    pub fn needs_reconnect(&self) -> bool {
        matches!(self, ConnectionError::ConnectionLost(_))
    }
}

/// Errors reported by a transport implementation
#[derive(Error, Debug)]
pub enum TransportError {
    /// An operation hit a deadline inside the transport
    #[error("Transport timeout: {0}")]
    Timeout(String),

    /// The server rejected public key authentication
    #[error("Authentication rejected for user {user}")]
    AuthRejected { user: String },

    /// The private key could not be loaded
    #[error("Failed to load private key {path}: {reason}")]
    Key { path: PathBuf, reason: String },

    /// The channel or session was closed by the peer
    #[error("Channel closed")]
    ChannelClosed,

    /// SSH protocol level failure
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the failure was a deadline expiry rather than a hard error
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Timeout(_) => true,
            TransportError::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}

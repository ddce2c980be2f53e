//! vmshell: Persistent remote-shell session for test automation
//!
//! A [`Connection`] owns one SSH session to a machine under test. It runs
//! commands with live line-by-line output and per-command timeouts, notices
//! when the machine silently rebooted, and can recover from transient
//! connection loss with a bounded reconnect policy.

pub mod connection;
pub mod exec;
pub mod liveness;
pub mod reboot;
pub mod reconnect;
pub mod transport;

#[cfg(test)]
mod mock;

pub use connection::Connection;
pub use exec::{OutputSink, STDERR_MARKER};
pub use reboot::{Fingerprint, FingerprintError, RebootCheck, RebootDetector};
pub use reconnect::ReconnectPolicy;
pub use transport::SshTransport;

pub use vmshell_core::config::{ConnectionConfig, ReconnectConfig};
pub use vmshell_core::{ConnectionError, Endpoint, TransportError};

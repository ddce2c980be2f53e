//! Core domain types

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::config::ConnectionConfig;

/// Address and credentials of one remote-shell endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Hostname or IP address
    pub host: String,
    /// SSH port
    pub port: u16,
    /// Login user
    pub user: String,
    /// Path to the private key used for authentication
    pub private_key_path: PathBuf,
}

impl Endpoint {
    /// Create a new endpoint
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        private_key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            private_key_path: private_key_path.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

impl From<&ConnectionConfig> for Endpoint {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            user: config.user.clone(),
            private_key_path: config.private_key_path.clone(),
        }
    }
}

/// One event observed while a remote command runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
    /// Bytes written to standard output
    Stdout(Bytes),
    /// Bytes written to standard error
    Stderr(Bytes),
    /// The command reported its exit status
    ExitStatus(u32),
}

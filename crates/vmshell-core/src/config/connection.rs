//! Connection configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;
use crate::error::ConfigError;

/// Configuration for one remote-shell connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Host of the machine under test
    pub host: String,

    /// Username for SSH authentication
    pub user: String,

    /// Path to the private key for authentication
    pub private_key_path: PathBuf,

    /// SSH port
    pub port: u16,

    /// Session establishment timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Default per-command timeout
    #[serde(with = "duration_secs")]
    pub command_timeout: Duration,

    /// Reconnection policy
    pub reconnect: ReconnectConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: whoami::username(),
            private_key_path: dirs::home_dir()
                .unwrap_or_default()
                .join(".ssh")
                .join("id_ed25519"),
            port: 22,
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(60),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ConnectionConfig {
    /// Create a configuration for `host` with every other field defaulted
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Check that the fields needed to connect are present
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::MissingField("host".to_string()));
        }
        if self.user.is_empty() {
            return Err(ConfigError::MissingField("user".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Constant-delay reconnection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Maximum number of connect attempts
    pub max_retries: u32,

    /// Delay between attempts
    #[serde(with = "duration_secs")]
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(5),
        }
    }
}

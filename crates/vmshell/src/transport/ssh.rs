//! SSH transport built on russh
//!
//! Authenticates with a single private key loaded from disk. Server host
//! keys are accepted without verification; the key fingerprint is logged.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use russh::client::{self, Config, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;

use vmshell_core::traits::{RemoteCommand, RemoteSession, Transport};
use vmshell_core::{CommandEvent, Endpoint, TransportError};

/// SSH extended data type carrying standard error
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// Interval between SSH keepalive requests
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Unanswered keepalives before the session is considered dead
const KEEPALIVE_MAX: usize = 4;

/// Opens SSH sessions with public key authentication
#[derive(Clone)]
pub struct SshTransport {
    config: Arc<Config>,
}

impl SshTransport {
    /// Create a transport with keepalives enabled
    pub fn new() -> Self {
        let config = Config {
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            keepalive_max: KEEPALIVE_MAX,
            ..Default::default()
        };
        Self::with_config(config)
    }

    /// Create a transport from a custom russh client configuration
    pub fn with_config(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for SshTransport {
    type Session = SshSession;

    async fn open(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<SshSession, TransportError> {
        let key = russh_keys::load_secret_key(&endpoint.private_key_path, None).map_err(|e| {
            TransportError::Key {
                path: endpoint.private_key_path.clone(),
                reason: e.to_string(),
            }
        })?;

        let connecting = async {
            let handler = ClientHandler;
            let mut handle = client::connect(
                Arc::clone(&self.config),
                (endpoint.host.as_str(), endpoint.port),
                handler,
            )
            .await
            .map_err(map_ssh_error)?;

            tracing::debug!("Authenticating as user '{}'", endpoint.user);
            let authenticated = handle
                .authenticate_publickey(endpoint.user.as_str(), Arc::new(key))
                .await
                .map_err(map_ssh_error)?;

            if !authenticated {
                return Err(TransportError::AuthRejected {
                    user: endpoint.user.clone(),
                });
            }

            Ok(SshSession { handle })
        };

        tokio::time::timeout(timeout, connecting).await.map_err(|_| {
            TransportError::Timeout(format!(
                "connecting to {} took longer than {:?}",
                endpoint, timeout
            ))
        })?
    }
}

/// An authenticated SSH session
pub struct SshSession {
    handle: Handle<ClientHandler>,
}

#[async_trait]
impl RemoteSession for SshSession {
    type Command = SshCommand;

    fn is_active(&self) -> bool {
        !self.handle.is_closed()
    }

    async fn exec(&self, command: &str) -> Result<SshCommand, TransportError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(map_ssh_error)?;
        channel.exec(true, command).await.map_err(map_ssh_error)?;
        Ok(SshCommand {
            channel,
            finished: false,
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "closing", "en")
            .await
            .map_err(map_ssh_error)
    }
}

/// A command running on its own SSH channel
pub struct SshCommand {
    channel: Channel<Msg>,
    /// Exit status or exit signal received
    finished: bool,
}

#[async_trait]
impl RemoteCommand for SshCommand {
    async fn next_event(&mut self) -> Result<Option<CommandEvent>, TransportError> {
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    return Ok(Some(CommandEvent::Stdout(Bytes::copy_from_slice(&data))));
                }
                Some(ChannelMsg::ExtendedData { data, ext }) if ext == SSH_EXTENDED_DATA_STDERR => {
                    return Ok(Some(CommandEvent::Stderr(Bytes::copy_from_slice(&data))));
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    self.finished = true;
                    return Ok(Some(CommandEvent::ExitStatus(exit_status)));
                }
                Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                    tracing::debug!("Remote command terminated by signal {:?}", signal_name);
                    self.finished = true;
                }
                Some(ChannelMsg::Close) | None => {
                    // A channel that closes before the command reports how it
                    // ended means the session went away underneath it.
                    return if self.finished {
                        Ok(None)
                    } else {
                        Err(TransportError::ChannelClosed)
                    };
                }
                Some(_) => {}
            }
        }
    }

    async fn cancel(&mut self) -> Result<(), TransportError> {
        self.channel.close().await.map_err(map_ssh_error)
    }
}

/// Map a russh error onto the transport taxonomy, keeping timeouts distinct
fn map_ssh_error(e: russh::Error) -> TransportError {
    match e {
        russh::Error::ConnectionTimeout
        | russh::Error::KeepaliveTimeout
        | russh::Error::InactivityTimeout => TransportError::Timeout(e.to_string()),
        russh::Error::IO(io) => TransportError::Io(io),
        russh::Error::Disconnect => TransportError::ChannelClosed,
        other => TransportError::Protocol(other.to_string()),
    }
}

/// SSH client handler
struct ClientHandler;

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    /// Accept any server key; the machine under test is typically recreated
    /// with fresh host keys
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::debug!("Accepting server host key {}", server_public_key.fingerprint());
        Ok(true)
    }
}

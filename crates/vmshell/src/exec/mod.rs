//! Command execution
//!
//! Runs one command to completion, streaming its output line by line and
//! enforcing a deadline measured from the moment the command is issued.

mod lines;

use std::time::Duration;

use tokio::time::Instant;
use tracing::Instrument;

use vmshell_core::traits::{RemoteCommand, RemoteSession, Transport};
use vmshell_core::{CommandEvent, ConnectionError, TransportError};

use crate::connection::Connection;
use crate::reboot::RebootCheck;
use lines::LineBuffer;

/// Prefix added to every line the command writes to standard error
pub const STDERR_MARKER: &str = "STDERR: ";

/// Exit status reported when the command ended without one, or with one
/// that does not fit an `i32`
const UNKNOWN_EXIT_STATUS: i32 = -1;

/// How long to keep reading output once the exit status has arrived. A
/// background child holding the output channel open would otherwise keep
/// the command running until its deadline.
const EXIT_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Receives command output, one line per call
pub type OutputSink<'a> = &'a mut (dyn FnMut(&str) + Send);

/// Why a command stopped before completing
enum Interrupted {
    Deadline,
    Transport(TransportError),
}

impl From<TransportError> for Interrupted {
    fn from(e: TransportError) -> Self {
        Interrupted::Transport(e)
    }
}

impl<T: Transport> Connection<T> {
    /// Run `command` and return its exit status.
    ///
    /// Standard output lines are passed to `sink` unchanged; standard error
    /// lines are prefixed with [`STDERR_MARKER`]. Before the command runs the
    /// boot fingerprint is re-checked; a confirmed mismatch fails with
    /// [`ConnectionError::UnexpectedReboot`] and marks the connection
    /// disconnected.
    ///
    /// The command completes when it reports an exit status; output that is
    /// still in flight is read for a short grace period afterwards. When
    /// `timeout` expires first the command's channel is closed and
    /// [`ConnectionError::CommandTimeout`] is returned. The remote process
    /// is not guaranteed to stop. The reboot check counts against
    /// `timeout`.
    pub async fn execute(
        &mut self,
        command: &str,
        timeout: Duration,
        sink: Option<OutputSink<'_>>,
    ) -> Result<i32, ConnectionError> {
        let span = self.span.clone();
        self.execute_inner(command, timeout, sink)
            .instrument(span)
            .await
    }

    /// Run `command` with the configured default timeout, discarding output
    pub async fn run(&mut self, command: &str) -> Result<i32, ConnectionError> {
        let timeout = self.config.command_timeout;
        self.execute(command, timeout, None).await
    }

    async fn execute_inner(
        &mut self,
        command: &str,
        timeout: Duration,
        mut sink: Option<OutputSink<'_>>,
    ) -> Result<i32, ConnectionError> {
        let deadline = Instant::now() + timeout;
        let session = match &self.session {
            Some(session) if self.connected => session,
            _ => return Err(ConnectionError::ConnectionLost("Not connected".to_string())),
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        match self
            .detector
            .check(session, self.fingerprint.as_ref(), remaining)
            .await
        {
            RebootCheck::Rebooted { previous, current } => {
                tracing::warn!(
                    "Remote machine rebooted (fingerprint {} -> {}), refusing to run: {}",
                    previous,
                    current,
                    command
                );
                self.connected = false;
                return Err(ConnectionError::UnexpectedReboot {
                    previous: previous.to_string(),
                    current: current.to_string(),
                });
            }
            RebootCheck::Inconclusive(reason) => {
                tracing::debug!("Reboot check inconclusive, proceeding: {}", reason);
            }
            RebootCheck::NoBaseline | RebootCheck::Unchanged => {}
        }

        tracing::debug!("Executing: {}", command);
        match run_to_completion(session, command, deadline, &mut sink).await {
            Ok(status) => {
                tracing::debug!("Command exited with status {}: {}", status, command);
                Ok(status)
            }
            Err(Interrupted::Deadline) => {
                tracing::warn!("Command timed out after {:?}: {}", timeout, command);
                Err(ConnectionError::CommandTimeout {
                    command: command.to_string(),
                    timeout,
                })
            }
            Err(Interrupted::Transport(e)) if e.is_timeout() => {
                tracing::warn!("Transport timeout while running {}: {}", command, e);
                Err(ConnectionError::CommandTimeout {
                    command: command.to_string(),
                    timeout,
                })
            }
            Err(Interrupted::Transport(e)) => {
                tracing::warn!("Connection lost while running {}: {}", command, e);
                self.connected = false;
                Err(ConnectionError::ConnectionLost(e.to_string()))
            }
        }
    }
}

async fn run_to_completion<S: RemoteSession>(
    session: &S,
    command: &str,
    deadline: Instant,
    sink: &mut Option<OutputSink<'_>>,
) -> Result<i32, Interrupted> {
    let mut remote = tokio::time::timeout_at(deadline, session.exec(command))
        .await
        .map_err(|_| Interrupted::Deadline)??;

    let mut stdout = LineBuffer::new();
    let mut stderr = LineBuffer::new();
    let mut exit_status = None;

    let mut wait_until = deadline;

    loop {
        let event = match tokio::time::timeout_at(wait_until, remote.next_event()).await {
            Ok(event) => event?,
            Err(_) if exit_status.is_some() => {
                tracing::debug!("Channel still open after exit status, closing it");
                if let Err(e) = remote.cancel().await {
                    tracing::debug!("Failed to close finished command: {}", e);
                }
                break;
            }
            Err(_) => {
                if let Err(e) = remote.cancel().await {
                    tracing::debug!("Failed to cancel timed out command: {}", e);
                }
                return Err(Interrupted::Deadline);
            }
        };

        match event {
            Some(CommandEvent::Stdout(data)) => {
                stdout.push(&data);
                while let Some(line) = stdout.next_line() {
                    emit(sink, "", &line);
                }
            }
            Some(CommandEvent::Stderr(data)) => {
                stderr.push(&data);
                while let Some(line) = stderr.next_line() {
                    emit(sink, STDERR_MARKER, &line);
                }
            }
            Some(CommandEvent::ExitStatus(code)) => {
                exit_status = Some(code);
                wait_until = deadline.min(Instant::now() + EXIT_DRAIN_GRACE);
            }
            None => break,
        }
    }

    // Output without a trailing newline
    if let Some(line) = stdout.finish() {
        emit(sink, "", &line);
    }
    if let Some(line) = stderr.finish() {
        emit(sink, STDERR_MARKER, &line);
    }

    Ok(exit_status
        .and_then(|code| i32::try_from(code).ok())
        .unwrap_or(UNKNOWN_EXIT_STATUS))
}

fn emit(sink: &mut Option<OutputSink<'_>>, prefix: &str, line: &str) {
    if let Some(sink) = sink.as_mut() {
        if prefix.is_empty() {
            (*sink)(line);
        } else {
            (*sink)(&format!("{}{}", prefix, line));
        }
    }
}

//! Scripted in-memory transport for tests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use vmshell_core::config::ConnectionConfig;
use vmshell_core::traits::{RemoteCommand, RemoteSession, Transport};
use vmshell_core::{CommandEvent, Endpoint, TransportError};

use crate::connection::Connection;
use crate::liveness::LIVENESS_COMMAND;
use crate::reboot::FINGERPRINT_COMMAND;

/// Failure injected into the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fault {
    /// Transport reports a deadline expiry
    Timeout,
    /// Peer went away
    Disconnect,
    /// TCP connection refused
    Refused,
}

impl Fault {
    fn error(self) -> TransportError {
        match self {
            Fault::Timeout => TransportError::Timeout("read timed out".to_string()),
            Fault::Disconnect => TransportError::ChannelClosed,
            Fault::Refused => TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )),
        }
    }
}

/// How `Transport::open` behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenBehavior {
    Succeed,
    Fail(Fault),
    Hang,
}

/// One step of a scripted command
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Event(CommandEvent),
    Fail(Fault),
    Sleep(Duration),
    Hang,
}

impl Step {
    pub(crate) fn stdout(data: &str) -> Self {
        Step::Event(CommandEvent::Stdout(Bytes::copy_from_slice(data.as_bytes())))
    }

    pub(crate) fn stderr(data: &str) -> Self {
        Step::Event(CommandEvent::Stderr(Bytes::copy_from_slice(data.as_bytes())))
    }

    pub(crate) fn exit(code: u32) -> Self {
        Step::Event(CommandEvent::ExitStatus(code))
    }
}

#[derive(Debug)]
struct MockState {
    open: OpenBehavior,
    active: bool,
    boot_fingerprint: Option<String>,
    exec_fault: Option<Fault>,
    close_fault: Option<Fault>,
    scripts: HashMap<String, Vec<Step>>,
    opens: usize,
    closes: usize,
    cancels: usize,
    execs: Vec<String>,
}

impl Default for MockState {
    fn default() -> Self {
        let mut scripts = HashMap::new();
        scripts.insert(
            LIVENESS_COMMAND.to_string(),
            vec![Step::stdout("alive\n"), Step::exit(0)],
        );
        Self {
            open: OpenBehavior::Succeed,
            active: true,
            boot_fingerprint: Some("1700000000".to_string()),
            exec_fault: None,
            close_fault: None,
            scripts,
            opens: 0,
            closes: 0,
            cancels: 0,
            execs: Vec::new(),
        }
    }
}

/// Transport whose remote side is driven by scripts
#[derive(Debug, Clone, Default)]
pub(crate) struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn set_open(&self, open: OpenBehavior) {
        self.state().open = open;
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.state().active = active;
    }

    /// Change what the boot fingerprint query reports; `None` makes it fail
    pub(crate) fn set_boot_fingerprint(&self, fingerprint: Option<&str>) {
        self.state().boot_fingerprint = fingerprint.map(str::to_string);
    }

    pub(crate) fn set_exec_fault(&self, fault: Option<Fault>) {
        self.state().exec_fault = fault;
    }

    pub(crate) fn set_close_fault(&self, fault: Option<Fault>) {
        self.state().close_fault = fault;
    }

    pub(crate) fn script(&self, command: &str, steps: Vec<Step>) {
        self.state().scripts.insert(command.to_string(), steps);
    }

    pub(crate) fn opens(&self) -> usize {
        self.state().opens
    }

    pub(crate) fn closes(&self) -> usize {
        self.state().closes
    }

    pub(crate) fn cancels(&self) -> usize {
        self.state().cancels
    }

    pub(crate) fn execs(&self) -> Vec<String> {
        self.state().execs.clone()
    }

    /// Number of transport calls of any kind made so far
    pub(crate) fn calls(&self) -> usize {
        let state = self.state();
        state.opens + state.closes + state.cancels + state.execs.len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Session = MockSession;

    async fn open(
        &self,
        _endpoint: &Endpoint,
        _timeout: Duration,
    ) -> Result<MockSession, TransportError> {
        let open = {
            let mut state = self.state();
            state.opens += 1;
            state.open
        };
        match open {
            OpenBehavior::Succeed => Ok(MockSession {
                state: Arc::clone(&self.state),
            }),
            OpenBehavior::Fail(fault) => Err(fault.error()),
            OpenBehavior::Hang => std::future::pending().await,
        }
    }
}

#[derive(Debug)]
pub(crate) struct MockSession {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl RemoteSession for MockSession {
    type Command = MockCommand;

    fn is_active(&self) -> bool {
        self.state.lock().unwrap().active
    }

    async fn exec(&self, command: &str) -> Result<MockCommand, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.execs.push(command.to_string());
        if let Some(fault) = state.exec_fault {
            return Err(fault.error());
        }

        // An explicit script wins over the simulated fingerprint query
        let steps = if let Some(steps) = state.scripts.get(command) {
            steps.clone()
        } else if command == FINGERPRINT_COMMAND {
            match &state.boot_fingerprint {
                Some(fp) => vec![Step::stdout(&format!("{}\n", fp)), Step::exit(0)],
                None => vec![
                    Step::stderr("stat: cannot statx '/proc/1': Permission denied\n"),
                    Step::exit(1),
                ],
            }
        } else {
            vec![Step::exit(127)]
        };

        Ok(MockCommand {
            steps: steps.into(),
            state: Arc::clone(&self.state),
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.closes += 1;
        match state.close_fault {
            Some(fault) => Err(fault.error()),
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct MockCommand {
    steps: VecDeque<Step>,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl RemoteCommand for MockCommand {
    async fn next_event(&mut self) -> Result<Option<CommandEvent>, TransportError> {
        loop {
            match self.steps.pop_front() {
                Some(Step::Event(event)) => return Ok(Some(event)),
                Some(Step::Fail(fault)) => return Err(fault.error()),
                Some(Step::Sleep(duration)) => tokio::time::sleep(duration).await,
                Some(Step::Hang) => std::future::pending::<()>().await,
                None => return Ok(None),
            }
        }
    }

    async fn cancel(&mut self) -> Result<(), TransportError> {
        self.state.lock().unwrap().cancels += 1;
        self.steps.clear();
        Ok(())
    }
}

/// A connection to a fake `vm-01` driven by `transport`
pub(crate) fn connection(transport: &MockTransport) -> Connection<MockTransport> {
    let config = ConnectionConfig {
        host: "vm-01".to_string(),
        user: "tester".to_string(),
        private_key_path: "/keys/id_ed25519".into(),
        ..Default::default()
    };
    Connection::new(config, transport.clone())
}

/// Like [`connection`], already connected
pub(crate) async fn connected(transport: &MockTransport) -> Connection<MockTransport> {
    let mut conn = connection(transport);
    conn.connect(Duration::from_secs(30)).await.unwrap();
    conn
}

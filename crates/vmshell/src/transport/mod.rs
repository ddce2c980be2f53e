//! Transport implementations

mod ssh;

pub use ssh::{SshCommand, SshSession, SshTransport};

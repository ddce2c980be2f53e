//! Core trait definitions

mod transport;

pub use transport::{RemoteCommand, RemoteSession, Transport};

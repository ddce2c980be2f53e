//! vmshell-core: Core abstractions and configuration for vmshell
//!
//! This crate provides the error taxonomy, the transport traits and the
//! configuration structures shared by the connection engine and the CLI.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{ConfigError, ConnectionError, TransportError};
pub use types::{CommandEvent, Endpoint};

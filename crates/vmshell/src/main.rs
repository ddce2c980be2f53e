//! vmshell CLI
//!
//! Runs one command on a machine under test over SSH, streaming its output
//! and exiting with the remote exit status.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vmshell::{Connection, ConnectionError, SshTransport};
use vmshell_core::config::{self, ConnectionConfig};

#[derive(Parser)]
#[command(name = "vmshell")]
#[command(version, about = "Run a command on a machine under test over SSH")]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to connect to (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// SSH user (overrides config)
    #[arg(short, long)]
    user: Option<String>,

    /// Path to private key (overrides config)
    #[arg(short, long)]
    key: Option<PathBuf>,

    /// SSH port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Command timeout in seconds (overrides config)
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Reconnect and retry once if the connection is lost
    #[arg(long)]
    reconnect: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Command to run on the remote machine
    #[arg(required = true, trailing_var_arg = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout carries only the command's output
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&args)?;
    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or(config.command_timeout);
    let command = args.command.join(" ");
    let reconnect = args.reconnect;

    let mut conn = Connection::ssh(config);
    let status = conn
        .scoped(|conn| Box::pin(run_command(conn, command, timeout, reconnect)))
        .await
        .with_context(|| format!("Failed to run command on {}", conn.endpoint()))?;

    std::process::exit(status);
}

/// Load the config file (if any) and apply command-line overrides
fn load_config(args: &Args) -> Result<ConnectionConfig> {
    let path = args
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);

    let mut config = if path.exists() {
        config::load_config(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?
    } else {
        ConnectionConfig::default()
    };

    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(user) = &args.user {
        config.user = user.clone();
    }
    if let Some(key) = &args.key {
        config.private_key_path = key.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    config.validate().context("Invalid connection settings")?;
    Ok(config)
}

async fn run_command(
    conn: &mut Connection<SshTransport>,
    command: String,
    timeout: Duration,
    reconnect: bool,
) -> Result<i32, ConnectionError> {
    let mut print = |line: &str| println!("{}", line);

    if reconnect {
        conn.execute_with_reconnect(&command, timeout, Some(&mut print)).await
    } else {
        conn.execute(&command, timeout, Some(&mut print)).await
    }
}

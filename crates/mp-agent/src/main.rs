//! mcp-pipe
//!
//! Exposes a local stdio command (such as an MCP server) on a remote
//! WebSocket endpoint, reconnecting with exponential backoff whenever the
//! connection drops.
//!
//! ```text
//! export MCP_ENDPOINT=wss://example.com/mcp/?token=...
//! mcp-pipe python my_server.py
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mp_agent::tunnel::{install_crypto_provider, WebSocketDialer};
use mp_agent::Supervisor;
use mp_core::config::{self, PipeConfig};

#[derive(Parser)]
#[command(name = "mcp-pipe")]
#[command(about = "Bridge a WebSocket endpoint onto a local command's stdin/stdout")]
#[command(version)]
struct Args {
    /// WebSocket endpoint to connect to (ws:// or wss://)
    #[arg(long, env = "MCP_ENDPOINT", hide_env_values = true)]
    endpoint: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run with verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Command to run, followed by its arguments
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; stdout is left alone
    let log_level = if args.verbose {
        "debug"
    } else {
        &args.log_level
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = load_config(args.config.as_ref())?;

    // Apply environment and command-line overrides
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }
    if !args.command.is_empty() {
        config.command = args.command;
    }

    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        return Err(e).context("Invalid configuration");
    }

    install_crypto_provider();
    let dialer = WebSocketDialer::from_config(&config).context("Invalid endpoint")?;

    // Create cancellation token for shutdown
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let supervisor = Supervisor::from_config(dialer, &config, shutdown)
        .context("Invalid configuration")?;
    supervisor.run().await;

    tracing::info!("mcp-pipe shutdown complete");
    Ok(())
}

/// Load the config file, if one is given or present at the default path
fn load_config(explicit: Option<&PathBuf>) -> Result<PipeConfig> {
    if let Some(path) = explicit {
        return config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path));
    }

    let default_path = config::default_config_path();
    if default_path.exists() {
        Ok(config::load_config(&default_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
            PipeConfig::default()
        }))
    } else {
        Ok(PipeConfig::default())
    }
}

/// Shutdown signal kinds the bridge reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl ShutdownSignal {
    /// Conventional `128 + signo` exit code
    fn exit_code(self) -> i32 {
        match self {
            ShutdownSignal::Interrupt => 130,
            ShutdownSignal::Terminate => 143,
        }
    }
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "interrupt signal"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Ctrl+C and, on unix, SIGTERM listeners that can be awaited repeatedly
struct ShutdownSignals {
    #[cfg(unix)]
    terminate: Option<tokio::signal::unix::Signal>,
}

impl ShutdownSignals {
    fn install() -> Self {
        #[cfg(unix)]
        let terminate =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => Some(signal),
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    None
                }
            };

        Self {
            #[cfg(unix)]
            terminate,
        }
    }

    async fn recv(&mut self) -> ShutdownSignal {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match self.terminate.as_mut() {
                Some(signal) => {
                    if signal.recv().await.is_none() {
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => ShutdownSignal::Interrupt,
            _ = terminate => ShutdownSignal::Terminate,
        }
    }
}

/// Cancel `shutdown` on the first Ctrl+C or SIGTERM.
///
/// A second signal exits at once with `128 + signo`, without waiting for
/// the session teardown.
fn spawn_signal_handler(shutdown: CancellationToken) {
    let mut signals = ShutdownSignals::install();

    tokio::spawn(async move {
        let first = signals.recv().await;
        tracing::info!("Received {}, shutting down...", first);
        shutdown.cancel();

        let second = signals.recv().await;
        tracing::warn!("Received {} again, exiting without teardown", second);
        std::process::exit(second.exit_code());
    });
}

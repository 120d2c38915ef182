//! Core error types for mcp-pipe

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors on the remote message channel.
///
/// These are recoverable: they end the current attempt or session and the
/// supervisor retries with backoff.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The WebSocket handshake failed
    #[error("Failed to connect to {endpoint}: {reason}")]
    Handshake { endpoint: String, reason: String },

    /// The WebSocket handshake did not complete in time
    #[error("Handshake with {endpoint} timed out after {timeout:?}")]
    HandshakeTimeout { endpoint: String, timeout: Duration },

    /// Reading a message from the channel failed
    #[error("Channel read failed: {0}")]
    Read(String),

    /// Writing a message to the channel failed
    #[error("Channel write failed: {0}")]
    Write(String),

    /// The peer closed the channel
    #[error("Channel closed by peer")]
    Closed,
}

/// Errors while starting or supervising the child process
#[derive(Error, Debug)]
pub enum SessionError {
    /// The child process could not be spawned
    #[error("Failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A stdio pipe was not attached to the child
    #[error("Child process has no {0} pipe")]
    MissingPipe(&'static str),

    /// Waiting on the child failed
    #[error("Failed to wait for child process: {0}")]
    Wait(#[source] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// No endpoint configured
    #[error("Missing endpoint: please set the `MCP_ENDPOINT` environment variable")]
    MissingEndpoint,

    /// Endpoint is not a WebSocket URL
    #[error("Invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// No command to run
    #[error("Missing command: usage: mcp-pipe <command> [args...]")]
    MissingCommand,
}

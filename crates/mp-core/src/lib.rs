//! mp-core: Core abstractions and configuration for mcp-pipe
//!
//! This crate provides the configuration structures, error taxonomy and
//! channel traits shared by the bridge agent and its tests.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{ConfigError, SessionError, TransportError};
pub use types::CommandSpec;

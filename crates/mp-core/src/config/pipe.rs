//! Bridge configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::backoff::BackoffConfig;
use super::serde_utils::{duration_millis, duration_secs};
use crate::error::ConfigError;
use crate::types::CommandSpec;

/// Environment variable holding the remote endpoint
pub const ENDPOINT_ENV: &str = "MCP_ENDPOINT";

/// Configuration for the stdio bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipeConfig {
    /// WebSocket endpoint (`ws://` or `wss://`) to bridge the child onto.
    ///
    /// Usually supplied through `MCP_ENDPOINT` rather than the config file.
    pub endpoint: String,

    /// Command to run, program first
    pub command: Vec<String>,

    /// WebSocket handshake timeout
    #[serde(with = "duration_secs")]
    pub handshake_timeout: Duration,

    /// Backoff configuration for reconnections
    pub backoff: BackoffConfig,

    /// Chunk size for passing the child's stderr through
    pub stderr_chunk_size: usize,

    /// How long a child may keep running after its stdin was closed
    /// because the channel went away
    #[serde(with = "duration_secs")]
    pub child_grace: Duration,

    /// How long teardown waits for each forwarder before aborting it
    #[serde(with = "duration_millis")]
    pub teardown_timeout: Duration,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            command: Vec::new(),
            handshake_timeout: Duration::from_secs(30),
            backoff: BackoffConfig::default(),
            stderr_chunk_size: 1024,
            child_grace: Duration::from_secs(5),
            teardown_timeout: Duration::from_millis(500),
        }
    }
}

impl PipeConfig {
    /// Check that the configuration can drive a bridge.
    ///
    /// The endpoint is checked first so a bare invocation reports the
    /// missing `MCP_ENDPOINT` before anything else.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url()?;
        self.command_spec()?;

        if self.stderr_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "stderr_chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.backoff.initial > self.backoff.max {
            return Err(ConfigError::Invalid(format!(
                "backoff.initial ({:?}) exceeds backoff.max ({:?})",
                self.backoff.initial, self.backoff.max
            )));
        }

        Ok(())
    }

    /// Parse the endpoint as a WebSocket URL
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }

        let url = Url::parse(endpoint).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(ConfigError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: format!("unsupported scheme `{}`, expected ws or wss", other),
            }),
        }
    }

    /// The command to spawn for each session
    pub fn command_spec(&self) -> Result<CommandSpec, ConfigError> {
        CommandSpec::from_argv(self.command.iter().cloned())
    }
}

/// Render an endpoint for logs without its query string or credentials.
///
/// Hosted MCP endpoints usually carry an access token in the query.
pub fn redact_endpoint(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    // Only fails for cannot-be-a-base URLs, which ws/wss never are
    let _ = url.set_username("");
    let _ = url.set_password(None);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_endpoint_strips_token() {
        let url = Url::parse("wss://user:pw@api.example.com/mcp/?token=secret").unwrap();
        assert_eq!(redact_endpoint(&url), "wss://api.example.com/mcp/");
    }

    fn valid() -> PipeConfig {
        PipeConfig {
            endpoint: "wss://api.example.com/mcp/?token=abc".to_string(),
            command: vec!["python".to_string(), "server.py".to_string()],
            ..PipeConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = PipeConfig::default();
        assert_eq!(config.handshake_timeout, Duration::from_secs(30));
        assert_eq!(config.backoff.initial, Duration::from_secs(1));
        assert_eq!(config.backoff.max, Duration::from_secs(600));
        assert_eq!(config.stderr_chunk_size, 1024);
    }

    #[test]
    fn test_validate_accepts_websocket_endpoint() {
        let config = valid();
        config.validate().unwrap();
        assert_eq!(config.endpoint_url().unwrap().scheme(), "wss");
    }

    #[test]
    fn test_missing_endpoint_reported_first() {
        let config = PipeConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingEndpoint)
        ));
    }

    #[test]
    fn test_missing_command() {
        let config = PipeConfig {
            command: vec![],
            ..valid()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MissingCommand)));
    }

    #[test]
    fn test_rejects_http_endpoint() {
        let config = PipeConfig {
            endpoint: "http://example.com".to_string(),
            ..valid()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_rejects_inverted_backoff() {
        let mut config = valid();
        config.backoff.initial = Duration::from_secs(10);
        config.backoff.max = Duration::from_secs(5);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: PipeConfig = toml::from_str(
            r#"
            command = ["node", "index.js"]
            handshake_timeout = 10
            teardown_timeout = 250

            [backoff]
            max = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.command, vec!["node", "index.js"]);
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert_eq!(config.teardown_timeout, Duration::from_millis(250));
        assert_eq!(config.backoff.initial, Duration::from_secs(1));
        assert_eq!(config.backoff.max, Duration::from_secs(60));
        assert!(config.endpoint.is_empty());
    }
}

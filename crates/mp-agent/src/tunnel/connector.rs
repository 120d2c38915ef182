//! Outbound WebSocket connector
//!
//! Establishes the channel to the remote endpoint and adapts the split
//! WebSocket stream to the [`MessageSource`]/[`MessageSink`] traits.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use mp_core::config::{redact_endpoint, PipeConfig};
use mp_core::traits::{ChannelConnection, Dialer, MessageSink, MessageSource};
use mp_core::{ConfigError, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Install the process-wide TLS crypto provider used for `wss://` endpoints.
///
/// Safe to call more than once.
pub fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::trace!("TLS crypto provider already installed");
    }
}

/// Opens WebSocket connections to the configured endpoint
#[derive(Debug, Clone)]
pub struct WebSocketDialer {
    /// Endpoint as configured, including any access token
    endpoint: String,
    /// Endpoint with credentials stripped, for logging
    display: String,
    /// Upper bound on the opening handshake
    handshake_timeout: Duration,
}

impl WebSocketDialer {
    /// Create a dialer from a validated configuration
    pub fn from_config(config: &PipeConfig) -> Result<Self, ConfigError> {
        let url = config.endpoint_url()?;
        Ok(Self {
            endpoint: config.endpoint.trim().to_string(),
            display: redact_endpoint(&url),
            handshake_timeout: config.handshake_timeout,
        })
    }

    /// Handshake timeout applied to each attempt
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }
}

#[async_trait]
impl Dialer for WebSocketDialer {
    fn endpoint(&self) -> &str {
        &self.display
    }

    async fn open(&self) -> Result<ChannelConnection, TransportError> {
        tracing::info!("Connecting to WebSocket server {}...", self.display);

        let (stream, response) = tokio::time::timeout(
            self.handshake_timeout,
            tokio_tungstenite::connect_async(self.endpoint.as_str()),
        )
        .await
        .map_err(|_| TransportError::HandshakeTimeout {
            endpoint: self.display.clone(),
            timeout: self.handshake_timeout,
        })?
        .map_err(|e| TransportError::Handshake {
            endpoint: self.display.clone(),
            reason: e.to_string(),
        })?;

        tracing::debug!("Handshake completed with status {}", response.status());

        let (sink, stream) = stream.split();
        Ok(ChannelConnection::new(
            self.display.clone(),
            Box::new(WsSource { stream }),
            Box::new(WsSink { sink, closed: false }),
        ))
    }
}

/// Read half of a WebSocket channel
struct WsSource {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl MessageSource for WsSource {
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.into_bytes()),
                Some(Ok(Message::Binary(data))) => return Ok(data),
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!("Close frame received: {:?}", frame);
                    return Err(TransportError::Closed);
                }
                // Pings are answered by tungstenite on the next read or write
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    return Err(TransportError::Closed)
                }
                Some(Err(e)) => return Err(TransportError::Read(e.to_string())),
            }
        }
    }
}

/// Write half of a WebSocket channel
struct WsSink {
    sink: SplitSink<WsStream, Message>,
    closed: bool,
}

#[async_trait]
impl MessageSink for WsSink {
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Write("channel already closed".to_string()));
        }

        self.sink
            .send(to_message(payload))
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }

        match self.sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Write(e.to_string())),
        }
    }
}

/// Text frame for UTF-8 payloads, binary frame otherwise
fn to_message(payload: Vec<u8>) -> Message {
    match String::from_utf8(payload) {
        Ok(text) => Message::Text(text),
        Err(e) => Message::Binary(e.into_bytes()),
    }
}

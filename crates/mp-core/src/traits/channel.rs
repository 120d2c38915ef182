//! Channel traits

use async_trait::async_trait;

use crate::error::TransportError;

/// Read half of a message channel
#[async_trait]
pub trait MessageSource: Send {
    /// Receive the next data message.
    ///
    /// Control traffic (pings, pongs) is handled by the implementation and
    /// never surfaces here. A clean close by the peer is reported as
    /// [`TransportError::Closed`].
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError>;
}

/// Write half of a message channel
#[async_trait]
pub trait MessageSink: Send {
    /// Send one message
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Close the channel. Calling this more than once is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// An open bidirectional channel to the remote peer
pub struct ChannelConnection {
    peer: String,
    source: Box<dyn MessageSource>,
    sink: Box<dyn MessageSink>,
}

impl ChannelConnection {
    /// Assemble a connection from its two halves
    pub fn new(
        peer: impl Into<String>,
        source: Box<dyn MessageSource>,
        sink: Box<dyn MessageSink>,
    ) -> Self {
        Self {
            peer: peer.into(),
            source,
            sink,
        }
    }

    /// Description of the remote end, for logging
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Split into the read and write halves so each can be owned by one task
    pub fn into_split(self) -> (Box<dyn MessageSource>, Box<dyn MessageSink>) {
        (self.source, self.sink)
    }

    /// Close the connection without using it
    pub async fn close(mut self) -> Result<(), TransportError> {
        self.sink.close().await
    }
}

impl std::fmt::Debug for ChannelConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConnection")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// Opens channel connections to a fixed endpoint
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Endpoint this dialer connects to, for logging
    fn endpoint(&self) -> &str;

    /// Perform one connection attempt
    async fn open(&self) -> Result<ChannelConnection, TransportError>;
}

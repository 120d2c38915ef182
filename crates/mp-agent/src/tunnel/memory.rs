//! In-process channel
//!
//! A [`ChannelConnection`] backed by tokio mpsc queues, with a
//! [`MemoryPeer`] handle playing the remote side. Used to drive sessions
//! without a network.

use async_trait::async_trait;
use tokio::sync::mpsc;

use mp_core::traits::{ChannelConnection, MessageSink, MessageSource};
use mp_core::TransportError;

/// Create a connected channel and the handle for its remote end
pub fn channel_pair(capacity: usize) -> (ChannelConnection, MemoryPeer) {
    let (to_bridge, from_peer) = mpsc::channel(capacity);
    let (to_peer, from_bridge) = mpsc::channel(capacity);

    let connection = ChannelConnection::new(
        "memory",
        Box::new(MemorySource { rx: from_peer }),
        Box::new(MemorySink { tx: Some(to_peer) }),
    );
    let peer = MemoryPeer {
        tx: Some(to_bridge),
        rx: from_bridge,
    };

    (connection, peer)
}

/// Remote side of an in-process channel
#[derive(Debug)]
pub struct MemoryPeer {
    tx: Option<mpsc::Sender<Result<Vec<u8>, TransportError>>>,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl MemoryPeer {
    /// Deliver a message to the bridge. Returns false once the bridge is gone
    pub async fn send(&self, payload: impl Into<Vec<u8>>) -> bool {
        match &self.tx {
            Some(tx) => tx.send(Ok(payload.into())).await.is_ok(),
            None => false,
        }
    }

    /// Make the bridge's next read fail with `error`
    pub async fn fail(&self, error: TransportError) -> bool {
        match &self.tx {
            Some(tx) => tx.send(Err(error)).await.is_ok(),
            None => false,
        }
    }

    /// Close the remote end; the bridge's reads then report a closed channel
    pub fn close(&mut self) {
        self.tx = None;
    }

    /// Next message sent by the bridge, or `None` once it closed its sink
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

struct MemorySource {
    rx: mpsc::Receiver<Result<Vec<u8>, TransportError>>,
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        self.rx.recv().await.unwrap_or(Err(TransportError::Closed))
    }
}

struct MemorySink {
    tx: Option<mpsc::Sender<Vec<u8>>>,
}

#[async_trait]
impl MessageSink for MemorySink {
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| TransportError::Write("channel already closed".to_string()))?;

        tx.send(payload)
            .await
            .map_err(|_| TransportError::Write("peer went away".to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

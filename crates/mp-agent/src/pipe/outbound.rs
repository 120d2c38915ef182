//! Child stdout → channel

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use mp_core::traits::MessageSink;
use mp_core::TransportError;

use super::{report_failure, PipeExit};

/// Forward each line the child writes to stdout as one channel message.
///
/// The line terminator (`\n` or `\r\n`) is stripped; an unterminated final
/// line is still forwarded. A send error is reported on `failures`. The sink
/// is closed on return, which closes the channel.
pub async fn forward_outbound<R>(
    stdout: R,
    mut sink: Box<dyn MessageSink>,
    token: CancellationToken,
    failures: mpsc::Sender<TransportError>,
) -> PipeExit
where
    R: AsyncRead + Unpin + Send,
{
    let mut reader = BufReader::new(stdout);
    let mut line = Vec::new();

    let exit = loop {
        if token.is_cancelled() {
            break PipeExit::Cancelled;
        }

        line.clear();
        let read = tokio::select! {
            biased;
            _ = token.cancelled() => break PipeExit::Cancelled,
            read = reader.read_until(b'\n', &mut line) => read,
        };

        match read {
            Ok(0) => break PipeExit::SourceClosed,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Error reading from process stdout: {}", e);
                break PipeExit::SourceClosed;
            }
        }

        strip_line_ending(&mut line);
        tracing::info!(">> {}", String::from_utf8_lossy(&line));

        let sent = tokio::select! {
            biased;
            _ = token.cancelled() => break PipeExit::Cancelled,
            sent = sink.send(std::mem::take(&mut line)) => sent,
        };

        if let Err(e) = sent {
            tracing::warn!("Error sending data to WebSocket: {}", e);
            report_failure(&failures, e);
            break PipeExit::ChannelFailed;
        }
    };

    if let Err(e) = sink.close().await {
        tracing::debug!("Closing channel: {}", e);
    }

    tracing::debug!("Outbound pipe stopped: {:?}", exit);
    exit
}

fn strip_line_ending(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::test_io::FailingReader;
    use crate::tunnel::memory::channel_pair;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_strip_line_ending() {
        let mut unix = b"abc\n".to_vec();
        strip_line_ending(&mut unix);
        assert_eq!(unix, b"abc");

        let mut dos = b"abc\r\n".to_vec();
        strip_line_ending(&mut dos);
        assert_eq!(dos, b"abc");

        let mut bare = b"abc\r".to_vec();
        strip_line_ending(&mut bare);
        assert_eq!(bare, b"abc\r");
    }

    #[tokio::test]
    async fn test_lines_become_messages_in_order() {
        let (connection, mut peer) = channel_pair(8);
        let (_source, sink) = connection.into_split();
        let (stdout, mut child_side) = tokio::io::duplex(1024);
        let (failures, _failure_rx) = mpsc::channel(1);

        let task = tokio::spawn(forward_outbound(
            stdout,
            sink,
            CancellationToken::new(),
            failures,
        ));

        child_side
            .write_all(b"{\"result\":1}\r\n\nsecond\nunterminated")
            .await
            .unwrap();
        drop(child_side);

        assert_eq!(task.await.unwrap(), PipeExit::SourceClosed);

        let mut messages = Vec::new();
        while let Some(message) = peer.recv().await {
            messages.push(message);
        }
        assert_eq!(
            messages,
            vec![
                b"{\"result\":1}".to_vec(),
                b"".to_vec(),
                b"second".to_vec(),
                b"unterminated".to_vec(),
            ]
        );
    }

    #[tokio::test]
    async fn test_send_error_reported() {
        let (connection, peer) = channel_pair(8);
        let (_source, sink) = connection.into_split();
        let (stdout, mut child_side) = tokio::io::duplex(1024);
        let (failures, mut failure_rx) = mpsc::channel(1);
        drop(peer);

        let task = tokio::spawn(forward_outbound(
            stdout,
            sink,
            CancellationToken::new(),
            failures,
        ));

        child_side.write_all(b"hello\n").await.unwrap();

        assert_eq!(task.await.unwrap(), PipeExit::ChannelFailed);
        assert!(matches!(
            failure_rx.recv().await,
            Some(TransportError::Write(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_closes_channel() {
        let (connection, mut peer) = channel_pair(8);
        let (_source, sink) = connection.into_split();
        let (stdout, _child_side) = tokio::io::duplex(1024);
        let (failures, _failure_rx) = mpsc::channel(1);
        let token = CancellationToken::new();

        let task = tokio::spawn(forward_outbound(stdout, sink, token.clone(), failures));

        tokio::task::yield_now().await;
        token.cancel();

        assert_eq!(task.await.unwrap(), PipeExit::Cancelled);
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test]
    async fn test_read_error_closes_channel() {
        let (connection, mut peer) = channel_pair(8);
        let (_source, sink) = connection.into_split();
        let (failures, mut failure_rx) = mpsc::channel(1);

        let exit = forward_outbound(FailingReader, sink, CancellationToken::new(), failures).await;

        assert_eq!(exit, PipeExit::SourceClosed);
        assert_eq!(peer.recv().await, None);
        // A broken child pipe is not a channel failure
        assert!(failure_rx.try_recv().is_err());
    }
}

//! Channel → child stdin

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use mp_core::traits::MessageSource;
use mp_core::TransportError;

use super::{report_failure, PipeExit};

/// Forward each channel message to the child's stdin as one line.
///
/// A read error or peer close is reported on `failures`. Whatever the reason
/// for stopping, `stdin` is shut down and dropped on return so the child
/// sees end-of-input.
pub async fn forward_inbound<W>(
    mut source: Box<dyn MessageSource>,
    mut stdin: W,
    token: CancellationToken,
    failures: mpsc::Sender<TransportError>,
) -> PipeExit
where
    W: AsyncWrite + Unpin + Send,
{
    let exit = loop {
        if token.is_cancelled() {
            break PipeExit::Cancelled;
        }

        let received = tokio::select! {
            biased;
            _ = token.cancelled() => break PipeExit::Cancelled,
            received = source.recv() => received,
        };

        let mut message = match received {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Error in WebSocket to process pipe: {}", e);
                report_failure(&failures, e);
                break PipeExit::ChannelFailed;
            }
        };

        tracing::info!("<< {}", String::from_utf8_lossy(&message));
        message.push(b'\n');

        let written = tokio::select! {
            biased;
            _ = token.cancelled() => break PipeExit::Cancelled,
            written = write_line(&mut stdin, &message) => written,
        };

        if let Err(e) = written {
            tracing::warn!("Error writing to process stdin: {}", e);
            break PipeExit::SinkClosed;
        }
    };

    if let Err(e) = stdin.shutdown().await {
        tracing::debug!("Closing process stdin: {}", e);
    }
    drop(stdin);

    tracing::debug!("Inbound pipe stopped: {:?}", exit);
    exit
}

async fn write_line<W>(stdin: &mut W, line: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    stdin.write_all(line).await?;
    stdin.flush().await
}

//! Child stderr → local stderr

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::PipeExit;

/// Copy the child's stderr to `out` chunk by chunk, unmodified.
///
/// Not line-buffered: whatever a single read returns is written straight
/// through. Stops after the first zero-length read or read error.
pub async fn forward_diagnostics<R, W>(
    mut stderr: R,
    mut out: W,
    chunk_size: usize,
    token: CancellationToken,
) -> PipeExit
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut buf = vec![0u8; chunk_size.max(1)];

    let exit = loop {
        if token.is_cancelled() {
            break PipeExit::Cancelled;
        }

        let read = tokio::select! {
            biased;
            _ = token.cancelled() => break PipeExit::Cancelled,
            read = stderr.read(&mut buf) => read,
        };

        let n = match read {
            Ok(0) => {
                tracing::debug!("Process has ended stderr output");
                break PipeExit::SourceClosed;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Error reading from process stderr: {}", e);
                break PipeExit::SourceClosed;
            }
        };

        if let Err(e) = write_chunk(&mut out, &buf[..n]).await {
            tracing::warn!("Error writing process stderr to terminal: {}", e);
            break PipeExit::SinkClosed;
        }
    };

    tracing::debug!("Diagnostic pipe stopped: {:?}", exit);
    exit
}

async fn write_chunk<W>(out: &mut W, chunk: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(chunk).await?;
    out.flush().await
}

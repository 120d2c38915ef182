//! Stream forwarders between the channel and the child process
//!
//! Each forwarder owns the streams it moves data between and runs until its
//! source ends, its destination refuses a write, or the session's
//! [`CancellationToken`](tokio_util::sync::CancellationToken) fires. The
//! token only stops the local loop: what the other side observes is the
//! owned stream being closed when the forwarder returns (the child's stdin
//! for the inbound pipe, the channel sink for the outbound pipe).

mod diagnostic;
mod inbound;
mod outbound;

pub use diagnostic::forward_diagnostics;
pub use inbound::forward_inbound;
pub use outbound::forward_outbound;

use tokio::sync::mpsc;

use mp_core::TransportError;

/// Why a forwarder stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeExit {
    /// The session cancelled the forwarder
    Cancelled,
    /// The source stream reached end-of-stream or failed to read
    SourceClosed,
    /// The destination stream refused a write
    SinkClosed,
    /// The channel failed; the error was reported to the session
    ChannelFailed,
}

/// Hand a terminal channel error to the session.
///
/// Only the first failure matters, so a full or closed queue is ignored.
fn report_failure(failures: &mpsc::Sender<TransportError>, error: TransportError) {
    if failures.try_send(error).is_err() {
        tracing::trace!("Session already notified of a channel failure");
    }
}

#[cfg(test)]
pub(crate) mod test_io {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::io::{AsyncRead, ReadBuf};

    /// Reader whose every read fails, like a pipe to a crashed process
    pub(crate) struct FailingReader;

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "pipe broken",
            )))
        }
    }
}

//! One connect-and-pipe cycle
//!
//! A session owns one channel connection and one child process. It starts
//! the three forwarders, waits for the child to exit (or the channel to fail,
//! or shutdown), and tears everything down before returning.

use std::process::ExitStatus;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use mp_core::config::PipeConfig;
use mp_core::traits::ChannelConnection;
use mp_core::{CommandSpec, SessionError, TransportError};

use crate::pipe::{forward_diagnostics, forward_inbound, forward_outbound, PipeExit};
use crate::process::ChildProcess;

/// Failure reports queued from forwarders; only the first one is acted on
const FAILURE_QUEUE_CAPACITY: usize = 2;

/// Tunables for session teardown and stderr passthrough
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Read size for the stderr passthrough
    pub stderr_chunk_size: usize,
    /// Time the child gets to exit after its stdin is closed
    pub child_grace: Duration,
    /// Time each forwarder gets to finish before it is aborted
    pub teardown_timeout: Duration,
}

impl SessionSettings {
    /// Take the session tunables from the bridge configuration
    pub fn from_config(config: &PipeConfig) -> Self {
        Self {
            stderr_chunk_size: config.stderr_chunk_size,
            child_grace: config.child_grace,
            teardown_timeout: config.teardown_timeout,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&PipeConfig::default())
    }
}

/// What ended a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The child process exited
    ChildExited,
    /// A forwarder reported the channel dead
    ChannelFailed,
    /// Program shutdown was requested
    Shutdown,
}

/// How each forwarder stopped; `None` if it had to be aborted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipeExits {
    pub inbound: Option<PipeExit>,
    pub outbound: Option<PipeExit>,
    pub diagnostic: Option<PipeExit>,
}

/// Result of a completed session, for logging
#[derive(Debug)]
pub struct SessionOutcome {
    /// What ended the session
    pub ended_by: SessionEnd,
    /// Exit status of the child, if it was reaped
    pub exit_status: Option<ExitStatus>,
    /// First channel error reported by a forwarder
    pub transport_error: Option<TransportError>,
    /// Forwarder stop reasons
    pub pipes: PipeExits,
    /// Time from spawn to teardown
    pub duration: Duration,
}

enum Trigger {
    Exited(Result<ExitStatus, SessionError>),
    ChannelFailed(TransportError),
    Shutdown,
}

/// Runs sessions of one command over successive connections
#[derive(Debug, Clone)]
pub struct Session {
    command: CommandSpec,
    settings: SessionSettings,
}

impl Session {
    /// Create a session runner for `command`
    pub fn new(command: CommandSpec, settings: SessionSettings) -> Self {
        Self { command, settings }
    }

    /// Bridge `connection` onto a fresh child process until one side goes away.
    ///
    /// Returns an error only when the child could not be started; the
    /// connection is closed in that case too. Every other ending is an
    /// `Ok` outcome. When this returns, the child has been reaped and all
    /// forwarder tasks have finished or been aborted.
    pub async fn run(
        &self,
        connection: ChannelConnection,
        shutdown: &CancellationToken,
    ) -> Result<SessionOutcome, SessionError> {
        let started = Instant::now();

        let (mut child, pipes) = match ChildProcess::spawn(&self.command) {
            Ok(spawned) => spawned,
            Err(e) => {
                self.close_unused(connection).await;
                return Err(e);
            }
        };

        let token = shutdown.child_token();
        let (failure_tx, mut failures) = mpsc::channel(FAILURE_QUEUE_CAPACITY);
        let (source, sink) = connection.into_split();

        let inbound = tokio::spawn(forward_inbound(
            source,
            pipes.stdin,
            token.clone(),
            failure_tx.clone(),
        ));
        let outbound = tokio::spawn(forward_outbound(
            pipes.stdout,
            sink,
            token.clone(),
            failure_tx,
        ));
        let diagnostic = tokio::spawn(forward_diagnostics(
            pipes.stderr,
            tokio::io::stderr(),
            self.settings.stderr_chunk_size,
            token.clone(),
        ));

        let trigger = tokio::select! {
            biased;
            _ = shutdown.cancelled() => Trigger::Shutdown,
            Some(error) = failures.recv() => Trigger::ChannelFailed(error),
            status = child.wait() => Trigger::Exited(status),
        };

        let timeout = self.settings.teardown_timeout;
        let mut transport_error = None;
        let mut exits = PipeExits::default();

        let (ended_by, exit_status) = match trigger {
            Trigger::Exited(status) => {
                // Let the child's last output reach the channel and terminal
                exits.outbound = join_forwarder("outbound", outbound, timeout).await;
                exits.diagnostic = join_forwarder("diagnostic", diagnostic, timeout).await;
                token.cancel();
                exits.inbound = join_forwarder("inbound", inbound, timeout).await;

                let status = match status {
                    Ok(status) => {
                        tracing::info!(
                            "Process `{}` (pid {:?}) exited: {}",
                            child.command(),
                            child.pid(),
                            status
                        );
                        Some(status)
                    }
                    Err(e) => {
                        tracing::warn!("{}", e);
                        None
                    }
                };
                (SessionEnd::ChildExited, status)
            }
            Trigger::ChannelFailed(error) => {
                tracing::warn!("Channel failed, stopping `{}`: {}", child.command(), error);
                transport_error = Some(error);
                token.cancel();
                let status = self.reap(&mut child).await;
                exits = join_all(inbound, outbound, diagnostic, timeout).await;
                (SessionEnd::ChannelFailed, status)
            }
            Trigger::Shutdown => {
                tracing::info!("Shutdown requested, stopping `{}`", child.command());
                token.cancel();
                let status = self.reap(&mut child).await;
                exits = join_all(inbound, outbound, diagnostic, timeout).await;
                (SessionEnd::Shutdown, status)
            }
        };

        if transport_error.is_none() {
            transport_error = failures.try_recv().ok();
        }

        Ok(SessionOutcome {
            ended_by,
            exit_status,
            transport_error,
            pipes: exits,
            duration: started.elapsed(),
        })
    }

    async fn reap(&self, child: &mut ChildProcess) -> Option<ExitStatus> {
        match child.terminate(self.settings.child_grace).await {
            Ok(status) => {
                tracing::info!(
                    "Process `{}` (pid {:?}) exited: {}",
                    child.command(),
                    child.pid(),
                    status
                );
                Some(status)
            }
            Err(e) => {
                tracing::warn!("{}", e);
                None
            }
        }
    }

    async fn close_unused(&self, connection: ChannelConnection) {
        match tokio::time::timeout(self.settings.teardown_timeout, connection.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!("Closing channel: {}", e),
            Err(_) => tracing::debug!("Timed out closing channel"),
        }
    }
}

async fn join_all(
    inbound: JoinHandle<PipeExit>,
    outbound: JoinHandle<PipeExit>,
    diagnostic: JoinHandle<PipeExit>,
    timeout: Duration,
) -> PipeExits {
    let (inbound, outbound, diagnostic) = tokio::join!(
        join_forwarder("inbound", inbound, timeout),
        join_forwarder("outbound", outbound, timeout),
        join_forwarder("diagnostic", diagnostic, timeout),
    );
    PipeExits {
        inbound,
        outbound,
        diagnostic,
    }
}

/// Wait up to `timeout` for a forwarder, aborting it if it is still running
async fn join_forwarder(
    name: &str,
    mut handle: JoinHandle<PipeExit>,
    timeout: Duration,
) -> Option<PipeExit> {
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(exit)) => Some(exit),
        Ok(Err(e)) => {
            tracing::error!("{} pipe task failed: {}", name, e);
            None
        }
        Err(_) => {
            tracing::debug!("{} pipe did not stop within {:?}, aborting", name, timeout);
            handle.abort();
            None
        }
    }
}

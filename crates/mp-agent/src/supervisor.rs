//! Reconnection supervisor
//!
//! Runs sessions back to back for the life of the program. A failed attempt
//! (the channel could not be opened, or the child could not be started)
//! grows the backoff; any session that ran resets it, so the next connection
//! is attempted immediately.

use std::process::ExitStatus;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use mp_core::config::PipeConfig;
use mp_core::traits::Dialer;
use mp_core::ConfigError;

use crate::session::{Session, SessionEnd, SessionSettings};
use crate::tunnel::ExponentialBackoff;

/// State transitions published by the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// Sleeping before a retry
    Waiting { attempt: u32, delay: Duration },
    /// Opening the channel
    Connecting { attempt: u32 },
    /// Channel open, session starting
    Connected,
    /// The attempt failed before a session could run
    AttemptFailed { attempt: u32, reason: String },
    /// A session ran and was torn down
    SessionEnded {
        ended_by: SessionEnd,
        exit_status: Option<ExitStatus>,
    },
    /// Shutdown observed, the supervisor returned
    Stopped,
}

/// Sequences sessions, applying backoff between failed attempts
pub struct Supervisor<D> {
    /// Opens the channel for each attempt
    dialer: D,
    /// Runs the child over an open channel
    session: Session,
    /// Failed attempts since the last successful session
    backoff: ExponentialBackoff,
    /// Program-wide shutdown signal
    shutdown: CancellationToken,
    /// Optional observer of state transitions
    events: Option<mpsc::UnboundedSender<SupervisorEvent>>,
}

impl<D: Dialer> Supervisor<D> {
    /// Create a supervisor from its parts
    pub fn new(
        dialer: D,
        session: Session,
        backoff: ExponentialBackoff,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            dialer,
            session,
            backoff,
            shutdown,
            events: None,
        }
    }

    /// Create a supervisor for a validated bridge configuration
    pub fn from_config(
        dialer: D,
        config: &PipeConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let session = Session::new(config.command_spec()?, SessionSettings::from_config(config));
        Ok(Self::new(
            dialer,
            session,
            ExponentialBackoff::from_config(&config.backoff),
            shutdown,
        ))
    }

    /// Publish state transitions on `events`
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SupervisorEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run until shutdown is requested.
    ///
    /// Shutdown is checked before every sleep and every connection attempt,
    /// and interrupts the sleep, the handshake and an active session.
    pub async fn run(mut self) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let attempt = self.backoff.attempt();
            if attempt > 0 {
                let delay = self.backoff.next_delay();
                tracing::info!(
                    "Waiting {:?} before reconnection attempt {}...",
                    delay,
                    attempt
                );
                self.emit(SupervisorEvent::Waiting { attempt, delay });

                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            if self.shutdown.is_cancelled() {
                break;
            }
            self.emit(SupervisorEvent::Connecting { attempt });

            let opened = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                opened = self.dialer.open() => opened,
            };

            let connection = match opened {
                Ok(connection) => connection,
                Err(e) => {
                    self.attempt_failed(e.to_string());
                    continue;
                }
            };

            tracing::info!(
                "Successfully connected to WebSocket server {}",
                connection.peer()
            );
            self.emit(SupervisorEvent::Connected);

            match self.session.run(connection, &self.shutdown).await {
                Ok(outcome) => {
                    match &outcome.transport_error {
                        Some(e) => tracing::info!(
                            "Session ended after {:?} ({:?}): {}",
                            outcome.duration,
                            outcome.ended_by,
                            e
                        ),
                        None => tracing::info!(
                            "Session ended after {:?} ({:?})",
                            outcome.duration,
                            outcome.ended_by
                        ),
                    }
                    tracing::debug!("Pipe exits: {:?}", outcome.pipes);

                    self.backoff.reset();
                    self.emit(SupervisorEvent::SessionEnded {
                        ended_by: outcome.ended_by,
                        exit_status: outcome.exit_status,
                    });
                }
                Err(e) => {
                    tracing::error!("{}", e);
                    self.attempt_failed(e.to_string());
                }
            }
        }

        tracing::info!("Supervisor stopped");
        self.emit(SupervisorEvent::Stopped);
    }

    fn attempt_failed(&mut self, reason: String) {
        let attempt = self.backoff.record_failure();
        tracing::warn!("Connection closed (attempt: {}): {}", attempt, reason);
        self.emit(SupervisorEvent::AttemptFailed { attempt, reason });
    }

    fn emit(&self, event: SupervisorEvent) {
        if let Some(events) = &self.events {
            // A dropped observer is not an error
            let _ = events.send(event);
        }
    }
}

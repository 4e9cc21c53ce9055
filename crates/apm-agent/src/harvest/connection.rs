// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ownership of the collector session.
//!
//! A single task runs every handshake, so at most one is ever in flight.
//! Harvest tasks report notable outcomes tagged with the generation of the
//! session they used; reports for a generation that has since been replaced
//! are ignored, which collapses simultaneous restart triggers from several
//! categories into one re-handshake.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::collector::session::SessionPublisher;
use crate::collector::{
    connect_attempt, CollectorTransport, HandshakeConfig, Outcome, RunId, SessionHandle,
};

/// Default delays between failed handshake attempts, in seconds. The last
/// one repeats.
pub const DEFAULT_CONNECT_BACKOFF_SECS: [u64; 6] = [15, 15, 30, 60, 120, 300];

/// Default number of consecutive restarts tolerated before giving up.
pub const DEFAULT_MAX_CONSECUTIVE_RESTARTS: u32 = 5;

/// Externally visible state of the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStatus {
    Connecting,
    Connected { run_id: RunId },
    /// Reporting stopped. The host may call
    /// [`AgentHandle::reconnect`](crate::harvest::AgentHandle::reconnect).
    Disconnected { reason: String },
    Shutdown,
}

/// Delay schedule for handshake retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectBackoff {
    delays: Vec<Duration>,
}

impl ConnectBackoff {
    #[must_use]
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// Delay after the `attempt`-th consecutive failure (zero-based).
    #[must_use]
    pub fn delay(&self, attempt: usize) -> Duration {
        self.delays
            .get(attempt)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or_default()
    }
}

impl Default for ConnectBackoff {
    fn default() -> Self {
        Self::new(
            DEFAULT_CONNECT_BACKOFF_SECS
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
        )
    }
}

#[derive(Debug)]
pub(crate) enum ConnectionRequest {
    Outcome { outcome: Outcome, generation: u64 },
    Reconnect,
}

/// Sending side used by harvest tasks and the agent handle.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionControl {
    tx: mpsc::UnboundedSender<ConnectionRequest>,
}

impl ConnectionControl {
    pub(crate) fn report(&self, outcome: Outcome, generation: u64) {
        // The manager is gone only during shutdown; nothing left to react.
        let _ = self.tx.send(ConnectionRequest::Outcome {
            outcome,
            generation,
        });
    }

    pub(crate) fn reconnect(&self) {
        let _ = self.tx.send(ConnectionRequest::Reconnect);
    }
}

pub(crate) struct ConnectionManager {
    transport: Arc<dyn CollectorTransport>,
    handshake: HandshakeConfig,
    backoff: ConnectBackoff,
    max_consecutive_restarts: u32,
    publisher: SessionPublisher,
    status: Arc<watch::Sender<AgentStatus>>,
    requests: mpsc::UnboundedReceiver<ConnectionRequest>,
    cancel: CancellationToken,
    generation: u64,
    consecutive_restarts: u32,
}

impl ConnectionManager {
    pub(crate) fn new(
        transport: Arc<dyn CollectorTransport>,
        handshake: HandshakeConfig,
        backoff: ConnectBackoff,
        max_consecutive_restarts: u32,
        cancel: CancellationToken,
    ) -> (
        Self,
        ConnectionControl,
        SessionHandle,
        Arc<watch::Sender<AgentStatus>>,
    ) {
        let (tx, requests) = mpsc::unbounded_channel();
        let (publisher, sessions) = SessionPublisher::new();
        let (status, _) = watch::channel(AgentStatus::Connecting);
        let status = Arc::new(status);
        let manager = Self {
            transport,
            handshake,
            backoff,
            max_consecutive_restarts,
            publisher,
            status: Arc::clone(&status),
            requests,
            cancel,
            generation: 0,
            consecutive_restarts: 0,
        };
        (manager, ConnectionControl { tx }, sessions, status)
    }

    pub(crate) async fn run(mut self) {
        self.establish().await;
        loop {
            let request = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                request = self.requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            self.handle(request).await;
        }
        debug!("connection manager stopped");
    }

    async fn handle(&mut self, request: ConnectionRequest) {
        match request {
            ConnectionRequest::Outcome {
                outcome,
                generation,
            } => {
                if generation != self.generation || self.publisher.current().is_none() {
                    debug!(
                        %outcome,
                        generation,
                        current = self.generation,
                        "ignoring outcome reported for a replaced session"
                    );
                    return;
                }
                match outcome {
                    Outcome::Success => self.consecutive_restarts = 0,
                    Outcome::RestartException => self.restart().await,
                    Outcome::Disconnect => {
                        self.disconnect("collector requested disconnect".to_string());
                    }
                    Outcome::Retryable | Outcome::Dropped => {}
                }
            }
            ConnectionRequest::Reconnect => {
                let disconnected =
                    matches!(*self.status.borrow(), AgentStatus::Disconnected { .. });
                if disconnected {
                    info!("reconnect requested");
                    self.consecutive_restarts = 0;
                    self.establish().await;
                } else {
                    debug!("reconnect requested while not disconnected, ignoring");
                }
            }
        }
    }

    async fn restart(&mut self) {
        self.consecutive_restarts += 1;
        if self.consecutive_restarts > self.max_consecutive_restarts {
            self.disconnect(format!(
                "gave up after {} consecutive restarts",
                self.max_consecutive_restarts
            ));
            return;
        }
        warn!(
            generation = self.generation,
            attempt = self.consecutive_restarts,
            "collector requested restart, reconnecting"
        );
        self.publisher.clear();
        self.establish().await;
    }

    /// Runs handshakes until one succeeds, a policy failure disconnects the
    /// agent, or shutdown begins.
    async fn establish(&mut self) {
        self.status.send_replace(AgentStatus::Connecting);
        let mut attempt = 0;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let generation = self.generation + 1;
            match connect_attempt(self.transport.as_ref(), &self.handshake, generation).await {
                Ok(session) => {
                    self.generation = generation;
                    let run_id = session.run_id.clone();
                    self.publisher.publish(session);
                    self.status.send_replace(AgentStatus::Connected { run_id });
                    return;
                }
                Err(err) if err.outcome() == Outcome::Disconnect => {
                    error!(error = %err, "handshake rejected, reporting disabled");
                    self.disconnect(err.to_string());
                    return;
                }
                Err(err) => {
                    let delay = self.backoff.delay(attempt);
                    attempt += 1;
                    warn!(error = %err, retry_in = ?delay, "handshake failed");
                    tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => return,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    fn disconnect(&mut self, reason: String) {
        warn!(reason = %reason, "disconnected from collector");
        self.publisher.clear();
        self.status
            .send_replace(AgentStatus::Disconnected { reason });
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collector::{
    CollectorClient, CollectorError, CollectorTransport, Command, HandshakeConfig, Session,
    SessionHandle,
};
use crate::config::Config;
use crate::harvest::category::{run_category, Category, HarvestContext};
use crate::harvest::connection::{
    AgentStatus, ConnectBackoff, ConnectionControl, ConnectionManager,
    DEFAULT_MAX_CONSECUTIVE_RESTARTS,
};
use crate::harvest::payload::Payload;

/// Default upper bound on [`AgentHandle::shutdown`].
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Retry and shutdown policy of the harvest driver.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub connect_backoff: ConnectBackoff,
    /// Consecutive restarts without a successful harvest before the agent
    /// gives up and disconnects.
    pub max_consecutive_restarts: u32,
    pub shutdown_timeout: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            connect_backoff: ConnectBackoff::default(),
            max_consecutive_restarts: DEFAULT_MAX_CONSECUTIVE_RESTARTS,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

type Spawner = Box<dyn FnOnce(HarvestContext) -> JoinHandle<()> + Send>;

/// Collects categories and settings, then starts the background tasks.
pub struct AgentBuilder {
    transport: Arc<dyn CollectorTransport>,
    handshake: HandshakeConfig,
    harvest: HarvestConfig,
    categories: Vec<Spawner>,
}

impl AgentBuilder {
    pub fn new(transport: Arc<dyn CollectorTransport>, handshake: HandshakeConfig) -> Self {
        Self {
            transport,
            handshake,
            harvest: HarvestConfig::default(),
            categories: Vec::new(),
        }
    }

    /// Builds the production transport and handshake settings from `config`.
    pub fn from_config(config: &Config) -> Result<Self, CollectorError> {
        let client = CollectorClient::new(&config.license_key, &config.transport_options())?;
        Ok(Self::new(Arc::new(client), config.handshake_config())
            .harvest_config(config.harvest_config()))
    }

    #[must_use]
    pub fn harvest_config(mut self, harvest: HarvestConfig) -> Self {
        self.harvest = harvest;
        self
    }

    /// Registers a category. Grab its [`Recorder`](crate::harvest::Recorder)
    /// before handing it over.
    #[must_use]
    pub fn category<P: Payload>(mut self, category: Category<P>) -> Self {
        let (buffer, schedule) = category.into_parts();
        self.categories.push(Box::new(move |context| {
            tokio::spawn(run_category(buffer, schedule, context))
        }));
        self
    }

    /// Spawns the connection manager and one task per category. Must be
    /// called from within a tokio runtime.
    pub fn start(self) -> AgentHandle {
        let cancel = CancellationToken::new();
        let (manager, control, sessions, status) = ConnectionManager::new(
            Arc::clone(&self.transport),
            self.handshake,
            self.harvest.connect_backoff,
            self.harvest.max_consecutive_restarts,
            cancel.clone(),
        );
        let manager = tokio::spawn(manager.run());

        let context = HarvestContext {
            transport: Arc::clone(&self.transport),
            sessions: sessions.clone(),
            control: control.clone(),
            cancel: cancel.clone(),
        };
        let workers = self
            .categories
            .into_iter()
            .map(|spawn| spawn(context.clone()))
            .collect();
        info!("agent started");

        AgentHandle {
            cancel,
            status,
            sessions,
            control,
            manager,
            workers,
            transport: self.transport,
            shutdown_timeout: self.harvest.shutdown_timeout,
        }
    }
}

/// Running agent.
pub struct AgentHandle {
    cancel: CancellationToken,
    status: Arc<watch::Sender<AgentStatus>>,
    sessions: SessionHandle,
    control: ConnectionControl,
    manager: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    transport: Arc<dyn CollectorTransport>,
    shutdown_timeout: Duration,
}

impl AgentHandle {
    #[must_use]
    pub fn status(&self) -> AgentStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AgentStatus> {
        self.status.subscribe()
    }

    #[must_use]
    pub fn session(&self) -> Option<Arc<Session>> {
        self.sessions.current()
    }

    #[must_use]
    pub fn sessions(&self) -> SessionHandle {
        self.sessions.clone()
    }

    /// Starts a fresh handshake after a disconnect. Ignored otherwise.
    pub fn reconnect(&self) {
        self.control.reconnect();
    }

    /// Stops scheduling, lets in-flight calls finish, performs a final
    /// harvest of every category and sends the `shutdown` command. Bounded by
    /// the configured shutdown timeout.
    pub async fn shutdown(self) {
        let AgentHandle {
            cancel,
            status,
            sessions,
            manager,
            workers,
            transport,
            shutdown_timeout,
            ..
        } = self;

        let drain = async move {
            cancel.cancel();
            for worker in workers {
                if let Err(err) = worker.await {
                    warn!(error = %err, "harvest task failed");
                }
            }
            if let Err(err) = manager.await {
                warn!(error = %err, "connection manager failed");
            }
            if let Some(session) = sessions.current() {
                let command = session.command(Command::Shutdown, b"[]".to_vec());
                match transport.invoke(command).await {
                    Ok(_) => info!(run_id = %session.run_id, "sent shutdown"),
                    Err(err) => debug!(error = %err, "shutdown command failed"),
                }
            }
        };
        if tokio::time::timeout(shutdown_timeout, drain).await.is_err() {
            warn!(timeout = ?shutdown_timeout, "shutdown timed out");
        }
        status.send_replace(AgentStatus::Shutdown);
    }
}

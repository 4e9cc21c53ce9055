// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::collector::command::{Command, OutboundCommand, RunId};
use crate::collector::policy::SecurityPolicies;

/// Default event harvest period when the collector does not supply one.
pub const DEFAULT_REPORT_PERIOD_MS: u64 = 60_000;

/// Per-command event reservoir sizes negotiated on connect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytic_event_data: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_event_data: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_event_data: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_event_data: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_event_data: Option<u32>,
}

impl HarvestLimits {
    #[must_use]
    pub fn for_command(&self, command: Command) -> Option<u32> {
        match command {
            Command::AnalyticEventData => self.analytic_event_data,
            Command::CustomEventData => self.custom_event_data,
            Command::ErrorEventData => self.error_event_data,
            Command::SpanEventData => self.span_event_data,
            Command::LogEventData => self.log_event_data,
            _ => None,
        }
    }
}

/// Event harvest period and reservoir sizes.
///
/// Sent in the connect payload as the agent's wishes and returned in the
/// connect reply as what the collector granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHarvestConfig {
    #[serde(default = "default_report_period_ms")]
    pub report_period_ms: u64,
    #[serde(default)]
    pub harvest_limits: HarvestLimits,
}

fn default_report_period_ms() -> u64 {
    DEFAULT_REPORT_PERIOD_MS
}

impl Default for EventHarvestConfig {
    fn default() -> Self {
        Self {
            report_period_ms: DEFAULT_REPORT_PERIOD_MS,
            harvest_limits: HarvestLimits::default(),
        }
    }
}

/// Adaptive sampling parameters from the connect reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SamplingConfig {
    pub target: Option<u64>,
    pub target_period: Option<Duration>,
}

/// The negotiated connection state for one agent run.
///
/// Immutable once published; a reconnect produces a new `Session` with a
/// higher `generation`.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub run_id: RunId,
    /// Host all post-handshake commands are sent to.
    pub collector_host: String,
    pub max_payload_size: usize,
    pub security_policies: SecurityPolicies,
    pub sampling: SamplingConfig,
    /// Headers echoed on every post-connect request.
    pub request_headers: HashMap<String, String>,
    pub event_harvest: EventHarvestConfig,
    pub entity_guid: Option<String>,
    pub trusted_account_key: Option<String>,
    /// Handshake counter, used to ignore restart requests that refer to a
    /// session already replaced.
    pub generation: u64,
}

impl Session {
    /// Builds a request for `command` bound to this session.
    #[must_use]
    pub fn command(&self, command: Command, payload: Vec<u8>) -> OutboundCommand {
        OutboundCommand {
            command,
            collector_host: self.collector_host.clone(),
            run_id: Some(self.run_id.clone()),
            payload,
            headers: self.request_headers.clone(),
            max_payload_size: self.max_payload_size,
        }
    }

    #[must_use]
    pub fn event_report_period(&self) -> Duration {
        Duration::from_millis(self.event_harvest.report_period_ms)
    }

    #[must_use]
    pub fn harvest_limit(&self, command: Command) -> Option<u32> {
        self.event_harvest.harvest_limits.for_command(command)
    }
}

/// Read side of the current session. Cheap to clone; every clone observes
/// the same published value.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    rx: watch::Receiver<Option<Arc<Session>>>,
}

impl SessionHandle {
    /// Snapshot of the current session, if connected.
    #[must_use]
    pub fn current(&self) -> Option<Arc<Session>> {
        self.rx.borrow().clone()
    }

    /// Waits until a session is published. Returns `None` once the
    /// publisher is gone.
    pub async fn wait_for_session(&mut self) -> Option<Arc<Session>> {
        self.rx
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|session| (*session).clone())
    }
}

/// Write side of the current session, owned by the connection manager.
#[derive(Debug)]
pub(crate) struct SessionPublisher {
    tx: watch::Sender<Option<Arc<Session>>>,
}

impl SessionPublisher {
    pub(crate) fn new() -> (Self, SessionHandle) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, SessionHandle { rx })
    }

    pub(crate) fn publish(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        self.tx.send_replace(Some(Arc::clone(&session)));
        session
    }

    pub(crate) fn clear(&self) {
        self.tx.send_replace(None);
    }

    pub(crate) fn current(&self) -> Option<Arc<Session>> {
        self.tx.borrow().clone()
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Remote operations understood by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Preconnect,
    Connect,
    Shutdown,
    MetricData,
    AnalyticEventData,
    SpanEventData,
    CustomEventData,
    ErrorEventData,
    ErrorData,
    TransactionSampleData,
    SqlTraceData,
    LogEventData,
}

impl Command {
    /// Value of the `method` query parameter.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Preconnect => "preconnect",
            Command::Connect => "connect",
            Command::Shutdown => "shutdown",
            Command::MetricData => "metric_data",
            Command::AnalyticEventData => "analytic_event_data",
            Command::SpanEventData => "span_event_data",
            Command::CustomEventData => "custom_event_data",
            Command::ErrorEventData => "error_event_data",
            Command::ErrorData => "error_data",
            Command::TransactionSampleData => "transaction_sample_data",
            Command::SqlTraceData => "sql_trace_data",
            Command::LogEventData => "log_event_data",
        }
    }

    /// Whether the command may be sent before a run id exists.
    #[must_use]
    pub fn is_pre_session(self) -> bool {
        matches!(self, Command::Preconnect | Command::Connect)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of one agent run, assigned by the collector on connect.
///
/// Never empty: [`RunId::new`] rejects empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        (!id.is_empty()).then_some(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One transport call: everything needed to build a single collector request.
#[derive(Debug, Clone)]
pub struct OutboundCommand {
    pub command: Command,
    pub collector_host: String,
    /// `None` only for pre-session commands.
    pub run_id: Option<RunId>,
    /// Serialized JSON, before compression.
    pub payload: Vec<u8>,
    /// Extra request headers. Names colliding with the required protocol
    /// headers are ignored by the transport.
    pub headers: HashMap<String, String>,
    pub max_payload_size: usize,
}

impl OutboundCommand {
    /// Builds a command sent before any session exists.
    #[must_use]
    pub fn pre_session(command: Command, collector_host: &str, payload: Vec<u8>) -> Self {
        Self {
            command,
            collector_host: collector_host.to_string(),
            run_id: None,
            payload,
            headers: HashMap::new(),
            max_payload_size: crate::DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Preconnect/connect handshake.
//!
//! Preconnect asks the configured collector which host to talk to and which
//! security policies apply. Connect then registers the application on the
//! redirect host and returns the run id plus the session settings. Both
//! request bodies are single-element JSON arrays and both replies wrap their
//! content in a `return_value` object.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::collector::client::CollectorTransport;
use crate::collector::command::{Command, OutboundCommand, RunId};
use crate::collector::error::CollectorError;
use crate::collector::policy::{PolicyEcho, SecurityPolicies, SupportedPolicies};
use crate::collector::session::{EventHarvestConfig, SamplingConfig, Session};

/// Label attached to the application in the connect payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Label {
    pub label_type: String,
    pub label_value: String,
}

/// Application identity reported on connect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectPayload {
    pub pid: u32,
    pub language: String,
    pub agent_version: String,
    pub host: String,
    pub display_host: String,
    pub app_name: Vec<String>,
    pub identifier: String,
    pub high_security: bool,
    pub labels: Vec<Label>,
    pub metadata: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_policies: Option<BTreeMap<String, PolicyEcho>>,
    pub event_harvest_config: EventHarvestConfig,
}

/// Everything the handshake needs besides a transport.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Host preconnect is sent to.
    pub collector_host: String,
    pub security_policies_token: Option<String>,
    pub high_security: bool,
    pub supported_policies: SupportedPolicies,
    pub connect_payload: ConnectPayload,
}

#[derive(Serialize)]
struct PreconnectRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    security_policies_token: Option<&'a str>,
    high_security: bool,
}

#[derive(Deserialize)]
struct Reply<T> {
    return_value: T,
}

#[derive(Debug, Default, Deserialize)]
struct PreconnectReply {
    #[serde(default)]
    redirect_host: Option<String>,
    #[serde(default)]
    security_policies: Option<SecurityPolicies>,
}

#[derive(Debug, Default, Deserialize)]
struct ConnectReply {
    #[serde(default)]
    agent_run_id: Option<String>,
    #[serde(default)]
    max_payload_size_in_bytes: Option<usize>,
    #[serde(default)]
    request_headers_map: Option<HashMap<String, String>>,
    #[serde(default)]
    event_harvest_config: Option<EventHarvestConfig>,
    #[serde(default)]
    sampling_target: Option<u64>,
    #[serde(default)]
    sampling_target_period_in_seconds: Option<u64>,
    #[serde(default)]
    entity_guid: Option<String>,
    #[serde(default)]
    trusted_account_key: Option<String>,
}

/// Runs one preconnect + connect exchange and returns the resulting session.
///
/// Fails fast without sending connect when preconnect fails or when the
/// collector's policies cannot be honored. `generation` is stamped on the
/// returned session.
pub async fn connect_attempt<T>(
    transport: &T,
    config: &HandshakeConfig,
    generation: u64,
) -> Result<Session, CollectorError>
where
    T: CollectorTransport + ?Sized,
{
    let token = config
        .security_policies_token
        .as_deref()
        .filter(|token| !token.is_empty());
    let preconnect = preconnect(transport, config, token).await?;

    let collector_host = preconnect
        .redirect_host
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| config.collector_host.clone());

    let security_policies = check_policies(config, token, preconnect.security_policies)?;

    let mut payload = config.connect_payload.clone();
    if token.is_some() {
        payload.security_policies = Some(config.supported_policies.accepted(&security_policies));
    }
    let body = serde_json::to_vec(&[&payload]).map_err(CollectorError::Encode)?;

    debug!(host = %collector_host, "sending connect");
    let response = transport
        .invoke(OutboundCommand::pre_session(
            Command::Connect,
            &collector_host,
            body,
        ))
        .await?;
    let reply: Reply<ConnectReply> =
        serde_json::from_slice(&response).map_err(CollectorError::Decode)?;
    let reply = reply.return_value;

    let run_id = reply
        .agent_run_id
        .and_then(RunId::new)
        .ok_or(CollectorError::MissingRunId)?;

    info!(run_id = %run_id, host = %collector_host, generation, "connected to collector");

    Ok(Session {
        run_id,
        collector_host,
        max_payload_size: reply
            .max_payload_size_in_bytes
            .unwrap_or(crate::DEFAULT_MAX_PAYLOAD_SIZE),
        security_policies,
        sampling: SamplingConfig {
            target: reply.sampling_target,
            target_period: reply
                .sampling_target_period_in_seconds
                .map(Duration::from_secs),
        },
        request_headers: reply.request_headers_map.unwrap_or_default(),
        event_harvest: reply.event_harvest_config.unwrap_or_default(),
        entity_guid: reply.entity_guid,
        trusted_account_key: reply.trusted_account_key,
        generation,
    })
}

async fn preconnect<T>(
    transport: &T,
    config: &HandshakeConfig,
    token: Option<&str>,
) -> Result<PreconnectReply, CollectorError>
where
    T: CollectorTransport + ?Sized,
{
    let request = PreconnectRequest {
        security_policies_token: token,
        high_security: config.high_security,
    };
    let body = serde_json::to_vec(&[request]).map_err(CollectorError::Encode)?;

    debug!(host = %config.collector_host, "sending preconnect");
    let response = transport
        .invoke(OutboundCommand::pre_session(
            Command::Preconnect,
            &config.collector_host,
            body,
        ))
        .await?;
    let reply: Reply<PreconnectReply> =
        serde_json::from_slice(&response).map_err(CollectorError::Decode)?;
    Ok(reply.return_value)
}

fn check_policies(
    config: &HandshakeConfig,
    token: Option<&str>,
    received: Option<SecurityPolicies>,
) -> Result<SecurityPolicies, CollectorError> {
    let received = received.unwrap_or_default();
    if token.is_some() && received.is_empty() {
        return Err(CollectorError::MissingSecurityPolicies);
    }
    let unsupported = config.supported_policies.unsupported_required(&received);
    if !unsupported.is_empty() {
        return Err(CollectorError::UnknownRequiredPolicies(unsupported));
    }
    Ok(received)
}

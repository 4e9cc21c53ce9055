// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::collector::outcome::Outcome;

/// Failure of a collector call or handshake step.
///
/// Every variant maps to exactly one [`Outcome`] through
/// [`CollectorError::outcome`], which is what the harvest driver acts on.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Serialized payload exceeds the session ceiling; nothing was sent.
    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },
    /// Payload could not be gzip-compressed; nothing was sent.
    #[error("failed to compress payload: {0}")]
    Compression(#[source] std::io::Error),
    /// A caller-supplied request header is not a valid HTTP header.
    #[error("invalid request header: {0}")]
    InvalidHeader(String),
    /// Collector host does not form a valid URL.
    #[error("invalid collector url for host {0}")]
    InvalidUrl(String),
    /// The HTTP client could not be constructed.
    #[error("failed to build http client: {0}")]
    ClientBuild(String),
    /// Connection, TLS, timeout or body read failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The collector answered with a non-success status.
    #[error("collector responded with status {code}")]
    Status { code: u16, body: String },
    /// Handshake request could not be serialized.
    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),
    /// A success response body was not the expected JSON.
    #[error("malformed collector response: {0}")]
    Decode(#[source] serde_json::Error),
    /// Connect reply had no usable `agent_run_id`.
    #[error("connect reply is missing agent_run_id")]
    MissingRunId,
    /// A security policies token is configured but preconnect returned no
    /// policies.
    #[error("security policies token is set but preconnect returned no policies")]
    MissingSecurityPolicies,
    /// The collector requires policies this agent does not implement.
    #[error("collector requires unsupported security policies: {}", .0.join(", "))]
    UnknownRequiredPolicies(Vec<String>),
}

impl CollectorError {
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match self {
            CollectorError::Status { code, .. } => Outcome::from_status(i64::from(*code)),
            CollectorError::Transport(_) => Outcome::Retryable,
            CollectorError::MissingSecurityPolicies
            | CollectorError::UnknownRequiredPolicies(_) => Outcome::Disconnect,
            CollectorError::PayloadTooLarge { .. }
            | CollectorError::Compression(_)
            | CollectorError::InvalidHeader(_)
            | CollectorError::InvalidUrl(_)
            | CollectorError::ClientBuild(_)
            | CollectorError::Encode(_)
            | CollectorError::Decode(_)
            | CollectorError::MissingRunId => Outcome::Dropped,
        }
    }
}

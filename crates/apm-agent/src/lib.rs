// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # APM Agent
//!
//! Collector communication for an APM telemetry agent embedded in a host
//! application.
//!
//! ## Overview
//!
//! - [`collector`]: the wire protocol. One gzip-compressed POST per named
//!   command, response classification into [`collector::Outcome`], and the
//!   preconnect/connect handshake producing a [`collector::Session`].
//! - [`harvest`]: periodic delivery. Each telemetry category is harvested by
//!   its own task; outcomes decide whether data is cleared, retained and
//!   merged, or whether the agent must reconnect or stop.
//! - [`config`]: environment-driven configuration.
//! - [`logger`]: log line formatter for the agent's `tracing` output.
//!
//! Nothing in this crate blocks the host application: producers record into
//! in-memory payload buffers and all network I/O happens on background tasks.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod collector;
pub mod config;
pub mod harvest;
pub mod logger;

#[cfg(test)]
pub(crate) mod test_support;

/// Agent version reported in the user agent and the connect payload.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Language identifier reported to the collector.
pub const AGENT_LANGUAGE: &str = "rust";

/// Collector protocol version spoken by this agent.
pub const PROTOCOL_VERSION: u32 = 17;

/// Payload ceiling used before a session exists and when the connect reply
/// does not carry one.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 1_000_000;

/// User agent sent with every collector request.
#[must_use]
pub fn user_agent() -> String {
    format!("APM-Agent-{AGENT_LANGUAGE}/{AGENT_VERSION}")
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Harvest cycle driver.
//!
//! Telemetry is recorded into per-category [`Payload`] buffers. Each
//! [`Category`] is harvested by its own task on its own [`Schedule`]; the
//! [`Outcome`](crate::collector::Outcome) of every send decides whether the
//! data is cleared, kept and merged with the next cycle, or whether the
//! connection manager has to restart or drop the session.

pub mod agent;
pub mod category;
pub mod connection;
pub mod events;
pub mod metrics;
pub mod payload;

pub use agent::{AgentBuilder, AgentHandle, HarvestConfig};
pub use category::{Category, Recorder, Schedule};
pub use connection::{AgentStatus, ConnectBackoff};
pub use events::EventPool;
pub use metrics::MetricTable;
pub use payload::Payload;

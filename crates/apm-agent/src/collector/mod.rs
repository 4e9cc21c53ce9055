// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collector wire protocol: transport, response classification and the
//! handshake that produces a [`Session`].

pub mod client;
pub mod command;
pub mod compress;
pub mod error;
pub mod handshake;
pub mod outcome;
pub mod policy;
pub mod session;

pub use client::{CollectorClient, CollectorTransport, TransportOptions};
pub use command::{Command, OutboundCommand, RunId};
pub use error::CollectorError;
pub use handshake::{connect_attempt, ConnectPayload, HandshakeConfig, Label};
pub use outcome::Outcome;
pub use policy::{SecurityPolicies, SupportedPolicies};
pub use session::{EventHarvestConfig, HarvestLimits, SamplingConfig, Session, SessionHandle};

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::SystemTime;

use crate::collector::{Command, RunId, Session};

/// Accumulated telemetry of one category, waiting to be harvested.
///
/// The harvest driver only needs these operations; the shape of the data is
/// up to the implementation.
pub trait Payload: Send + 'static {
    /// Collector command this payload is delivered with.
    fn command(&self) -> Command;

    /// Empty payloads are not sent.
    fn is_empty(&self) -> bool;

    /// Serializes the payload for `run_id`. `harvest_end` closes the
    /// reporting window of time-bucketed data.
    fn to_json(
        &self,
        run_id: &RunId,
        harvest_end: SystemTime,
    ) -> Result<Vec<u8>, serde_json::Error>;

    /// Folds `newer` into `self`, the older retained data, respecting the
    /// payload's own capacity limits.
    fn merge(&mut self, newer: Self)
    where
        Self: Sized;

    /// Moves the accumulated data out, leaving an empty payload with the
    /// same settings in place.
    fn take(&mut self) -> Self
    where
        Self: Sized;

    /// Applies session-negotiated settings such as reservoir sizes.
    fn configure(&mut self, _session: &Session) {}
}

/// Seconds since the Unix epoch, clamped to zero for pre-epoch clocks.
pub(crate) fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

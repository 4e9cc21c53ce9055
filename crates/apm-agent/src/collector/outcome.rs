// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Classification of one collector call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Data accepted.
    Success,
    /// Fatal for this run. Reporting stops until a new handshake is
    /// explicitly started.
    Disconnect,
    /// The session is invalid and a new handshake is required.
    RestartException,
    /// Transient failure. The payload is kept and merged into the next
    /// harvest.
    Retryable,
    /// Unrecoverable for this payload. It is discarded and not retried.
    Dropped,
}

impl Outcome {
    /// Maps a collector HTTP status code to an outcome.
    ///
    /// | Status | Outcome |
    /// |---|---|
    /// | 200, 202 | `Success` |
    /// | 410 | `Disconnect` |
    /// | 401, 409 | `RestartException` |
    /// | 408, 429, 500, 503 | `Retryable` |
    /// | anything else | `Dropped` |
    ///
    /// The input is deliberately wider than a valid status code so that
    /// zero, negative and out-of-range values classify as `Dropped`.
    #[must_use]
    pub fn from_status(code: i64) -> Self {
        match code {
            200 | 202 => Outcome::Success,
            410 => Outcome::Disconnect,
            401 | 409 => Outcome::RestartException,
            408 | 429 | 500 | 503 => Outcome::Retryable,
            _ => Outcome::Dropped,
        }
    }

    /// Whether harvest data sent in the call must be kept for the next cycle.
    ///
    /// Data rejected by a restart is re-sent once the new session exists.
    #[must_use]
    pub fn should_retain_payload(self) -> bool {
        matches!(self, Outcome::Retryable | Outcome::RestartException)
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self == Outcome::Success
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::Success => "success",
            Outcome::Disconnect => "disconnect",
            Outcome::RestartException => "restart",
            Outcome::Retryable => "retryable",
            Outcome::Dropped => "dropped",
        };
        f.write_str(name)
    }
}

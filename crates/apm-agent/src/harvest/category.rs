// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::collector::{CollectorTransport, Outcome, Session, SessionHandle};
use crate::harvest::connection::ConnectionControl;
use crate::harvest::payload::Payload;

/// How often a category is harvested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Fixed(Duration),
    /// The `report_period_ms` negotiated on connect.
    EventReportPeriod,
}

impl Schedule {
    #[must_use]
    pub fn period(&self, session: &Session) -> Duration {
        match self {
            Schedule::Fixed(period) => *period,
            Schedule::EventReportPeriod => session.event_report_period(),
        }
    }
}

/// One telemetry category: a shared accumulation buffer and its schedule.
pub struct Category<P: Payload> {
    buffer: Arc<Mutex<P>>,
    schedule: Schedule,
}

impl<P: Payload> Category<P> {
    pub fn new(payload: P, schedule: Schedule) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(payload)),
            schedule,
        }
    }

    /// Handle the tracer records data through.
    #[must_use]
    pub fn recorder(&self) -> Recorder<P> {
        Recorder {
            buffer: Arc::clone(&self.buffer),
        }
    }

    pub(crate) fn into_parts(self) -> (Arc<Mutex<P>>, Schedule) {
        (self.buffer, self.schedule)
    }
}

/// Producer-side access to a category's buffer.
pub struct Recorder<P> {
    buffer: Arc<Mutex<P>>,
}

impl<P> Clone for Recorder<P> {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl<P: Payload> Recorder<P> {
    /// Runs `f` with exclusive access to the accumulated payload. Keep `f`
    /// short: the harvest task takes the same lock.
    pub fn record<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        f(&mut lock(&self.buffer))
    }
}

fn lock<P>(buffer: &Mutex<P>) -> MutexGuard<'_, P> {
    buffer.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared by every category task.
#[derive(Clone)]
pub(crate) struct HarvestContext {
    pub(crate) transport: Arc<dyn CollectorTransport>,
    pub(crate) sessions: SessionHandle,
    pub(crate) control: ConnectionControl,
    pub(crate) cancel: CancellationToken,
}

/// Harvests one category against `session` and applies the outcome to the
/// buffer. Returns `None` when there was nothing to send.
pub(crate) async fn harvest_once<P: Payload>(
    buffer: &Mutex<P>,
    transport: &dyn CollectorTransport,
    session: &Session,
) -> Option<Outcome> {
    let data = {
        let mut payload = lock(buffer);
        payload.configure(session);
        payload.take()
    };
    if data.is_empty() {
        return None;
    }
    let command = data.command();

    let outcome = match data.to_json(&session.run_id, SystemTime::now()) {
        Ok(json) => match transport.invoke(session.command(command, json)).await {
            Ok(_) => Outcome::Success,
            Err(err) => {
                let outcome = err.outcome();
                debug!(%command, %outcome, error = %err, "harvest failed");
                outcome
            }
        },
        Err(err) => {
            warn!(%command, error = %err, "failed to serialize payload, dropping it");
            Outcome::Dropped
        }
    };

    if outcome.should_retain_payload() {
        let mut payload = lock(buffer);
        let mut retained = data;
        retained.merge(payload.take());
        *payload = retained;
    } else if outcome == Outcome::Dropped {
        warn!(%command, "collector rejected payload, dropping it");
    }
    Some(outcome)
}

/// Task body for one category: wait for a session, sleep one period,
/// harvest, report, repeat. On cancellation a final harvest is attempted
/// against the current session.
pub(crate) async fn run_category<P: Payload>(
    buffer: Arc<Mutex<P>>,
    schedule: Schedule,
    context: HarvestContext,
) {
    let mut sessions = context.sessions.clone();
    loop {
        let session = tokio::select! {
            biased;
            () = context.cancel.cancelled() => break,
            session = sessions.wait_for_session() => match session {
                Some(session) => session,
                None => break,
            },
        };
        tokio::select! {
            biased;
            () = context.cancel.cancelled() => break,
            () = tokio::time::sleep(schedule.period(&session)) => {}
        }
        let Some(session) = sessions.current() else {
            continue;
        };
        if let Some(outcome) = harvest_once(&buffer, context.transport.as_ref(), &session).await {
            context.control.report(outcome, session.generation);
        }
    }

    if let Some(session) = sessions.current() {
        if let Some(outcome) = harvest_once(&buffer, context.transport.as_ref(), &session).await {
            debug!(%outcome, "final harvest");
        }
    }
}

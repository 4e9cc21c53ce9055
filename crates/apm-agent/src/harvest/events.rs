// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::SystemTime;

use serde_json::{json, Value};

use crate::collector::{Command, RunId, Session};
use crate::harvest::payload::Payload;

/// Reservoir size used when the session does not negotiate one.
pub const DEFAULT_EVENT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
struct PrioritizedEvent {
    priority: f32,
    event: Value,
}

impl PartialEq for PrioritizedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PrioritizedEvent {}

impl PartialOrd for PrioritizedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioritizedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.total_cmp(&other.priority)
    }
}

/// Priority-sampled reservoir of analytic-style events.
///
/// Holds at most `capacity` events; once full, an incoming event replaces
/// the lowest-priority one if its own priority is higher. Serialized as
/// `[run_id, {"reservoir_size": n, "events_seen": n}, [event, ...]]`.
#[derive(Debug, Clone)]
pub struct EventPool {
    command: Command,
    capacity: usize,
    events_seen: u64,
    events: BinaryHeap<Reverse<PrioritizedEvent>>,
}

impl EventPool {
    #[must_use]
    pub fn new(command: Command, capacity: usize) -> Self {
        Self {
            command,
            capacity,
            events_seen: 0,
            events: BinaryHeap::new(),
        }
    }

    /// Offers an event to the reservoir.
    pub fn add(&mut self, event: Value, priority: f32) {
        self.events_seen += 1;
        self.insert(PrioritizedEvent { priority, event });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn events_seen(&self) -> u64 {
        self.events_seen
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn insert(&mut self, candidate: PrioritizedEvent) {
        if self.events.len() < self.capacity {
            self.events.push(Reverse(candidate));
            return;
        }
        let Some(mut lowest) = self.events.peek_mut() else {
            return;
        };
        if candidate.priority > lowest.0.priority {
            *lowest = Reverse(candidate);
        }
    }

    fn shrink_to_capacity(&mut self) {
        while self.events.len() > self.capacity {
            self.events.pop();
        }
    }
}

impl Payload for EventPool {
    fn command(&self) -> Command {
        self.command
    }

    fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn to_json(
        &self,
        run_id: &RunId,
        _harvest_end: SystemTime,
    ) -> Result<Vec<u8>, serde_json::Error> {
        let events: Vec<&Value> = self.events.iter().map(|entry| &entry.0.event).collect();
        serde_json::to_vec(&json!([
            run_id,
            {
                "reservoir_size": self.capacity,
                "events_seen": self.events_seen,
            },
            events
        ]))
    }

    fn merge(&mut self, newer: Self) {
        self.events_seen += newer.events_seen;
        for Reverse(event) in newer.events {
            self.insert(event);
        }
    }

    fn take(&mut self) -> Self {
        let fresh = Self::new(self.command, self.capacity);
        std::mem::replace(self, fresh)
    }

    fn configure(&mut self, session: &Session) {
        if let Some(limit) = session.harvest_limit(self.command) {
            self.capacity = limit as usize;
            self.shrink_to_capacity();
        }
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory collector used by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::collector::{CollectorError, CollectorTransport, Command, OutboundCommand};

type Response = Result<Vec<u8>, CollectorError>;

/// Transport answering from scripted responses and recording every call.
///
/// Per-command responses are used first, then the sequential script. When
/// both are exhausted the collector behaves like a healthy one: preconnect
/// keeps the host, connect hands out `run-1`, `run-2`, ... and data
/// commands are accepted.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Response>>,
    routed: Mutex<HashMap<Command, VecDeque<Response>>>,
    rejected_runs: Mutex<HashMap<String, u16>>,
    sent: Mutex<Vec<OutboundCommand>>,
    connects: AtomicU64,
}

impl ScriptedTransport {
    pub(crate) fn new(script: Vec<Response>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub(crate) fn respond(&self, command: Command, response: Response) {
        self.routed
            .lock()
            .unwrap()
            .entry(command)
            .or_default()
            .push_back(response);
    }

    /// Answers every data command sent with `run_id` with status `code`.
    pub(crate) fn reject_run(&self, run_id: &str, code: u16) {
        self.rejected_runs
            .lock()
            .unwrap()
            .insert(run_id.to_string(), code);
    }

    pub(crate) fn status(code: u16) -> Response {
        Err(CollectorError::Status {
            code,
            body: String::new(),
        })
    }

    pub(crate) fn sent(&self) -> Vec<OutboundCommand> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn sent_for(&self, command: Command) -> Vec<OutboundCommand> {
        self.sent()
            .into_iter()
            .filter(|sent| sent.command == command)
            .collect()
    }

    fn healthy(&self, command: Command) -> Response {
        let body = match command {
            Command::Preconnect => r#"{"return_value":{}}"#.to_string(),
            Command::Connect => {
                let n = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
                format!(r#"{{"return_value":{{"agent_run_id":"run-{n}"}}}}"#)
            }
            _ => r#"{"return_value":null}"#.to_string(),
        };
        Ok(body.into_bytes())
    }
}

#[async_trait]
impl CollectorTransport for ScriptedTransport {
    async fn invoke(&self, command: OutboundCommand) -> Result<Vec<u8>, CollectorError> {
        let name = command.command;
        let rejected = command
            .run_id
            .as_ref()
            .and_then(|run_id| self.rejected_runs.lock().unwrap().get(run_id.as_str()).copied());
        self.sent.lock().unwrap().push(command);
        if let Some(code) = rejected {
            return Self::status(code);
        }

        let routed = self
            .routed
            .lock()
            .unwrap()
            .get_mut(&name)
            .and_then(VecDeque::pop_front);
        if let Some(response) = routed {
            return response;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(response) => response,
            None => self.healthy(name),
        }
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log formatting for the agent.
//!
//! Every line is prefixed with `APM_AGENT` so agent output can be told apart
//! from the host application's:
//!
//! ```text
//! APM_AGENT | INFO | connected run_id=abc
//! APM_AGENT | DEBUG | harvest{command=metric_data}: sending bytes=512
//! ```

use std::fmt;

use thiserror::Error;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Line prefix.
pub const PREFIX: &str = "APM_AGENT";

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("could not parse log level: {0}")]
    Filter(#[from] ParseError),
    #[error("setting default subscriber failed: {0}")]
    Install(#[from] tracing::subscriber::SetGlobalDefaultError),
}

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(&mut writer, "{PREFIX} | {} | ", event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Filter for `level`, with the HTTP stack silenced.
pub fn env_filter(level: &str) -> Result<EnvFilter, ParseError> {
    EnvFilter::try_new(format!("h2=off,hyper=off,rustls=off,reqwest=off,{level}"))
}

/// Installs the agent formatter as the global subscriber.
pub fn init(level: &str) -> Result<(), LoggerError> {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter(level)?)
        .event_format(Formatter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Best-effort SQL statement classification for datastore telemetry.
//!
//! The classifier pulls the operation verb and target table out of raw,
//! unsanitized SQL so datastore segments can be grouped by
//! `operation/table`. It never builds a syntax tree and never validates the
//! statement: a single forward scan skips comments and quoted text and stops
//! as soon as the table has been located.
//!
//! ```
//! use apm_sql::DatastoreSegment;
//!
//! let mut segment = DatastoreSegment::new("MySQL");
//! segment.apply_sql("-- note\nINSERT INTO orders (a) VALUES (1)");
//! assert_eq!(segment.operation, "insert");
//! assert_eq!(segment.collection, "orders");
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

mod scanner;
pub mod segment;
pub mod statement;

pub use segment::DatastoreSegment;
pub use statement::{parse, SqlStatement};

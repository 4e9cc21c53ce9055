// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;

use crate::statement::parse;

/// Datastore call description recorded by the tracer for one database call.
///
/// Only [`DatastoreSegment::apply_sql`] belongs to this crate's logic; the
/// other fields are filled by driver integrations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatastoreSegment {
    /// Datastore product, e.g. `Postgres` or `MySQL`.
    pub product: String,
    /// Table or collection name.
    pub collection: String,
    /// Operation verb, e.g. `select`.
    pub operation: String,
    /// Query text as supplied by the driver.
    pub parameterized_query: Option<String>,
    pub host: String,
    pub port_path_or_id: String,
    pub database_name: String,
}

impl DatastoreSegment {
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            ..Default::default()
        }
    }

    /// Classifies `query` and copies the operation and table into the
    /// segment. Returns whether the statement was recognized.
    ///
    /// Unrecognized text leaves every field untouched. A recognized
    /// statement without a locatable table only updates the operation, so
    /// a collection set earlier by the driver is kept.
    pub fn apply_sql(&mut self, query: &str) -> bool {
        let Some(statement) = parse(query) else {
            return false;
        };

        self.operation = statement.operation;
        if let Some(collection) = statement.collection {
            self.collection = collection;
        }
        if self.parameterized_query.is_none() {
            self.parameterized_query = Some(query.to_string());
        }
        true
    }
}

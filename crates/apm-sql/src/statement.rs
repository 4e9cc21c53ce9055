// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;

use crate::scanner::Scanner;

/// Modifiers MySQL and SQLite accept between `UPDATE` and the table name.
const UPDATE_MODIFIERS: &[&str] = &[
    "low_priority",
    "ignore",
    "or",
    "rollback",
    "abort",
    "replace",
    "fail",
    "only",
];

const DELETE_MODIFIERS: &[&str] = &["low_priority", "quick", "ignore"];

const INSERT_MODIFIERS: &[&str] = &[
    "low_priority",
    "delayed",
    "high_priority",
    "ignore",
    "or",
    "rollback",
    "abort",
    "replace",
    "fail",
];

const DDL_MODIFIERS: &[&str] = &[
    "or",
    "replace",
    "global",
    "local",
    "temporary",
    "temp",
    "unlogged",
    "external",
];

/// Verbs recognized without a target table.
const OTHER_OPERATIONS: &[&str] = &[
    "analyze",
    "begin",
    "call",
    "commit",
    "copy",
    "deallocate",
    "declare",
    "describe",
    "exec",
    "execute",
    "explain",
    "grant",
    "lock",
    "merge",
    "prepare",
    "release",
    "revoke",
    "rollback",
    "savepoint",
    "set",
    "show",
    "start",
    "unlock",
    "use",
    "vacuum",
    "with",
];

/// Operation and target collection extracted from a SQL statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlStatement {
    /// Lower-cased leading verb, e.g. `select` or `commit`.
    pub operation: String,
    /// Target table, when the verb names one and it could be located.
    pub collection: Option<String>,
}

/// Classifies a SQL statement.
///
/// Returns `None` when, once leading comments, whitespace and empty
/// statements are skipped, the text does not start with a known SQL verb.
/// Verbs that are not table-oriented (`COMMIT`, `BEGIN`, `SET`, ...) yield an
/// operation without a collection.
///
/// # Examples
///
/// ```
/// use apm_sql::parse;
///
/// let statement = parse("SELECT * FROM users WHERE id=1").unwrap();
/// assert_eq!(statement.operation, "select");
/// assert_eq!(statement.collection.as_deref(), Some("users"));
///
/// let statement = parse("COMMIT").unwrap();
/// assert_eq!(statement.operation, "commit");
/// assert_eq!(statement.collection, None);
/// ```
pub fn parse(query: &str) -> Option<SqlStatement> {
    let mut scanner = Scanner::new(query);
    scanner.skip_leading();
    let operation = scanner.word()?.to_ascii_lowercase();

    let collection = match operation.as_str() {
        "select" => scanner.seek_keyword("from").then(|| scanner.table()).flatten(),
        "update" => {
            scanner.skip_keywords(UPDATE_MODIFIERS);
            scanner.table()
        }
        "delete" => {
            scanner.skip_keywords(DELETE_MODIFIERS);
            scanner.eat_keyword("from").then(|| scanner.table()).flatten()
        }
        "insert" | "replace" => {
            scanner.skip_keywords(INSERT_MODIFIERS);
            scanner.eat_keyword("into");
            scanner.table()
        }
        "create" | "drop" | "alter" => ddl_table(&mut scanner),
        "truncate" => {
            scanner.eat_keyword("table");
            scanner.table()
        }
        other if OTHER_OPERATIONS.contains(&other) => None,
        _ => return None,
    };

    Some(SqlStatement {
        operation,
        collection: collection.map(str::to_string),
    })
}

fn ddl_table<'a>(scanner: &mut Scanner<'a>) -> Option<&'a str> {
    scanner.skip_keywords(DDL_MODIFIERS);
    if !scanner.eat_keyword("table") {
        return None;
    }
    scanner.skip_keywords(&["if", "not", "exists"]);
    scanner.table()
}

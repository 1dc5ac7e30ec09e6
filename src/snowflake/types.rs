//! Snowflake API types and data structures.
//!
//! This module defines the request and response bodies of the SQL
//! statements API.

use serde::{Deserialize, Serialize};

/// Statement is still running; poll its handle.
pub const STATEMENT_IN_PROGRESS: &str = "333334";

/// Body of `POST /api/v2/statements`.
#[derive(Debug, Clone, Serialize)]
pub struct StatementRequest {
    /// SQL text.
    pub statement: String,
    /// Server-side timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Session database.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Session schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl StatementRequest {
    /// Creates a request for a single statement.
    #[must_use]
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            timeout: None,
            database: None,
            schema: None,
        }
    }
}

/// Result of a statement, or its in-progress status.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementResponse {
    /// Status code (`090001` on success).
    #[serde(default)]
    pub code: Option<String>,
    /// Status message.
    #[serde(default)]
    pub message: Option<String>,
    /// Handle for polling.
    #[serde(default)]
    pub statement_handle: Option<String>,
    /// Column metadata.
    #[serde(default)]
    pub result_set_meta_data: Option<ResultSetMetaData>,
    /// Rows, every cell rendered as a string.
    #[serde(default)]
    pub data: Vec<Vec<Option<String>>>,
}

/// Column metadata of a result set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSetMetaData {
    /// Number of rows.
    #[serde(default)]
    pub num_rows: u64,
    /// Columns in result order.
    #[serde(default)]
    pub row_type: Vec<ColumnType>,
}

/// A result column.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnType {
    /// Column name.
    pub name: String,
}

impl StatementResponse {
    /// Returns true while the statement is still executing.
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.code.as_deref() == Some(STATEMENT_IN_PROGRESS)
    }

    /// Index of a column, matched case-insensitively.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<usize> {
        self.result_set_meta_data
            .as_ref()?
            .row_type
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Value of a column in a row; `None` for SQL null or a missing column.
    #[must_use]
    pub fn cell<'a>(&'a self, row: &'a [Option<String>], name: &str) -> Option<&'a str> {
        row.get(self.column(name)?)?.as_deref()
    }
}

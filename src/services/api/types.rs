//! Data model shared with the server-facing collaborators.
//!
//! This module contains:
//! - `Server`/`Database`/`Table`/`Column` - the nested schema structure
//! - `Query`/`QuerySettings` - a single statement submitted for execution
//! - `QueryData`/`Statistics` - what the server returns for one query

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Nested schema structure of the connected server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Server {
    pub name: String,
    pub databases: Vec<Database>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Database {
    pub name: String,
    pub tables: Vec<Table>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Table {
    pub database: String,
    pub name: String,
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Column {
    pub database: String,
    pub table: String,
    pub name: String,
    pub data_type: String,
}

/// Column descriptor as returned by a table-columns lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
}

impl ColumnDescriptor {
    /// Whether a generated `SELECT` should constrain this column to today.
    pub fn is_date(&self) -> bool {
        self.data_type == "Date"
    }
}

/// Per-execution limits attached to every query of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySettings {
    pub max_execution_time: u32,
    pub max_result_rows: u32,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            max_execution_time: 20,
            max_result_rows: 50_000,
        }
    }
}

/// A single SQL statement submitted for execution.
///
/// `sql_original` keeps the text as the user wrote it; `sql` is what is sent
/// to the server. The history log records the original form.
#[derive(Debug, Clone)]
pub struct Query {
    pub id: Uuid,
    pub sql: String,
    pub sql_original: String,
    pub settings: QuerySettings,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        let sql = sql.into();
        Self {
            id: Uuid::new_v4(),
            sql_original: sql.clone(),
            sql,
            settings: QuerySettings::default(),
        }
    }
}

/// Execution statistics reported by the server for one query.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Statistics {
    pub time_elapsed: f64,
    pub rows_read: u64,
    pub bytes_read: u64,
}

impl Statistics {
    pub fn add(&mut self, other: &Statistics) {
        self.time_elapsed += other.time_elapsed;
        self.rows_read += other.rows_read;
        self.bytes_read += other.bytes_read;
    }
}

/// Row data plus statistics for a successfully executed query.
#[derive(Debug, Clone, Default)]
pub struct QueryData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub stats: Statistics,
}

//! Contracts for the server-facing collaborators.
//!
//! The stores talk to the server only through these traits; the concrete
//! HTTP client lives outside this crate and is injected at wiring time.

mod types;

pub use types::*;

use anyhow::Result;
use async_trait::async_trait;

/// Read access to the server's schema catalog.
#[async_trait]
pub trait SchemaApi: Send + Sync {
    /// Fetch the full nested Server -> Database -> Table -> Column structure.
    async fn load_database_structure(&self) -> Result<Server>;

    /// Column descriptors for one table, in catalog order.
    async fn get_table_columns(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<ColumnDescriptor>>;

    /// Descriptive SQL text (a `SHOW CREATE`-style statement) for one table.
    async fn make_table_describe(&self, database: &str, table: &str) -> Result<String>;
}

/// Query execution against the server.
#[async_trait]
pub trait QueryApi: Send + Sync {
    /// Execute one query, suspending until the server responds.
    async fn fetch(&self, query: &Query) -> Result<QueryData>;
}

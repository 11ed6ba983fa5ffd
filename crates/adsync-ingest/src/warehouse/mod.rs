//! Columnar warehouse sink
//!
//! The engine only needs the capability set in [`Warehouse`]. [`PgWarehouse`]
//! maps it onto Postgres (dataset = schema); [`MemoryWarehouse`] keeps
//! everything in process for dry runs and tests.

pub mod memory;
pub mod postgres;
pub mod schema;

use adsync_common::types::AuditRecord;
use async_trait::async_trait;
use serde::Serialize;

use crate::api::Record;
use crate::error::WarehouseError;

pub use memory::{MemoryWarehouse, WarehouseCall};
pub use postgres::PgWarehouse;
pub use schema::{ColumnDef, ColumnType, Mode, TableSchema};

/// How a batch replaces or extends existing table contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Replace the whole table with the batch
    Truncate,
    /// Add the batch to what is already there
    Append,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Truncate => "truncate",
            WriteMode::Append => "append",
        }
    }
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Positional parameter bound to a [`Warehouse::query`] statement
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Text(String),
    TextArray(Vec<String>),
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Name of the dataset tables live in
    fn dataset(&self) -> &str;

    async fn ensure_dataset(&self) -> Result<(), WarehouseError>;

    async fn ensure_table(&self, name: &str, schema: &TableSchema) -> Result<(), WarehouseError>;

    /// Write `rows` to `table`; returns the number of rows written.
    ///
    /// `partition_field` names the timestamp column whose day selects the
    /// partition, for partitioned tables.
    async fn load_rows(
        &self,
        table: &str,
        rows: &[Record],
        mode: WriteMode,
        partition_field: Option<&str>,
    ) -> Result<u64, WarehouseError>;

    /// Run a read-only statement with `$n` placeholders; rows come back as JSON objects
    async fn query(&self, sql: &str, params: &[QueryParam]) -> Result<Vec<Record>, WarehouseError>;

    async fn append_audit_row(&self, row: &AuditRecord) -> Result<(), WarehouseError>;
}

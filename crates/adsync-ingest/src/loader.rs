//! Batch loader
//!
//! The write strategy is a pure function of the entity class: structural
//! snapshots overwrite the whole table, metric rows are appended into the
//! partition of the run timestamp. An empty batch never reaches the warehouse.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::Record;
use crate::catalog::{EntityClass, TableKind, ACCOUNT_COLUMN, RUN_TIMESTAMP_COLUMN};
use crate::error::LoadError;
use crate::warehouse::{Warehouse, WriteMode};

/// Result of a load attempt that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(u64),
    /// Empty batch; nothing was sent to the warehouse
    Skipped,
}

impl LoadOutcome {
    pub fn rows(&self) -> u64 {
        match self {
            LoadOutcome::Loaded(rows) => *rows,
            LoadOutcome::Skipped => 0,
        }
    }
}

/// Write mode and partition column for an entity class
pub fn write_strategy(class: EntityClass) -> (WriteMode, Option<&'static str>) {
    match class {
        EntityClass::Structural => (WriteMode::Truncate, None),
        EntityClass::Metric => (WriteMode::Append, Some(RUN_TIMESTAMP_COLUMN)),
    }
}

/// Tag every row with the owning account and the run timestamp
pub fn enrich_rows(records: &mut [Record], account_id: &str, run_ts: DateTime<Utc>) {
    let stamp = run_ts.to_rfc3339_opts(SecondsFormat::Micros, true);
    for record in records.iter_mut() {
        record.insert(ACCOUNT_COLUMN.to_string(), Value::String(account_id.to_string()));
        record.insert(RUN_TIMESTAMP_COLUMN.to_string(), Value::String(stamp.clone()));
    }
}

#[derive(Clone)]
pub struct Loader {
    warehouse: Arc<dyn Warehouse>,
}

impl Loader {
    /// Create a new loader writing into `warehouse`
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self { warehouse }
    }

    /// Enrich and write one table's batch for an account
    pub async fn load(
        &self,
        table: TableKind,
        account_id: &str,
        run_ts: DateTime<Utc>,
        mut records: Vec<Record>,
    ) -> Result<LoadOutcome, LoadError> {
        if records.is_empty() {
            debug!(account = %account_id, table = %table, "Nothing to load");
            return Ok(LoadOutcome::Skipped);
        }

        enrich_rows(&mut records, account_id, run_ts);
        let (mode, partition_field) = write_strategy(table.class());

        match self
            .warehouse
            .load_rows(table.table_name(), &records, mode, partition_field)
            .await
        {
            Ok(written) => {
                debug!(account = %account_id, table = %table, mode = %mode, rows = written, "Loaded");
                Ok(LoadOutcome::Loaded(written))
            },
            Err(source) => {
                warn!(account = %account_id, table = %table, error = %source, "Load failed");
                Err(LoadError {
                    table: table.table_name().to_string(),
                    rows: records.len(),
                    source,
                })
            },
        }
    }
}

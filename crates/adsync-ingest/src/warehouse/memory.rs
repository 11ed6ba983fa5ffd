//! In-process warehouse
//!
//! Used by `adsync run --dry-run` and by tests. Every call is recorded in
//! order, tables can be made to reject writes, and query results can be
//! scripted since no SQL is executed.

use adsync_common::types::AuditRecord;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::{QueryParam, TableSchema, Warehouse, WriteMode};
use crate::api::Record;
use crate::error::WarehouseError;

/// A call made against [`MemoryWarehouse`]
#[derive(Debug, Clone, PartialEq)]
pub enum WarehouseCall {
    EnsureDataset,
    EnsureTable(String),
    LoadRows {
        table: String,
        rows: usize,
        mode: WriteMode,
        partition_field: Option<String>,
    },
    Query {
        sql: String,
        params: Vec<QueryParam>,
    },
    AppendAuditRow(AuditRecord),
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Vec<Record>>,
    audit: Vec<AuditRecord>,
    calls: Vec<WarehouseCall>,
    rejections: HashMap<String, String>,
    audit_rejection: Option<String>,
    query_results: VecDeque<Result<Vec<Record>, String>>,
}

pub struct MemoryWarehouse {
    dataset: String,
    state: Mutex<State>,
}

impl MemoryWarehouse {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, WarehouseError> {
        self.state.lock().map_err(|_| WarehouseError::LockPoisoned)
    }

    /// Make every write to `table` fail with `message`
    pub fn reject_table(&self, table: &str, message: &str) -> Result<(), WarehouseError> {
        self.lock()?
            .rejections
            .insert(table.to_string(), message.to_string());
        Ok(())
    }

    /// Make every audit append fail with `message`
    pub fn reject_audit(&self, message: &str) -> Result<(), WarehouseError> {
        self.lock()?.audit_rejection = Some(message.to_string());
        Ok(())
    }

    /// Queue the result of the next [`Warehouse::query`] call
    pub fn push_query_result(&self, result: Result<Vec<Record>, String>) -> Result<(), WarehouseError> {
        self.lock()?.query_results.push_back(result);
        Ok(())
    }

    pub fn calls(&self) -> Result<Vec<WarehouseCall>, WarehouseError> {
        Ok(self.lock()?.calls.clone())
    }

    /// Number of `load_rows` calls that reached the warehouse
    pub fn load_calls(&self) -> Result<usize, WarehouseError> {
        Ok(self
            .lock()?
            .calls
            .iter()
            .filter(|c| matches!(c, WarehouseCall::LoadRows { .. }))
            .count())
    }

    pub fn rows(&self, table: &str) -> Result<Vec<Record>, WarehouseError> {
        Ok(self.lock()?.tables.get(table).cloned().unwrap_or_default())
    }

    pub fn audit_rows(&self) -> Result<Vec<AuditRecord>, WarehouseError> {
        Ok(self.lock()?.audit.clone())
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    fn dataset(&self) -> &str {
        &self.dataset
    }

    async fn ensure_dataset(&self) -> Result<(), WarehouseError> {
        let mut state = self.lock()?;
        state.calls.push(WarehouseCall::EnsureDataset);
        Ok(())
    }

    async fn ensure_table(&self, name: &str, _schema: &TableSchema) -> Result<(), WarehouseError> {
        let mut state = self.lock()?;
        state.calls.push(WarehouseCall::EnsureTable(name.to_string()));
        state.tables.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn load_rows(
        &self,
        table: &str,
        rows: &[Record],
        mode: WriteMode,
        partition_field: Option<&str>,
    ) -> Result<u64, WarehouseError> {
        let mut state = self.lock()?;
        state.calls.push(WarehouseCall::LoadRows {
            table: table.to_string(),
            rows: rows.len(),
            mode,
            partition_field: partition_field.map(str::to_string),
        });

        if let Some(message) = state.rejections.get(table) {
            return Err(WarehouseError::Rejected {
                table: table.to_string(),
                message: message.clone(),
            });
        }

        let stored = state
            .tables
            .get_mut(table)
            .ok_or_else(|| WarehouseError::UnknownTable(table.to_string()))?;
        if mode == WriteMode::Truncate {
            stored.clear();
        }
        stored.extend(rows.iter().cloned());

        debug!(table = %table, mode = %mode, rows = rows.len(), "Rows written (memory)");
        Ok(rows.len() as u64)
    }

    async fn query(&self, sql: &str, params: &[QueryParam]) -> Result<Vec<Record>, WarehouseError> {
        let mut state = self.lock()?;
        state.calls.push(WarehouseCall::Query {
            sql: sql.to_string(),
            params: params.to_vec(),
        });

        match state.query_results.pop_front() {
            Some(Ok(rows)) => Ok(rows),
            Some(Err(message)) => Err(WarehouseError::Rejected {
                table: String::from("query"),
                message,
            }),
            None => Ok(Vec::new()),
        }
    }

    async fn append_audit_row(&self, row: &AuditRecord) -> Result<(), WarehouseError> {
        let mut state = self.lock()?;
        state.calls.push(WarehouseCall::AppendAuditRow(row.clone()));

        if let Some(message) = &state.audit_rejection {
            return Err(WarehouseError::Rejected {
                table: String::from("audit"),
                message: message.clone(),
            });
        }
        state.audit.push(row.clone());
        Ok(())
    }
}

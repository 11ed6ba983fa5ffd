//! Audit ledger
//!
//! Append-only record of every load attempt, and the only source of resume
//! state: an account's metric window starts the day after its newest
//! successful metric load. Every read is scoped to one account.

use adsync_common::types::{AuditRecord, AuditStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::catalog::metric_table_names;
use crate::error::{LedgerError, WarehouseError};
use crate::warehouse::schema::qualified_name;
use crate::warehouse::{QueryParam, Warehouse};

pub const DEFAULT_AUDIT_TABLE: &str = "etl_audit_log";

#[async_trait]
pub trait AuditLedger: Send + Sync {
    /// Append one record; never updates or deletes
    async fn record(&self, record: &AuditRecord) -> Result<(), LedgerError>;

    /// Newest `run_timestamp` of a SUCCESS on any metric table for `account_id`
    async fn last_success(&self, account_id: &str) -> Result<Option<DateTime<Utc>>, LedgerError>;
}

// ============================================================================
// Warehouse-backed ledger
// ============================================================================

pub struct WarehouseLedger {
    warehouse: Arc<dyn Warehouse>,
    audit_table: String,
}

impl WarehouseLedger {
    /// Create a new ledger over `audit_table` in the warehouse dataset
    pub fn new(warehouse: Arc<dyn Warehouse>, audit_table: impl Into<String>) -> Self {
        Self {
            warehouse,
            audit_table: audit_table.into(),
        }
    }

    fn last_success_sql(&self) -> Result<String, WarehouseError> {
        Ok(format!(
            r#"
            SELECT MAX(run_timestamp) AS last_success
            FROM {}
            WHERE ad_account_id = $1
              AND status = $2
              AND table_name = ANY($3)
            "#,
            qualified_name(self.warehouse.dataset(), &self.audit_table)?
        ))
    }
}

/// Read the `last_success` column of the aggregate row
fn decode_last_success(rows: &[crate::api::Record]) -> Result<Option<DateTime<Utc>>, LedgerError> {
    let value = rows.first().and_then(|row| row.get("last_success"));
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|e| LedgerError::Decode(format!("last_success {:?}: {}", raw, e))),
        Some(other) => Err(LedgerError::Decode(format!("last_success {}", other))),
    }
}

#[async_trait]
impl AuditLedger for WarehouseLedger {
    async fn record(&self, record: &AuditRecord) -> Result<(), LedgerError> {
        self.warehouse
            .append_audit_row(record)
            .await
            .map_err(|source| LedgerError::Write {
                account: record.account_id.clone(),
                table: record.table_name.clone(),
                source,
            })
    }

    async fn last_success(&self, account_id: &str) -> Result<Option<DateTime<Utc>>, LedgerError> {
        let read_err = |source| LedgerError::Read {
            account: account_id.to_string(),
            source,
        };

        let sql = self.last_success_sql().map_err(read_err)?;
        let params = [
            QueryParam::Text(account_id.to_string()),
            QueryParam::Text(AuditStatus::Success.as_str().to_string()),
            QueryParam::TextArray(metric_table_names().into_iter().map(String::from).collect()),
        ];

        let rows = self.warehouse.query(&sql, &params).await.map_err(read_err)?;
        decode_last_success(&rows)
    }
}

// ============================================================================
// In-memory ledger
// ============================================================================

#[derive(Default)]
struct LedgerState {
    records: Vec<AuditRecord>,
    write_failure: Option<String>,
    read_failure: Option<String>,
}

/// Ledger kept in process; same query semantics as [`WarehouseLedger`]
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing history
    pub fn with_records(records: Vec<AuditRecord>) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                records,
                ..LedgerState::default()
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, LedgerError> {
        self.state.lock().map_err(|_| LedgerError::LockPoisoned)
    }

    /// Make every append fail with `message`
    pub fn fail_writes(&self, message: &str) -> Result<(), LedgerError> {
        self.lock()?.write_failure = Some(message.to_string());
        Ok(())
    }

    /// Make every `last_success` read fail with `message`
    pub fn fail_reads(&self, message: &str) -> Result<(), LedgerError> {
        self.lock()?.read_failure = Some(message.to_string());
        Ok(())
    }

    pub fn records(&self) -> Result<Vec<AuditRecord>, LedgerError> {
        Ok(self.lock()?.records.clone())
    }

    pub fn records_for(&self, account_id: &str) -> Result<Vec<AuditRecord>, LedgerError> {
        Ok(self
            .lock()?
            .records
            .iter()
            .filter(|r| r.account_id == account_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AuditLedger for MemoryLedger {
    async fn record(&self, record: &AuditRecord) -> Result<(), LedgerError> {
        let mut state = self.lock()?;
        if let Some(message) = &state.write_failure {
            return Err(LedgerError::Write {
                account: record.account_id.clone(),
                table: record.table_name.clone(),
                source: WarehouseError::Rejected {
                    table: String::from("audit"),
                    message: message.clone(),
                },
            });
        }
        state.records.push(record.clone());
        Ok(())
    }

    async fn last_success(&self, account_id: &str) -> Result<Option<DateTime<Utc>>, LedgerError> {
        let state = self.lock()?;
        if let Some(message) = &state.read_failure {
            return Err(LedgerError::Read {
                account: account_id.to_string(),
                source: WarehouseError::Rejected {
                    table: String::from("audit"),
                    message: message.clone(),
                },
            });
        }

        let metric_tables = metric_table_names();
        Ok(state
            .records
            .iter()
            .filter(|r| {
                r.account_id == account_id
                    && r.status == AuditStatus::Success
                    && metric_tables.contains(&r.table_name.as_str())
            })
            .map(|r| r.run_timestamp)
            .max())
    }
}

//! Audit ledger data model shared across adsync
//!
//! One [`AuditRecord`] is written per (account, table) per orchestrator pass.
//! Records are append-only: they are never updated or deleted once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AdsyncError;

/// Outcome of a single load attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    /// Rows were written to the warehouse
    Success,
    /// The warehouse rejected the load for this table
    Failure,
    /// Nothing to load; no warehouse write was issued
    Skipped,
    /// The fetch phase failed and the whole account was abandoned for this pass
    FatalFailure,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "SUCCESS",
            AuditStatus::Failure => "FAILURE",
            AuditStatus::Skipped => "SKIPPED",
            AuditStatus::FatalFailure => "FATAL_FAILURE",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, AuditStatus::Failure | AuditStatus::FatalFailure)
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditStatus {
    type Err = AdsyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SUCCESS" => Ok(AuditStatus::Success),
            "FAILURE" => Ok(AuditStatus::Failure),
            "SKIPPED" => Ok(AuditStatus::Skipped),
            "FATAL_FAILURE" => Ok(AuditStatus::FatalFailure),
            _ => Err(AdsyncError::UnknownStatus(s.to_string())),
        }
    }
}

/// A row of the audit ledger.
///
/// Field names match the warehouse audit table columns, except `account_id`
/// which is stored as `ad_account_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Start time of the orchestrator pass that produced this record
    pub run_timestamp: DateTime<Utc>,
    pub table_name: String,
    #[serde(rename = "ad_account_id")]
    pub account_id: String,
    pub rows_processed: Option<i64>,
    pub status: AuditStatus,
    pub error_message: Option<String>,
}

impl AuditRecord {
    pub fn new(
        run_timestamp: DateTime<Utc>,
        table_name: impl Into<String>,
        account_id: impl Into<String>,
        rows_processed: i64,
        status: AuditStatus,
    ) -> Self {
        Self {
            run_timestamp,
            table_name: table_name.into(),
            account_id: account_id.into(),
            rows_processed: Some(rows_processed),
            status,
            error_message: None,
        }
    }

    /// Attach the failure detail
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

//! Error taxonomy for the sync engine
//!
//! - [`ApiError`]: opaque failure from the marketing API, message only
//! - [`FetchError`]: fetch-phase failure; aborts the current account for this pass
//! - [`WarehouseError`]: failure reported by the warehouse sink
//! - [`LoadError`]: per-table load failure; recorded as FAILURE, other tables proceed
//! - [`LedgerError`]: audit ledger read/write failure; routed to the ledger alarm
//!
//! Quota exhaustion is not its own type. The upstream offers no structured
//! codes, so it is a classification of the message, see [`crate::quota`].

use thiserror::Error;

/// Opaque failure surfaced by the marketing API collaborator.
///
/// Only the message is meaningful; callers must not assume anything else.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiError {
    message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::new(format!("HTTP error: {}", err))
    }
}

/// Fetch-phase failure for one account
#[derive(Error, Debug)]
pub enum FetchError {
    /// The first page of a structural resource could not be obtained
    #[error("Failed to start {resource} fetch: {source}")]
    Start {
        resource: String,
        #[source]
        source: ApiError,
    },

    /// A later page failed after some records were already consumed
    #[error("{resource} fetch failed after {consumed} records: {source}")]
    Stream {
        resource: String,
        consumed: usize,
        #[source]
        source: ApiError,
    },

    /// A windowed metrics query failed
    #[error("{table} query failed: {source}")]
    Metrics {
        table: String,
        #[source]
        source: ApiError,
    },
}

impl FetchError {
    /// The upstream message, used for quota classification
    pub fn upstream_message(&self) -> &str {
        match self {
            FetchError::Start { source, .. }
            | FetchError::Stream { source, .. }
            | FetchError::Metrics { source, .. } => source.message(),
        }
    }
}

/// Failure reported by a warehouse sink
#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Identifier(#[from] adsync_common::AdsyncError),

    #[error("Table {0} does not exist")]
    UnknownTable(String),

    #[error("Warehouse rejected write to {table}: {message}")]
    Rejected { table: String, message: String },

    #[error("Warehouse state lock poisoned")]
    LockPoisoned,
}

/// Per-table load failure
#[derive(Error, Debug)]
#[error("Failed to load {rows} rows into {table}: {source}")]
pub struct LoadError {
    pub table: String,
    pub rows: usize,
    #[source]
    pub source: WarehouseError,
}

/// Audit ledger failure
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to append audit record for {account}/{table}: {source}")]
    Write {
        account: String,
        table: String,
        #[source]
        source: WarehouseError,
    },

    #[error("Failed to read last success for {account}: {source}")]
    Read {
        account: String,
        #[source]
        source: WarehouseError,
    },

    #[error("Unexpected ledger row: {0}")]
    Decode(String),

    #[error("Ledger lock poisoned")]
    LockPoisoned,
}

//! adsync Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging bootstrap, and error handling for the adsync workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`AdsyncError`] and the [`Result`] alias
//! - **Logging**: [`logging::LogConfig`] and [`logging::init_logging`]
//! - **Types**: the audit ledger data model ([`types::AuditRecord`], [`types::AuditStatus`])
//!
//! # Example
//!
//! ```no_run
//! use adsync_common::logging::{init_logging, LogConfig};
//! use adsync_common::types::{AuditRecord, AuditStatus};
//! use chrono::Utc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     let record = AuditRecord::new(Utc::now(), "campaigns", "act_1", 250, AuditStatus::Success);
//!     tracing::info!(table = %record.table_name, "audit record built");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{AdsyncError, Result};

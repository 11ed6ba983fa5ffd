//! adsync Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Incremental sync of marketing API accounts into an analytical warehouse.
//!
//! # Components
//!
//! - [`fetcher::PagedFetcher`]: lazy cursor pagination with a page cooldown
//! - [`window::WindowPlanner`]: metric date window from the last success
//! - [`backoff::BackoffController`]: rest / long-backoff between accounts
//! - [`loader::Loader`]: overwrite or append+partition by entity class
//! - [`ledger::AuditLedger`]: append-only audit log and resume state
//! - [`orchestrator::Orchestrator`]: the sequential per-account loop
//!
//! The marketing API ([`api::MarketingApi`]), warehouse ([`warehouse::Warehouse`])
//! and pauses ([`pacing::Pacer`]) are injected.
//!
//! # Example
//!
//! ```no_run
//! use adsync_ingest::api::GraphApiClient;
//! use adsync_ingest::config::SyncConfig;
//! use adsync_ingest::ledger::MemoryLedger;
//! use adsync_ingest::orchestrator::Orchestrator;
//! use adsync_ingest::pacing::TokioPacer;
//! use adsync_ingest::warehouse::MemoryWarehouse;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SyncConfig::from_env()?;
//!     let api = Arc::new(GraphApiClient::new(config.graph_api()?)?);
//!     let warehouse = Arc::new(MemoryWarehouse::new(config.dataset.clone()));
//!     let mut orchestrator = Orchestrator::new(
//!         &config,
//!         api,
//!         warehouse,
//!         Arc::new(MemoryLedger::new()),
//!         Arc::new(TokioPacer),
//!     );
//!     orchestrator.bootstrap().await?;
//!     let summary = orchestrator.run(&config.account_ids).await;
//!     println!("{}", summary.summarize());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod backoff;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod ledger;
pub mod loader;
pub mod orchestrator;
pub mod pacing;
pub mod quota;
pub mod warehouse;
pub mod window;

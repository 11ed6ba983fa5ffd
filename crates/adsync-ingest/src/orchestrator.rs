//! Per-account sync loop
//!
//! Accounts are processed strictly one after another:
//!
//! ```text
//! Planning -> Fetching -> Loading -> Resting                 (success)
//! Planning -> Fetching (failed) -> Resting | LongBackoff     (fetch error)
//! ```
//!
//! Fetch failures abandon the account for this pass and are audited once
//! under `FETCH_ALL`. Load failures only affect their own table. Nothing
//! escapes the per-account boundary; the pass always reaches every account
//! and reports through the audit ledger and the returned [`RunSummary`].

use adsync_common::types::{AuditRecord, AuditStatus};
use chrono::{DateTime, NaiveDate, Utc};
use futures::TryStreamExt;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::api::{MarketingApi, Record};
use crate::backoff::{BackoffController, PauseRecord};
use crate::catalog::{TableKind, DEFAULT_BREAKDOWNS, FETCH_ALL};
use crate::config::SyncConfig;
use crate::error::{FetchError, LedgerError, WarehouseError};
use crate::fetcher::PagedFetcher;
use crate::ledger::AuditLedger;
use crate::loader::{LoadOutcome, Loader};
use crate::pacing::Pacer;
use crate::quota::{FailureClassifier, FailureKind, SignatureClassifier};
use crate::warehouse::schema::{audit_schema, entity_schema};
use crate::warehouse::Warehouse;
use crate::window::{SyncWindow, WindowPlanner};

/// Tracing target for audit records that could not be written
pub const LEDGER_ALARM_TARGET: &str = "adsync::ledger_alarm";

// ============================================================================
// Outcomes
// ============================================================================

/// What happened to one table of one account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableOutcome {
    pub table: String,
    pub status: AuditStatus,
    pub rows: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AccountResult {
    /// Fetch succeeded; individual tables may still have failed to load
    Completed,
    /// Nothing was loaded for this account in this pass
    Aborted { error: String, quota_exhausted: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountOutcome {
    pub account: String,
    pub window: Option<SyncWindow>,
    pub result: AccountResult,
    pub tables: Vec<TableOutcome>,
}

impl AccountOutcome {
    pub fn is_completed(&self) -> bool {
        self.result == AccountResult::Completed
    }

    pub fn table(&self, name: &str) -> Option<&TableOutcome> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn rows_loaded(&self) -> u64 {
        self.tables
            .iter()
            .filter(|t| t.status == AuditStatus::Success)
            .map(|t| t.rows)
            .sum()
    }
}

/// Result of one orchestrator pass
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub run_timestamp: DateTime<Utc>,
    pub accounts: Vec<AccountOutcome>,
    pub pauses: Vec<PauseRecord>,
    /// Audit records that could not be written to the ledger
    pub ledger_alarms: usize,
}

impl RunSummary {
    pub fn account(&self, id: &str) -> Option<&AccountOutcome> {
        self.accounts.iter().find(|a| a.account == id)
    }

    pub fn summarize(&self) -> String {
        let total = self.accounts.len();
        let completed = self.accounts.iter().filter(|a| a.is_completed()).count();
        let aborted = total - completed;
        let table_failures = self
            .accounts
            .iter()
            .flat_map(|a| a.tables.iter())
            .filter(|t| t.status == AuditStatus::Failure)
            .count();
        let rows: u64 = self.accounts.iter().map(AccountOutcome::rows_loaded).sum();
        let paused_secs: u64 = self.pauses.iter().map(|p| p.secs).sum();

        format!(
            "Sync Summary ({}):\n\
             - Accounts processed: {}\n\
             - Completed: {}\n\
             - Aborted: {}\n\
             - Table load failures: {}\n\
             - Rows loaded: {}\n\
             - Time paused: {}s\n\
             - Ledger alarms: {}",
            self.run_id, total, completed, aborted, table_failures, rows, paused_secs, self.ledger_alarms
        )
    }
}

/// Planned window for one account, as shown by `adsync plan`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedAccount {
    pub account: String,
    pub last_success: Option<DateTime<Utc>>,
    pub window: SyncWindow,
}

/// Resume point and window for each account, read from the ledger only
pub async fn plan_accounts(
    ledger: &dyn AuditLedger,
    accounts: &[String],
    planner: &WindowPlanner,
) -> Vec<Result<PlannedAccount, LedgerError>> {
    let mut planned = Vec::with_capacity(accounts.len());
    for account in accounts {
        let result = ledger
            .last_success(account)
            .await
            .map(|last_success| PlannedAccount {
                account: account.clone(),
                last_success,
                window: planner.plan(last_success),
            });
        planned.push(result);
    }
    planned
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    fetcher: PagedFetcher,
    loader: Loader,
    ledger: Arc<dyn AuditLedger>,
    warehouse: Arc<dyn Warehouse>,
    backoff: BackoffController,
    classifier: Arc<dyn FailureClassifier>,
    audit_table: String,
    lookback_days: u32,
    insights_limit: usize,
    ledger_alarms: usize,
}

impl Orchestrator {
    /// Create a new orchestrator wired from the sync configuration
    pub fn new(
        config: &SyncConfig,
        api: Arc<dyn MarketingApi>,
        warehouse: Arc<dyn Warehouse>,
        ledger: Arc<dyn AuditLedger>,
        pacer: Arc<dyn Pacer>,
    ) -> Self {
        let classifier: Arc<dyn FailureClassifier> =
            Arc::new(SignatureClassifier::new(&config.quota_signatures));
        let fetcher = PagedFetcher::new(api, Arc::clone(&pacer))
            .with_page_size(config.page_size)
            .with_cooldown(config.page_cooldown());
        let backoff =
            BackoffController::with_classifier(config.backoff_policy(), Arc::clone(&classifier), pacer);

        Self {
            fetcher,
            loader: Loader::new(Arc::clone(&warehouse)),
            ledger,
            warehouse,
            backoff,
            classifier,
            audit_table: config.audit_table.clone(),
            lookback_days: config.lookback_days,
            insights_limit: config.insights_limit,
            ledger_alarms: 0,
        }
    }

    /// Create the dataset, the audit table and the six entity tables
    pub async fn bootstrap(&self) -> Result<(), WarehouseError> {
        self.warehouse.ensure_dataset().await?;
        self.warehouse
            .ensure_table(&self.audit_table, &audit_schema())
            .await?;
        for kind in TableKind::ALL {
            self.warehouse
                .ensure_table(kind.table_name(), &entity_schema(kind))
                .await?;
        }
        info!(dataset = %self.warehouse.dataset(), "Warehouse bootstrapped");
        Ok(())
    }

    /// Report each account's resume point and window without fetching
    pub async fn preview(
        &self,
        accounts: &[String],
        run_date: NaiveDate,
    ) -> Vec<Result<PlannedAccount, LedgerError>> {
        let planner = WindowPlanner::new(run_date, self.lookback_days);
        plan_accounts(self.ledger.as_ref(), accounts, &planner).await
    }

    /// One pass over `accounts`, stamped with the current time
    pub async fn run(&mut self, accounts: &[String]) -> RunSummary {
        self.run_at(accounts, Utc::now()).await
    }

    /// One pass over `accounts` with an explicit run timestamp
    pub async fn run_at(&mut self, accounts: &[String], run_ts: DateTime<Utc>) -> RunSummary {
        let run_id = Uuid::new_v4();
        let planner = WindowPlanner::new(run_ts.date_naive(), self.lookback_days);
        self.ledger_alarms = 0;

        info!(
            run_id = %run_id,
            accounts = accounts.len(),
            run_timestamp = %run_ts.to_rfc3339(),
            "Starting sync pass"
        );

        let mut outcomes = Vec::with_capacity(accounts.len());
        let mut pauses = Vec::new();
        for (index, account) in accounts.iter().enumerate() {
            let span = info_span!("account", account = %account, run_id = %run_id);
            info!(
                account = %account,
                "Processing account {} / {}",
                index + 1,
                accounts.len()
            );

            let outcome = self
                .sync_account(account, run_ts, &planner)
                .instrument(span)
                .await;
            outcomes.push(outcome);

            if let Some(pause) = self.backoff.settle(account).await {
                pauses.push(pause);
            }
        }

        let summary = RunSummary {
            run_id,
            run_timestamp: run_ts,
            accounts: outcomes,
            pauses,
            ledger_alarms: self.ledger_alarms,
        };
        info!(
            run_id = %run_id,
            completed = summary.accounts.iter().filter(|a| a.is_completed()).count(),
            ledger_alarms = summary.ledger_alarms,
            "Sync pass finished"
        );
        summary
    }

    async fn sync_account(
        &mut self,
        account: &str,
        run_ts: DateTime<Utc>,
        planner: &WindowPlanner,
    ) -> AccountOutcome {
        // Planning
        let last_success = match self.ledger.last_success(account).await {
            Ok(last) => last,
            Err(e) => {
                error!(account = %account, error = %e, "Cannot read resume point, skipping account");
                self.backoff.on_abort();
                return self
                    .abort(account, run_ts, None, e.to_string(), false)
                    .await;
            },
        };
        let window = planner.plan(last_success);
        if window.is_empty() {
            info!(account = %account, window = %window, "Metrics up to date");
        } else {
            info!(account = %account, window = %window, days = window.days(), "Planned metric window");
        }

        // Fetching
        let batches = match self.fetch_all(account, window).await {
            Ok(batches) => batches,
            Err(e) => {
                let quota_exhausted = self.classifier.classify_fetch(&e) == FailureKind::QuotaExhausted;
                error!(
                    account = %account,
                    error = %e,
                    quota_exhausted,
                    "Fetch failed, skipping account"
                );
                self.backoff.on_failure(&e);
                return self
                    .abort(account, run_ts, Some(window), e.to_string(), quota_exhausted)
                    .await;
            },
        };

        // Loading
        let mut tables = Vec::with_capacity(batches.len());
        for (kind, records) in batches {
            let outcome = match self.loader.load(kind, account, run_ts, records).await {
                Ok(LoadOutcome::Loaded(rows)) => TableOutcome {
                    table: kind.table_name().to_string(),
                    status: AuditStatus::Success,
                    rows,
                    error: None,
                },
                Ok(LoadOutcome::Skipped) => TableOutcome {
                    table: kind.table_name().to_string(),
                    status: AuditStatus::Skipped,
                    rows: 0,
                    error: None,
                },
                // FAILURE records how many rows the load attempted
                Err(e) => TableOutcome {
                    table: kind.table_name().to_string(),
                    status: AuditStatus::Failure,
                    rows: u64::try_from(e.rows).unwrap_or(u64::MAX),
                    error: Some(e.to_string()),
                },
            };

            let mut record = AuditRecord::new(
                run_ts,
                &outcome.table,
                account,
                i64::try_from(outcome.rows).unwrap_or(i64::MAX),
                outcome.status,
            );
            if let Some(message) = &outcome.error {
                record = record.with_error(message.clone());
            }
            self.audit(record).await;
            tables.push(outcome);
        }

        let failed = tables.iter().filter(|t| t.status == AuditStatus::Failure).count();
        if failed > 0 {
            warn!(account = %account, failed_tables = failed, "Account finished with load failures");
        } else {
            info!(account = %account, "Account finished");
        }
        self.backoff.on_success();

        AccountOutcome {
            account: account.to_string(),
            window: Some(window),
            result: AccountResult::Completed,
            tables,
        }
    }

    /// Fetch the three structural snapshots, then the metric windows
    async fn fetch_all(
        &self,
        account: &str,
        window: SyncWindow,
    ) -> Result<Vec<(TableKind, Vec<Record>)>, FetchError> {
        let mut batches = Vec::with_capacity(TableKind::ALL.len());

        for kind in TableKind::STRUCTURAL {
            let resource = kind.resource().unwrap_or_else(|| kind.table_name());
            let fields = kind.fields();
            let records: Vec<Record> = self
                .fetcher
                .fetch(account, resource, &fields)
                .try_collect()
                .await?;
            info!(account = %account, table = %kind, rows = records.len(), "Fetched");
            batches.push((kind, records));
        }

        for kind in TableKind::METRIC {
            let records = if window.is_empty() {
                Vec::new()
            } else {
                self.fetcher
                    .fetch_metrics(account, kind, window, DEFAULT_BREAKDOWNS, self.insights_limit)
                    .await?
            };
            info!(account = %account, table = %kind, rows = records.len(), "Fetched");
            batches.push((kind, records));
        }

        Ok(batches)
    }

    async fn abort(
        &mut self,
        account: &str,
        run_ts: DateTime<Utc>,
        window: Option<SyncWindow>,
        message: String,
        quota_exhausted: bool,
    ) -> AccountOutcome {
        let record = AuditRecord::new(run_ts, FETCH_ALL, account, 0, AuditStatus::FatalFailure)
            .with_error(message.clone());
        self.audit(record).await;

        AccountOutcome {
            account: account.to_string(),
            window,
            result: AccountResult::Aborted {
                error: message,
                quota_exhausted,
            },
            tables: Vec::new(),
        }
    }

    /// Append to the ledger; a failed write raises the ledger alarm instead
    async fn audit(&mut self, record: AuditRecord) {
        if let Err(e) = self.ledger.record(&record).await {
            self.ledger_alarms += 1;
            error!(
                target: LEDGER_ALARM_TARGET,
                account = %record.account_id,
                table = %record.table_name,
                status = %record.status,
                rows_processed = record.rows_processed,
                run_timestamp = %record.run_timestamp.to_rfc3339(),
                record_error = record.error_message.as_deref().unwrap_or(""),
                error = %e,
                "Audit record lost"
            );
        }
    }
}

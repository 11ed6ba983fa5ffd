//! Shared fakes for integration tests
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use adsync_ingest::api::{MarketingApi, MetricsQuery, Page, Record};
use adsync_ingest::config::SyncConfig;
use adsync_ingest::error::ApiError;
use adsync_ingest::ledger::MemoryLedger;
use adsync_ingest::orchestrator::Orchestrator;
use adsync_ingest::pacing::{Pacer, PauseReason};
use adsync_ingest::warehouse::MemoryWarehouse;
use adsync_ingest::window::SyncWindow;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Scripted marketing API
// ============================================================================

/// How a structural resource behaves for one account
#[derive(Debug, Clone)]
pub enum Script {
    Records(usize),
    Fail(String),
    /// Serve this many pages, then fail
    FailAfterPages(usize, String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricCall {
    pub account: String,
    pub level: String,
    pub window: SyncWindow,
}

/// Marketing API fake.
///
/// Unscripted structural resources are empty. Unscripted metric queries
/// return one row per day of the window.
#[derive(Default)]
pub struct ScriptedApi {
    structural: HashMap<(String, String), Script>,
    metric_failures: HashMap<(String, String), String>,
    page_calls: Mutex<Vec<(String, String, Option<String>)>>,
    metric_calls: Mutex<Vec<MetricCall>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, account: &str, resource: &str, script: Script) -> Self {
        self.structural
            .insert((account.to_string(), resource.to_string()), script);
        self
    }

    pub fn with_records(self, account: &str, resource: &str, total: usize) -> Self {
        self.with(account, resource, Script::Records(total))
    }

    pub fn failing_metrics(mut self, account: &str, level: &str, message: &str) -> Self {
        self.metric_failures
            .insert((account.to_string(), level.to_string()), message.to_string());
        self
    }

    /// Page requests made for `account`/`resource`
    pub fn page_calls(&self, account: &str, resource: &str) -> usize {
        self.page_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, r, _)| a == account && r == resource)
            .count()
    }

    pub fn metric_calls(&self) -> Vec<MetricCall> {
        self.metric_calls.lock().unwrap().clone()
    }

    pub fn metric_calls_for(&self, account: &str) -> Vec<MetricCall> {
        self.metric_calls()
            .into_iter()
            .filter(|c| c.account == account)
            .collect()
    }
}

fn record(value: serde_json::Value) -> Record {
    value.as_object().unwrap().clone()
}

#[async_trait]
impl MarketingApi for ScriptedApi {
    async fn list_page(
        &self,
        account_id: &str,
        resource: &str,
        _fields: &[&str],
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<Page, ApiError> {
        self.page_calls.lock().unwrap().push((
            account_id.to_string(),
            resource.to_string(),
            cursor.map(str::to_string),
        ));

        let start: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
        let script = self
            .structural
            .get(&(account_id.to_string(), resource.to_string()))
            .cloned()
            .unwrap_or(Script::Records(0));

        let total = match script {
            Script::Records(total) => total,
            Script::Fail(message) => return Err(ApiError::new(message)),
            Script::FailAfterPages(pages, message) => {
                if start >= pages * page_size {
                    return Err(ApiError::new(message));
                }
                usize::MAX
            },
        };

        let end = start.saturating_add(page_size).min(total);
        let records = (start..end)
            .map(|i| record(json!({"id": format!("{}_{}", resource, i), "name": format!("#{}", i)})))
            .collect();
        let next_cursor = (end < total).then(|| end.to_string());
        Ok(Page {
            records,
            next_cursor,
        })
    }

    async fn query_metrics(
        &self,
        account_id: &str,
        query: &MetricsQuery<'_>,
    ) -> Result<Vec<Record>, ApiError> {
        self.metric_calls.lock().unwrap().push(MetricCall {
            account: account_id.to_string(),
            level: query.level.to_string(),
            window: query.window,
        });

        if let Some(message) = self
            .metric_failures
            .get(&(account_id.to_string(), query.level.to_string()))
        {
            return Err(ApiError::new(message.clone()));
        }

        let rows = query
            .window
            .since
            .iter_days()
            .take_while(|d| *d <= query.window.until)
            .map(|d| {
                record(json!({
                    "date_start": d.to_string(),
                    "date_stop": d.to_string(),
                    "impressions": "100",
                    "campaign_id": "c1",
                }))
            })
            .collect();
        Ok(rows)
    }
}

// ============================================================================
// Recording pacer
// ============================================================================

/// Records pauses instead of sleeping
#[derive(Default)]
pub struct RecordingPacer {
    pauses: Mutex<Vec<(Duration, PauseReason)>>,
}

impl RecordingPacer {
    pub fn pauses(&self) -> Vec<(Duration, PauseReason)> {
        self.pauses.lock().unwrap().clone()
    }

    pub fn count(&self, reason: PauseReason) -> usize {
        self.pauses().iter().filter(|(_, r)| *r == reason).count()
    }

    /// Inter-account pauses only, in order
    pub fn account_pauses(&self) -> Vec<(Duration, PauseReason)> {
        self.pauses()
            .into_iter()
            .filter(|(_, r)| *r != PauseReason::PageCooldown)
            .collect()
    }
}

#[async_trait]
impl Pacer for RecordingPacer {
    async fn pause(&self, duration: Duration, reason: PauseReason) {
        self.pauses.lock().unwrap().push((duration, reason));
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub api: Arc<ScriptedApi>,
    pub warehouse: Arc<MemoryWarehouse>,
    pub ledger: Arc<MemoryLedger>,
    pub pacer: Arc<RecordingPacer>,
    pub orchestrator: Orchestrator,
    pub accounts: Vec<String>,
}

pub fn config_for(accounts: &[&str]) -> SyncConfig {
    SyncConfig {
        account_ids: accounts.iter().map(|s| s.to_string()).collect(),
        ..SyncConfig::default()
    }
}

/// Orchestrator over the fakes, with the warehouse already bootstrapped
pub async fn harness(accounts: &[&str], api: ScriptedApi) -> Harness {
    harness_with_ledger(accounts, api, MemoryLedger::new()).await
}

pub async fn harness_with_ledger(accounts: &[&str], api: ScriptedApi, ledger: MemoryLedger) -> Harness {
    let config = config_for(accounts);
    let api = Arc::new(api);
    let warehouse = Arc::new(MemoryWarehouse::new(config.dataset.clone()));
    let ledger = Arc::new(ledger);
    let pacer = Arc::new(RecordingPacer::default());

    let orchestrator = Orchestrator::new(
        &config,
        api.clone(),
        warehouse.clone(),
        ledger.clone(),
        pacer.clone(),
    );
    orchestrator.bootstrap().await.unwrap();

    Harness {
        api,
        warehouse,
        ledger,
        pacer,
        orchestrator,
        accounts: config.account_ids.clone(),
    }
}

/// 2024-03-10 06:00 UTC
pub fn run_ts() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap()
}

/// Rows of `table` that belong to `account`
pub fn rows_for(warehouse: &MemoryWarehouse, table: &str, account: &str) -> usize {
    warehouse
        .rows(table)
        .unwrap()
        .iter()
        .filter(|r| r.get("ad_account_id").and_then(|v| v.as_str()) == Some(account))
        .count()
}

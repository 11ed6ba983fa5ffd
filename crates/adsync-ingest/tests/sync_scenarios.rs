//! End-to-end sync passes over scripted collaborators
//!
//! These tests drive the orchestrator through:
//! - Paced pagination of a large structural resource
//! - Quota and non-quota fetch failures
//! - Empty batches, table-level load failures
//! - Incremental windows and immediate reruns
//! - Ledger read/write failures

mod common;

use adsync_common::types::{AuditRecord, AuditStatus};
use adsync_ingest::catalog::FETCH_ALL;
use adsync_ingest::ledger::MemoryLedger;
use adsync_ingest::orchestrator::AccountResult;
use adsync_ingest::pacing::PauseReason;
use adsync_ingest::warehouse::WarehouseCall;
use adsync_ingest::window::SyncWindow;
use chrono::{Duration as ChronoDuration, NaiveDate};
use common::*;
use std::time::Duration;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn load_calls_for(calls: &[WarehouseCall], table: &str) -> usize {
    calls
        .iter()
        .filter(|c| matches!(c, WarehouseCall::LoadRows { table: t, .. } if t == table))
        .count()
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test]
async fn test_250_campaigns_three_pages_two_cooldowns() {
    let api = ScriptedApi::new().with_records("act_A", "campaigns", 250);
    let mut h = harness(&["act_A"], api).await;

    let summary = h.orchestrator.run_at(&h.accounts, run_ts()).await;

    assert_eq!(h.api.page_calls("act_A", "campaigns"), 3);
    assert_eq!(h.pacer.count(PauseReason::PageCooldown), 2);

    let account = summary.account("act_A").unwrap();
    assert!(account.is_completed());
    let campaigns = account.table("campaigns").unwrap();
    assert_eq!(campaigns.status, AuditStatus::Success);
    assert_eq!(campaigns.rows, 250);

    let audit: Vec<AuditRecord> = h.ledger.records_for("act_A").unwrap();
    let campaigns_audit = audit.iter().find(|r| r.table_name == "campaigns").unwrap();
    assert_eq!(campaigns_audit.rows_processed, Some(250));
    assert_eq!(campaigns_audit.status, AuditStatus::Success);
    assert_eq!(campaigns_audit.run_timestamp, run_ts());

    assert_eq!(rows_for(&h.warehouse, "campaigns", "act_A"), 250);
}

#[tokio::test]
async fn test_one_audit_record_per_table_per_pass() {
    let api = ScriptedApi::new()
        .with_records("act_A", "campaigns", 3)
        .with_records("act_A", "adsets", 4)
        .with_records("act_A", "ads", 5);
    let mut h = harness(&["act_A"], api).await;

    h.orchestrator.run_at(&h.accounts, run_ts()).await;

    let audit = h.ledger.records_for("act_A").unwrap();
    let mut tables: Vec<&str> = audit.iter().map(|r| r.table_name.as_str()).collect();
    tables.sort_unstable();
    assert_eq!(
        tables,
        vec!["ad_insights", "ads", "adset_insights", "adsets", "campaign_insights", "campaigns"]
    );
    assert!(audit.iter().all(|r| r.status == AuditStatus::Success));
}

// ============================================================================
// Fetch failures
// ============================================================================

#[tokio::test]
async fn test_quota_failure_aborts_account_with_long_backoff() {
    let api = ScriptedApi::new()
        .with_records("act_A", "campaigns", 10)
        .with("act_B", "campaigns", Script::Fail("Error: quota exceeded".to_string()))
        .with_records("act_C", "campaigns", 10);
    let mut h = harness(&["act_A", "act_B", "act_C"], api).await;

    let summary = h.orchestrator.run_at(&h.accounts, run_ts()).await;

    // Exactly one FATAL_FAILURE on FETCH_ALL for B
    let b_audit = h.ledger.records_for("act_B").unwrap();
    assert_eq!(b_audit.len(), 1);
    assert_eq!(b_audit[0].table_name, FETCH_ALL);
    assert_eq!(b_audit[0].status, AuditStatus::FatalFailure);
    assert!(b_audit[0].error_message.as_deref().unwrap().contains("quota exceeded"));

    // No load for B
    for table in ["campaigns", "adsets", "ads", "ad_insights"] {
        assert_eq!(rows_for(&h.warehouse, table, "act_B"), 0);
    }
    assert!(h.api.metric_calls_for("act_B").is_empty());

    // 180s before C, standard rests around it
    assert_eq!(
        h.pacer.account_pauses(),
        vec![
            (Duration::from_secs(30), PauseReason::Rest),
            (Duration::from_secs(180), PauseReason::LongBackoff),
            (Duration::from_secs(30), PauseReason::Rest),
        ]
    );

    // C still ran
    assert!(summary.account("act_C").unwrap().is_completed());
    assert_eq!(rows_for(&h.warehouse, "campaigns", "act_C"), 10);
    match &summary.account("act_B").unwrap().result {
        AccountResult::Aborted { quota_exhausted, .. } => assert!(*quota_exhausted),
        other => panic!("expected abort, got {:?}", other),
    }
}

#[tokio::test]
async fn test_mid_stream_non_quota_failure_rests_standard_interval() {
    let api = ScriptedApi::new()
        .with_records("act_A", "campaigns", 5)
        .with("act_A", "adsets", Script::FailAfterPages(2, "Service temporarily unavailable".to_string()));
    let mut h = harness(&["act_A"], api).await;

    let summary = h.orchestrator.run_at(&h.accounts, run_ts()).await;

    let audit = h.ledger.records_for("act_A").unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].table_name, FETCH_ALL);
    assert!(audit[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("after 200 records"));

    // Campaigns were fetched but never loaded
    assert_eq!(h.warehouse.load_calls().unwrap(), 0);
    assert_eq!(h.pacer.account_pauses(), vec![(Duration::from_secs(30), PauseReason::Rest)]);
    assert!(!summary.account("act_A").unwrap().is_completed());
}

#[tokio::test]
async fn test_metric_query_failure_is_fatal_for_account() {
    let api = ScriptedApi::new()
        .with_records("act_A", "campaigns", 5)
        .failing_metrics("act_A", "adset", "(#17) User request limit reached");
    let mut h = harness(&["act_A"], api).await;

    h.orchestrator.run_at(&h.accounts, run_ts()).await;

    let audit = h.ledger.records_for("act_A").unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].status, AuditStatus::FatalFailure);
    assert_eq!(h.warehouse.load_calls().unwrap(), 0);
    assert_eq!(h.pacer.account_pauses()[0].1, PauseReason::LongBackoff);
}

// ============================================================================
// Loading
// ============================================================================

#[tokio::test]
async fn test_zero_adsets_skipped_without_write() {
    let api = ScriptedApi::new()
        .with_records("act_C", "campaigns", 2)
        .with_records("act_C", "adsets", 0)
        .with_records("act_C", "ads", 2);
    let mut h = harness(&["act_C"], api).await;

    let summary = h.orchestrator.run_at(&h.accounts, run_ts()).await;

    let adsets = summary.account("act_C").unwrap().table("adsets").unwrap();
    assert_eq!(adsets.status, AuditStatus::Skipped);
    assert_eq!(adsets.rows, 0);

    let audit = h.ledger.records_for("act_C").unwrap();
    let adsets_audit = audit.iter().find(|r| r.table_name == "adsets").unwrap();
    assert_eq!(adsets_audit.status, AuditStatus::Skipped);
    assert_eq!(adsets_audit.rows_processed, Some(0));

    let calls = h.warehouse.calls().unwrap();
    assert_eq!(load_calls_for(&calls, "adsets"), 0);
    assert_eq!(load_calls_for(&calls, "campaigns"), 1);
}

#[tokio::test]
async fn test_load_failure_is_isolated_to_its_table() {
    let api = ScriptedApi::new()
        .with_records("act_A", "campaigns", 3)
        .with_records("act_A", "ads", 3);
    let mut h = harness(&["act_A", "act_B"], api).await;
    h.warehouse.reject_table("ads", "schema mismatch on column creative").unwrap();

    let summary = h.orchestrator.run_at(&h.accounts, run_ts()).await;

    let account = summary.account("act_A").unwrap();
    assert!(account.is_completed());
    let ads = account.table("ads").unwrap();
    assert_eq!(ads.status, AuditStatus::Failure);
    assert!(ads.error.as_deref().unwrap().contains("schema mismatch"));
    assert_eq!(account.table("campaigns").unwrap().status, AuditStatus::Success);
    assert_eq!(account.table("ad_insights").unwrap().status, AuditStatus::Success);

    let audit = h.ledger.records_for("act_A").unwrap();
    let ads_audit = audit.iter().find(|r| r.table_name == "ads").unwrap();
    assert_eq!(ads_audit.status, AuditStatus::Failure);
    assert_eq!(ads_audit.rows_processed, Some(3));
    assert!(ads_audit.error_message.is_some());
    assert_eq!(ads.rows, 3);
    // Attempted rows are not counted as loaded
    assert_eq!(account.rows_loaded(), account.tables.iter().filter(|t| t.table != "ads").map(|t| t.rows).sum::<u64>());

    // Success rest, and the next account still runs
    assert_eq!(h.pacer.account_pauses()[0], (Duration::from_secs(30), PauseReason::Rest));
    assert!(summary.account("act_B").unwrap().is_completed());
}

#[tokio::test]
async fn test_rows_are_enriched_and_metrics_partitioned() {
    let api = ScriptedApi::new().with_records("act_A", "campaigns", 1);
    let mut h = harness(&["act_A"], api).await;

    h.orchestrator.run_at(&h.accounts, run_ts()).await;

    let campaign = &h.warehouse.rows("campaigns").unwrap()[0];
    assert_eq!(campaign.get("ad_account_id").unwrap(), "act_A");
    assert!(campaign.get("last_run_timestamp").unwrap().as_str().unwrap().starts_with("2024-03-10T06:00:00"));

    let calls = h.warehouse.calls().unwrap();
    assert!(calls.iter().any(|c| matches!(
        c,
        WarehouseCall::LoadRows { table, partition_field: Some(field), .. }
            if table == "ad_insights" && field == "last_run_timestamp"
    )));
}

#[tokio::test]
async fn test_structural_snapshot_is_table_wide_across_accounts() {
    let api = ScriptedApi::new()
        .with_records("act_A", "campaigns", 4)
        .with_records("act_B", "campaigns", 2)
        .with_records("act_A", "ads", 3);
    let mut h = harness(&["act_A", "act_B"], api).await;

    h.orchestrator.run_at(&h.accounts, run_ts()).await;

    // Each structural load replaces the whole table; the last account wins
    assert_eq!(h.warehouse.rows("campaigns").unwrap().len(), 2);
    assert_eq!(rows_for(&h.warehouse, "campaigns", "act_A"), 0);
    assert_eq!(rows_for(&h.warehouse, "campaigns", "act_B"), 2);

    // An empty batch is skipped, so the previous snapshot survives
    assert_eq!(rows_for(&h.warehouse, "ads", "act_A"), 3);

    // Metric tables append per account
    assert_eq!(rows_for(&h.warehouse, "ad_insights", "act_A"), 7);
    assert_eq!(rows_for(&h.warehouse, "ad_insights", "act_B"), 7);
}

// ============================================================================
// Incremental windows
// ============================================================================

#[tokio::test]
async fn test_first_sync_requests_lookback_window() {
    let mut h = harness(&["act_A"], ScriptedApi::new()).await;

    h.orchestrator.run_at(&h.accounts, run_ts()).await;

    let calls = h.api.metric_calls_for("act_A");
    assert_eq!(calls.len(), 3);
    let expected = SyncWindow::new(date(2024, 3, 3), date(2024, 3, 9));
    assert!(calls.iter().all(|c| c.window == expected));
    assert_eq!(rows_for(&h.warehouse, "ad_insights", "act_A"), 7);
}

#[tokio::test]
async fn test_resume_day_after_last_success_per_account() {
    let ledger = MemoryLedger::with_records(vec![
        AuditRecord::new(
            run_ts() - ChronoDuration::days(4),
            "campaign_insights",
            "act_A",
            10,
            AuditStatus::Success,
        ),
        AuditRecord::new(
            run_ts() - ChronoDuration::days(2),
            "ad_insights",
            "act_B",
            10,
            AuditStatus::Success,
        ),
    ]);
    let mut h = harness_with_ledger(&["act_A", "act_B"], ScriptedApi::new(), ledger).await;

    let summary = h.orchestrator.run_at(&h.accounts, run_ts()).await;

    assert_eq!(
        summary.account("act_A").unwrap().window,
        Some(SyncWindow::new(date(2024, 3, 7), date(2024, 3, 9)))
    );
    assert_eq!(
        summary.account("act_B").unwrap().window,
        Some(SyncWindow::new(date(2024, 3, 9), date(2024, 3, 9)))
    );
    assert_eq!(rows_for(&h.warehouse, "adset_insights", "act_B"), 1);
}

#[tokio::test]
async fn test_immediate_rerun_is_idempotent() {
    let api = ScriptedApi::new()
        .with_records("act_A", "campaigns", 120)
        .with_records("act_A", "ads", 7);
    let mut h = harness(&["act_A"], api).await;

    h.orchestrator.run_at(&h.accounts, run_ts()).await;
    let metric_calls_first = h.api.metric_calls().len();
    let insights_first = rows_for(&h.warehouse, "ad_insights", "act_A");
    assert_eq!(metric_calls_first, 3);

    let second = h
        .orchestrator
        .run_at(&h.accounts, run_ts() + ChronoDuration::minutes(5))
        .await;

    // Structural: overwritten, same count
    assert_eq!(rows_for(&h.warehouse, "campaigns", "act_A"), 120);
    assert_eq!(rows_for(&h.warehouse, "ads", "act_A"), 7);

    // Metrics: empty window, nothing requested or appended
    let account = second.account("act_A").unwrap();
    assert!(account.window.unwrap().is_empty());
    assert_eq!(h.api.metric_calls().len(), metric_calls_first);
    assert_eq!(rows_for(&h.warehouse, "ad_insights", "act_A"), insights_first);
    for table in ["ad_insights", "adset_insights", "campaign_insights"] {
        let outcome = account.table(table).unwrap();
        assert_eq!(outcome.status, AuditStatus::Skipped);
        assert_eq!(outcome.rows, 0);
    }
}

// ============================================================================
// Ledger failures
// ============================================================================

#[tokio::test]
async fn test_ledger_write_failure_raises_alarm_without_stopping_run() {
    let ledger = MemoryLedger::new();
    ledger.fail_writes("audit table unavailable").unwrap();
    let api = ScriptedApi::new()
        .with_records("act_A", "campaigns", 2)
        .with("act_B", "campaigns", Script::Fail("boom".to_string()));
    let mut h = harness_with_ledger(&["act_A", "act_B"], api, ledger).await;

    let summary = h.orchestrator.run_at(&h.accounts, run_ts()).await;

    // 6 table records for A, 1 FETCH_ALL for B
    assert_eq!(summary.ledger_alarms, 7);
    assert!(summary.account("act_A").unwrap().is_completed());
    assert_eq!(rows_for(&h.warehouse, "campaigns", "act_A"), 2);
    assert!(summary.summarize().contains("Ledger alarms: 7"));
}

#[tokio::test]
async fn test_ledger_read_failure_aborts_account_with_standard_rest() {
    let ledger = MemoryLedger::new();
    ledger.fail_reads("connection reset").unwrap();
    let api = ScriptedApi::new().with_records("act_A", "campaigns", 2);
    let mut h = harness_with_ledger(&["act_A"], api, ledger).await;

    let summary = h.orchestrator.run_at(&h.accounts, run_ts()).await;

    assert_eq!(h.api.page_calls("act_A", "campaigns"), 0);
    let audit = h.ledger.records_for("act_A").unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].table_name, FETCH_ALL);
    assert_eq!(audit[0].status, AuditStatus::FatalFailure);
    assert_eq!(h.pacer.account_pauses(), vec![(Duration::from_secs(30), PauseReason::Rest)]);
    assert!(summary.account("act_A").unwrap().window.is_none());
}

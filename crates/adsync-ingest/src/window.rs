//! Incremental date windows for metric fetches
//!
//! `until` is always the day before the run date, because the upstream does
//! not guarantee that same-day numbers are final. `since` resumes the day
//! after the account's last successful metric load, or falls back to a
//! lookback from the run date on first sync.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Default lookback, in days, for accounts that have never synced
pub const DEFAULT_LOOKBACK_DAYS: u32 = 7;

/// Largest lookback accepted by configuration (about ten years)
pub const MAX_LOOKBACK_DAYS: u32 = 3650;

/// Inclusive date range requested for metric data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncWindow {
    pub since: NaiveDate,
    pub until: NaiveDate,
}

impl SyncWindow {
    pub fn new(since: NaiveDate, until: NaiveDate) -> Self {
        Self { since, until }
    }

    /// An empty window means "up to date": skip metric fetching entirely
    pub fn is_empty(&self) -> bool {
        self.since > self.until
    }

    /// Number of days covered (0 when empty)
    pub fn days(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            (self.until - self.since).num_days() + 1
        }
    }
}

impl std::fmt::Display for SyncWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.since.format("%Y-%m-%d"), self.until.format("%Y-%m-%d"))
    }
}

/// Computes the metric window for one account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlanner {
    run_date: NaiveDate,
    lookback_days: u32,
}

impl WindowPlanner {
    /// Create a new planner for a pass running on `run_date`
    pub fn new(run_date: NaiveDate, lookback_days: u32) -> Self {
        Self {
            run_date,
            lookback_days,
        }
    }

    /// Plan the window given the account's last successful metric load.
    ///
    /// The result may be empty (`since > until`); callers must check
    /// [`SyncWindow::is_empty`] and skip the metric fetch when it is.
    pub fn plan(&self, last_success: Option<DateTime<Utc>>) -> SyncWindow {
        let until = self.run_date.pred_opt().unwrap_or(NaiveDate::MIN);
        // Dates past the calendar range clamp to its edges
        let since = match last_success {
            None => self
                .run_date
                .checked_sub_days(Days::new(u64::from(self.lookback_days)))
                .unwrap_or(NaiveDate::MIN),
            Some(ts) => ts.date_naive().succ_opt().unwrap_or(NaiveDate::MAX),
        };
        SyncWindow { since, until }
    }
}

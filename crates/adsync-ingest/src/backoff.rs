//! Inter-account pacing state machine
//!
//! ```text
//!   Normal --success--------> Resting(rest)
//!   Normal --other failure--> Resting(rest)
//!   Normal --quota failure--> LongBackoff(long_backoff)
//!   Resting / LongBackoff --settle()--> Normal
//! ```
//!
//! The quota is per application, so the pause is global: it is always served
//! in full before the orchestrator moves to the next account.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::FetchError;
use crate::pacing::{Pacer, PauseReason};
use crate::quota::{FailureClassifier, FailureKind, SignatureClassifier};

pub const DEFAULT_REST: Duration = Duration::from_secs(30);
pub const DEFAULT_LONG_BACKOFF: Duration = Duration::from_secs(180);

/// Pause lengths applied between accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub rest: Duration,
    pub long_backoff: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            rest: DEFAULT_REST,
            long_backoff: DEFAULT_LONG_BACKOFF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "secs", rename_all = "snake_case")]
pub enum BackoffState {
    Normal,
    Resting(u64),
    LongBackoff(u64),
}

/// A pause that was served, for the run summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PauseRecord {
    pub account: String,
    pub reason: PauseReason,
    pub secs: u64,
}

pub struct BackoffController {
    policy: BackoffPolicy,
    classifier: Arc<dyn FailureClassifier>,
    pacer: Arc<dyn Pacer>,
    state: BackoffState,
}

impl BackoffController {
    pub fn new(policy: BackoffPolicy, pacer: Arc<dyn Pacer>) -> Self {
        Self::with_classifier(policy, Arc::new(SignatureClassifier::default()), pacer)
    }

    pub fn with_classifier(
        policy: BackoffPolicy,
        classifier: Arc<dyn FailureClassifier>,
        pacer: Arc<dyn Pacer>,
    ) -> Self {
        Self {
            policy,
            classifier,
            pacer,
            state: BackoffState::Normal,
        }
    }

    pub fn state(&self) -> BackoffState {
        self.state
    }

    /// Account completed; rest before the next one
    pub fn on_success(&mut self) -> BackoffState {
        self.state = BackoffState::Resting(self.policy.rest.as_secs());
        self.state
    }

    /// Account aborted by a fetch failure; pick the pause by severity
    pub fn on_failure(&mut self, err: &FetchError) -> BackoffState {
        self.state = match self.classifier.classify_fetch(err) {
            FailureKind::QuotaExhausted => BackoffState::LongBackoff(self.policy.long_backoff.as_secs()),
            FailureKind::Other => BackoffState::Resting(self.policy.rest.as_secs()),
        };
        self.state
    }

    /// Account aborted before fetching (e.g. ledger unreadable); standard rest
    pub fn on_abort(&mut self) -> BackoffState {
        self.state = BackoffState::Resting(self.policy.rest.as_secs());
        self.state
    }

    /// Serve the pending pause in full and return to `Normal`
    pub async fn settle(&mut self, account: &str) -> Option<PauseRecord> {
        let (duration, reason) = match self.state {
            BackoffState::Normal => return None,
            BackoffState::Resting(_) => (self.policy.rest, PauseReason::Rest),
            BackoffState::LongBackoff(_) => (self.policy.long_backoff, PauseReason::LongBackoff),
        };

        if reason == PauseReason::LongBackoff {
            warn!(
                account = %account,
                pause_secs = duration.as_secs(),
                reason = %reason,
                "Quota exhausted, backing off"
            );
        } else {
            info!(account = %account, pause_secs = duration.as_secs(), reason = %reason, "Resting");
        }

        self.pacer.pause(duration, reason).await;
        self.state = BackoffState::Normal;

        Some(PauseRecord {
            account: account.to_string(),
            reason,
            secs: duration.as_secs(),
        })
    }
}

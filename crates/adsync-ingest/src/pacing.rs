//! Pause strategy
//!
//! Every pause in the engine (page cooldown, inter-account rest, long backoff)
//! goes through a [`Pacer`], so the orchestration logic can be exercised
//! without real delays. Pauses are awaited in place: the orchestrator does no
//! other work while one is in progress.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Why the engine is pausing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    /// Self-imposed throttle after a full page of records
    PageCooldown,
    /// Standard rest before the next account
    Rest,
    /// Extended rest after a quota-exhaustion failure
    LongBackoff,
}

impl PauseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PauseReason::PageCooldown => "page_cooldown",
            PauseReason::Rest => "rest",
            PauseReason::LongBackoff => "long_backoff",
        }
    }
}

impl std::fmt::Display for PauseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Suspends the caller for a given duration
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, duration: Duration, reason: PauseReason);
}

/// Real-time pacer backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, duration: Duration, reason: PauseReason) {
        if duration.is_zero() {
            return;
        }
        debug!(pause_secs = duration.as_secs_f64(), reason = %reason, "Pausing");
        tokio::time::sleep(duration).await;
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounds on how hard the engine tries before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after a version conflict on an unpinned write.
    pub max_conflict_retries: u32,
    /// Extra attempts after a transient gateway failure.
    pub max_gateway_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
            max_gateway_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// No waiting and no retries. Useful for tests that need to observe the first failure.
    pub fn none() -> Self {
        Self {
            max_conflict_retries: 0,
            max_gateway_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Exponential backoff for the given (zero-based) retry, capped at `max_backoff`, with up to 25% random jitter
    /// subtracted so that colliding writers spread out.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let delay = self.initial_backoff.saturating_mul(factor).min(self.max_backoff);
        let jitter_ms = (delay.as_millis() / 4) as u64;
        if jitter_ms == 0 {
            delay
        } else {
            delay.saturating_sub(Duration::from_millis(rand::random::<u64>() % jitter_ms))
        }
    }

    pub async fn sleep(&self, attempt: u32) {
        let delay = self.backoff(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

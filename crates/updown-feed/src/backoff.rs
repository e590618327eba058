//! Reconnect backoff shared by every feed connection.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Exponential reconnect backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Backoff {
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Upper bound before jitter.
    pub max_delay_ms: u64,
    /// Consecutive failures tolerated (0 = infinite).
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            max_attempts: 0,
        }
    }
}

impl Backoff {
    /// `min(base * 2^(attempt-1), max)`, exponent capped at 10.
    ///
    /// attempt=1 -> base, attempt=2 -> 2*base, attempt=3 -> 4*base
    pub fn capped_delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(10);
        self.base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms)
    }

    /// Delay for `attempt` with 0-1000ms of jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.capped_delay_ms(attempt) + rand_jitter())
    }

    /// Whether `attempt` consecutive failures exhaust the budget.
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

/// Sleep for `delay` unless `token` fires first. Returns `true` if cancelled.
pub async fn sleep_or_cancel(delay: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => false,
        () = token.cancelled() => true,
    }
}

/// Generate random jitter (0-1000ms).
fn rand_jitter() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as u64
}

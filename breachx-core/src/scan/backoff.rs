use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff bounds, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 2_000,
            max_ms: 30_000,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`
    /// capped at `max`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = Duration::from_millis(self.base_ms);
        let max = Duration::from_millis(self.max_ms.max(self.base_ms));
        let multiplier = 2_u32.saturating_pow(attempt.saturating_sub(1));
        base.saturating_mul(multiplier).min(max)
    }
}

/// Retry counter over a [`BackoffPolicy`]; reset on every success.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        self.policy.delay_for(self.attempts)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

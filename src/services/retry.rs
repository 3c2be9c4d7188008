//! Backoff schedules for store retries.
//!
//! Listing backs off exponentially with jitter; per-object operations back
//! off linearly. Attempts are zero-based throughout.

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// `base * 2^attempt + uniform(0, jitter)`.
    Exponential { base: Duration, jitter: Duration },
    /// `step * (attempt + 1)`.
    Linear { step: Duration },
}

impl Backoff {
    /// Listing schedule: `2^attempt + uniform(0, 1)` seconds.
    pub fn listing() -> Self {
        Backoff::Exponential {
            base: Duration::from_secs(1),
            jitter: Duration::from_secs(1),
        }
    }

    /// Per-object schedule: `0.5 * attempt_number` seconds.
    pub fn per_object() -> Self {
        Backoff::Linear {
            step: Duration::from_millis(500),
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Exponential { base, jitter } => {
                let scaled = base.saturating_mul(2u32.saturating_pow(attempt));
                let jitter_ms = jitter.as_millis() as u64;
                let extra = if jitter_ms == 0 {
                    0
                } else {
                    rand::rng().random_range(0..=jitter_ms)
                };
                scaled.saturating_add(Duration::from_millis(extra))
            }
            Backoff::Linear { step } => step.saturating_mul(attempt.saturating_add(1)),
        }
    }

    /// Sleep out the delay that follows a failed `attempt`.
    pub async fn wait(&self, attempt: u32) {
        let delay = self.delay(attempt);
        info!(
            attempt = attempt + 1,
            wait_ms = delay.as_millis() as u64,
            "waiting before next attempt"
        );
        sleep(delay).await;
    }
}

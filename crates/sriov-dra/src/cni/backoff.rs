//! Bounded exponential backoff for plugin invocations

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

use super::error::CniError;
use crate::consts::CNI_BACKOFF_CAP;
use crate::consts::CNI_BACKOFF_FACTOR;
use crate::consts::CNI_BACKOFF_INITIAL;
use crate::consts::CNI_BACKOFF_JITTER;
use crate::consts::CNI_BACKOFF_STEPS;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub factor: f64,
    /// Fraction of the delay added or removed at random.
    pub jitter: f64,
    /// Maximum number of attempts.
    pub steps: u32,
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: CNI_BACKOFF_INITIAL,
            factor: CNI_BACKOFF_FACTOR,
            jitter: CNI_BACKOFF_JITTER,
            steps: CNI_BACKOFF_STEPS,
            cap: CNI_BACKOFF_CAP,
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry` (0-based), without jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let scaled = self.initial.as_secs_f64() * self.factor.powi(retry as i32);
        Duration::from_secs_f64(scaled.min(self.cap.as_secs_f64()))
    }

    /// Delay before retry number `retry` with jitter, never above the cap.
    pub fn delay(&self, retry: u32) -> Duration {
        duration_with_jitter(self.base_delay(retry), self.jitter).min(self.cap)
    }
}

/// Create a duration with jitter to avoid thundering herd problems
fn duration_with_jitter(base_duration: Duration, jitter_percent: f64) -> Duration {
    let jitter_range = base_duration.as_secs_f64() * jitter_percent;
    if jitter_range <= 0.0 {
        return base_duration;
    }

    let jitter_offset = rand::rng().random_range(-jitter_range..=jitter_range);
    Duration::from_secs_f64((base_duration.as_secs_f64() + jitter_offset).max(0.0))
}

/// Run `operation` until it succeeds, fails permanently, or runs out of attempts.
///
/// The last error is returned when every attempt failed.
pub async fn retry_with_backoff<T, F, Fut>(
    backoff: &Backoff,
    what: &str,
    mut operation: F,
) -> Result<T, CniError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CniError>>,
{
    let attempts = backoff.steps.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < attempts => {
                let delay = backoff.delay(attempt - 1);
                warn!(
                    operation = what,
                    attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Network plugin call failed, retrying: {err}"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

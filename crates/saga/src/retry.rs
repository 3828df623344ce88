//! Exponential backoff retry for transient failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

/// Backoff schedule: `initial_delay * 2^(attempt-1)`, capped at
/// `max_delay`, plus optional uniform jitter.
#[derive(Clone, Debug)]
pub struct Backoff {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound for the exponential delay.
    pub max_delay: Duration,
    /// Extra random delay in `0..=jitter` added to each wait.
    pub jitter: Option<Duration>,
}

impl Backoff {
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let mut delay = self.initial_delay.saturating_mul(factor).min(self.max_delay);
        if let Some(jitter) = self.jitter {
            let extra = rand::thread_rng().gen_range(0..=jitter.as_millis() as u64);
            delay += Duration::from_millis(extra);
        }
        delay
    }
}

/// Executes `operation` until it succeeds, fails with a non-retryable
/// error, or exhausts the attempt budget. The last error is returned on
/// failure.
pub async fn retry<F, Fut, T, E>(
    policy: &Backoff,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempt, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(error) => {
                if !is_retryable(&error) {
                    tracing::debug!(error = %error, "permanent failure, not retrying");
                    return Err(error);
                }
                if attempt >= policy.max_attempts {
                    tracing::warn!(attempt, error = %error, "operation failed after all retries");
                    return Err(error);
                }

                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    attempt,
                    error = %error,
                    delay_ms = delay.as_millis(),
                    "transient failure, retrying after delay"
                );
                sleep(delay).await;
            }
        }
    }
}

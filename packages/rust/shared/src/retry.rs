//! Exponential backoff around fallible async operations.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::{DefaultsConfig, LlmConfig};
use crate::error::GrantScoutError;

/// Attempts and delays for [`retry`].
///
/// Delay before attempt `n + 1` is `base_delay * factor^(n - 1)`, capped at
/// `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(llm: &LlmConfig) -> Self {
        Self {
            max_attempts: llm.max_attempts.max(1),
            base_delay: Duration::from_millis(llm.base_delay_ms),
            ..Self::default()
        }
    }

    /// Policy for page and feed requests.
    pub fn for_fetches(defaults: &DefaultsConfig) -> Self {
        Self {
            max_attempts: defaults.fetch_attempts.max(1),
            base_delay: Duration::from_millis(defaults.fetch_base_delay_ms),
            ..Self::default()
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            factor: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    /// Wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(30) as i32;
        let secs = self.base_delay.as_secs_f64() * self.factor.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Default failure classifier: retry only transient errors.
pub fn is_retryable(err: &GrantScoutError) -> bool {
    err.is_transient()
}

/// Run `op` until it succeeds, the classifier rejects the error, or the
/// policy's attempts run out. The last error is returned.
pub async fn retry<T, F, Fut, C>(policy: &RetryPolicy, classify: C, mut op: F) -> Result<T, GrantScoutError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, GrantScoutError>>,
    C: Fn(&GrantScoutError) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && classify(&e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

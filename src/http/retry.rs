use std::future::Future;
use std::time::Duration;
use tracing::debug;

use super::error::ApiError;

/// Exponential backoff for interactive calls.
///
/// The delay starts at `initial_delay` and doubles after every failed
/// attempt. Only retryable failures are retried; after `max_attempts` the
/// last error is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub initial_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      initial_delay: Duration::from_millis(1000),
    }
  }
}

impl RetryPolicy {
  /// A policy that never retries.
  pub fn none() -> Self {
    Self {
      max_attempts: 1,
      initial_delay: Duration::ZERO,
    }
  }

  pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ApiError>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
  {
    let max_attempts = self.max_attempts.max(1);
    let mut delay = self.initial_delay;
    let mut attempt = 1;

    loop {
      match op().await {
        Ok(value) => return Ok(value),
        Err(err) if attempt < max_attempts && err.kind.retryable() => {
          debug!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            kind = %err.kind,
            "retrying request"
          );
          tokio::time::sleep(delay).await;
          delay = delay.saturating_mul(2);
          attempt += 1;
        }
        Err(err) => return Err(err),
      }
    }
  }
}

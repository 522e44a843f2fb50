//! Request helpers: batching with a pause between batches, timing, request ids.

use futures::future::join_all;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};

use super::error::ApiError;

/// Outcome of a timed call.
#[derive(Debug)]
pub struct Measured<T> {
  pub duration: Duration,
  pub result: Result<T, ApiError>,
}

impl<T> Measured<T> {
  pub fn success(&self) -> bool {
    self.result.is_ok()
  }
}

/// Run `request` and record how long it took, whatever the outcome.
pub async fn measure<T, Fut>(request: Fut) -> Measured<T>
where
  Fut: Future<Output = Result<T, ApiError>>,
{
  let start = Instant::now();
  let result = request.await;
  Measured {
    duration: start.elapsed(),
    result,
  }
}

/// Run requests `batch_size` at a time, pausing `delay` between batches.
///
/// Results keep the input order; one failure does not stop the others.
pub async fn batch<T, F, Fut>(
  requests: Vec<F>,
  batch_size: usize,
  delay: Duration,
) -> Vec<Result<T, ApiError>>
where
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<T, ApiError>>,
{
  let batch_size = batch_size.max(1);
  let total = requests.len();
  let mut results = Vec::with_capacity(total);
  let mut pending = requests.into_iter().peekable();

  while pending.peek().is_some() {
    let chunk: Vec<Fut> = pending.by_ref().take(batch_size).map(|f| f()).collect();
    results.extend(join_all(chunk).await);

    if results.len() < total {
      tokio::time::sleep(delay).await;
    }
  }

  results
}

/// Unique id for tracing a request: `req_<epoch ms>_<9 random chars>`.
pub fn generate_request_id(now_ms: i64) -> String {
  let suffix: String = rand::thread_rng()
    .sample_iter(&Alphanumeric)
    .take(9)
    .map(|c| char::from(c).to_ascii_lowercase())
    .collect();
  format!("req_{}_{}", now_ms, suffix)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::error::ErrorKind;
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[tokio::test(start_paused = true)]
  async fn test_batch_preserves_order_and_pauses_between_batches() {
    let in_flight = AtomicUsize::new(0);
    let max_seen = AtomicUsize::new(0);
    let (in_flight, max_seen) = (&in_flight, &max_seen);

    let requests: Vec<_> = (0..7)
      .map(|i| {
        move || async move {
          let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
          max_seen.fetch_max(now, Ordering::SeqCst);
          tokio::time::sleep(Duration::from_millis(10)).await;
          in_flight.fetch_sub(1, Ordering::SeqCst);
          if i == 3 {
            Err(ApiError::new(ErrorKind::ServerError, "boom"))
          } else {
            Ok(i)
          }
        }
      })
      .collect();

    let start = tokio::time::Instant::now();
    let results = batch(requests, 3, Duration::from_millis(100)).await;

    assert_eq!(results.len(), 7);
    assert_eq!(results[0].as_ref().unwrap(), &0);
    assert!(results[3].is_err());
    assert_eq!(results[6].as_ref().unwrap(), &6);
    assert_eq!(max_seen.load(Ordering::SeqCst), 3);
    // three batches of 10ms, two pauses of 100ms
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(230) && elapsed < Duration::from_millis(240));
  }

  #[test]
  fn test_request_id_shape() {
    let id = generate_request_id(1700000000000);
    assert!(id.starts_with("req_1700000000000_"));
    assert_eq!(id.len(), "req_1700000000000_".len() + 9);
    assert_ne!(id, generate_request_id(1700000000000));
  }
}

//! Durable FIFO of mutating requests captured while offline.
//!
//! States: empty, has-pending, draining. A drain replays entries strictly in
//! enqueue order and stops at the first retryable failure so ordering is
//! preserved. Entries that can never succeed (validation errors, other 4xx),
//! whose connection dropped after sending, or that have failed
//! `max_attempts` times are moved to a dead-letter list instead of blocking
//! everything behind them. The queue is written to the
//! store after every mutation.

mod connectivity;

pub use connectivity::ConnectivityMonitor;

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::http::util::generate_request_id;
use crate::http::{ApiError, Method, RequestOptions};
use crate::store::{keys, Storage};

/// Which configured endpoint a request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
  Api,
  Ai,
}

/// Serializable description of a deferred HTTP call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
  pub target: Target,
  pub method: Method,
  pub path: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub query: Vec<(String, String)>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub body: Option<Value>,
}

impl RequestDescriptor {
  pub fn new(target: Target, method: Method, path: impl Into<String>) -> Self {
    Self {
      target,
      method,
      path: path.into(),
      query: Vec::new(),
      body: None,
    }
  }

  pub fn with_body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }

  pub fn options(&self) -> RequestOptions {
    RequestOptions {
      query: self.query.clone(),
      body: self.body.clone(),
      public: false,
    }
  }
}

/// A captured request waiting for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedRequest {
  pub id: String,
  pub request: RequestDescriptor,
  /// Enqueue time, epoch milliseconds
  pub timestamp: i64,
  #[serde(default)]
  pub attempts: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_error: Option<String>,
}

/// What a drain pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
  /// Ids replayed successfully, in order
  pub processed: Vec<String>,
  /// Ids moved to the dead-letter list
  pub dead_lettered: Vec<String>,
  /// Id of the entry that stopped the pass, if any
  pub stopped_at: Option<String>,
  /// Entries still pending after the pass
  pub remaining: usize,
}

pub struct OfflineQueue {
  storage: Arc<dyn Storage>,
  clock: Arc<dyn Clock>,
  entries: Mutex<VecDeque<QueuedRequest>>,
  drain_lock: tokio::sync::Mutex<()>,
  max_attempts: u32,
}

impl OfflineQueue {
  /// Load any persisted queue. A corrupt queue is discarded.
  pub fn load(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, max_attempts: u32) -> Result<Self> {
    let entries = match storage.get(keys::REQUEST_QUEUE)? {
      Some(data) => match serde_json::from_str::<VecDeque<QueuedRequest>>(&data) {
        Ok(entries) => entries,
        Err(e) => {
          error!("Failed to load request queue, discarding it: {}", e);
          storage.remove(keys::REQUEST_QUEUE)?;
          VecDeque::new()
        }
      },
      None => VecDeque::new(),
    };

    if !entries.is_empty() {
      info!(pending = entries.len(), "loaded queued requests");
    }

    Ok(Self {
      storage,
      clock,
      entries: Mutex::new(entries),
      drain_lock: tokio::sync::Mutex::new(()),
      max_attempts: max_attempts.max(1),
    })
  }

  fn entries(&self) -> Result<MutexGuard<'_, VecDeque<QueuedRequest>>> {
    self.entries.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  fn persist(&self, entries: &VecDeque<QueuedRequest>) -> Result<()> {
    if entries.is_empty() {
      return self.storage.remove(keys::REQUEST_QUEUE);
    }
    let data =
      serde_json::to_string(entries).map_err(|e| eyre!("Failed to serialize queue: {}", e))?;
    self.storage.set(keys::REQUEST_QUEUE, &data)
  }

  /// Capture a request; returns its id.
  pub fn enqueue(&self, request: RequestDescriptor) -> Result<String> {
    let now = self.clock.now_ms();
    let entry = QueuedRequest {
      id: generate_request_id(now),
      request,
      timestamp: now,
      attempts: 0,
      last_error: None,
    };
    let id = entry.id.clone();

    let mut entries = self.entries()?;
    info!(
      id = %id,
      method = %entry.request.method,
      path = %entry.request.path,
      "queued request for replay"
    );
    entries.push_back(entry);
    self.persist(&entries)?;

    Ok(id)
  }

  /// Snapshot of pending entries in replay order.
  pub fn pending(&self) -> Result<Vec<QueuedRequest>> {
    Ok(self.entries()?.iter().cloned().collect())
  }

  pub fn len(&self) -> Result<usize> {
    Ok(self.entries()?.len())
  }

  pub fn is_empty(&self) -> Result<bool> {
    Ok(self.entries()?.is_empty())
  }

  /// Drop every pending entry.
  pub fn clear(&self) -> Result<()> {
    let mut entries = self.entries()?;
    entries.clear();
    self.storage.remove(keys::REQUEST_QUEUE)
  }

  /// Entries given up on.
  pub fn dead_letters(&self) -> Result<Vec<QueuedRequest>> {
    match self.storage.get(keys::DEAD_LETTER_QUEUE)? {
      Some(data) => serde_json::from_str(&data)
        .map_err(|e| eyre!("Failed to parse dead-letter queue: {}", e)),
      None => Ok(Vec::new()),
    }
  }

  pub fn clear_dead_letters(&self) -> Result<()> {
    self.storage.remove(keys::DEAD_LETTER_QUEUE)
  }

  fn push_dead_letter(&self, entry: QueuedRequest) -> Result<()> {
    let mut dead = self.dead_letters()?;
    dead.push(entry);
    let data = serde_json::to_string(&dead)
      .map_err(|e| eyre!("Failed to serialize dead-letter queue: {}", e))?;
    self.storage.set(keys::DEAD_LETTER_QUEUE, &data)
  }

  /// Replay pending entries in FIFO order through `dispatch`.
  ///
  /// Only one drain runs at a time; a second caller waits for the first.
  /// Entries enqueued during a pass are picked up by the same pass.
  pub async fn drain<F, Fut>(&self, mut dispatch: F) -> Result<DrainReport>
  where
    F: FnMut(RequestDescriptor) -> Fut,
    Fut: Future<Output = std::result::Result<(), ApiError>>,
  {
    let _guard = self.drain_lock.lock().await;
    let mut report = DrainReport::default();

    loop {
      let next = {
        let entries = self.entries()?;
        entries.front().cloned()
      };
      let Some(entry) = next else {
        break;
      };

      match dispatch(entry.request.clone()).await {
        Ok(()) => {
          let mut entries = self.entries()?;
          entries.retain(|e| e.id != entry.id);
          self.persist(&entries)?;
          info!(id = %entry.id, "Processed queued request");
          report.processed.push(entry.id);
        }
        Err(err) => {
          let mut entries = self.entries()?;
          let Some(position) = entries.iter().position(|e| e.id == entry.id) else {
            continue;
          };

          let failed = &mut entries[position];
          failed.attempts += 1;
          failed.last_error = Some(err.message.clone());
          let attempts = failed.attempts;

          if err.is_permanent() || attempts >= self.max_attempts {
            let dead = entries.remove(position);
            self.persist(&entries)?;
            drop(entries);
            if let Some(dead) = dead {
              self.push_dead_letter(dead)?;
            }
            warn!(
              id = %entry.id,
              attempts,
              kind = %err.kind,
              "Giving up on queued request: {}",
              err
            );
            report.dead_lettered.push(entry.id);
            continue;
          }

          self.persist(&entries)?;
          warn!(
            id = %entry.id,
            attempts,
            kind = %err.kind,
            "Failed to process queued request, will retry: {}",
            err
          );
          report.stopped_at = Some(entry.id);
          break;
        }
      }
    }

    report.remaining = self.len()?;
    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use crate::http::ErrorKind;
  use crate::store::MemoryStore;
  use serde_json::json;
  use std::sync::Mutex as StdMutex;

  fn queue_with(storage: Arc<MemoryStore>, max_attempts: u32) -> OfflineQueue {
    OfflineQueue::load(storage, Arc::new(ManualClock::new(1_000)), max_attempts).unwrap()
  }

  fn post(path: &str) -> RequestDescriptor {
    RequestDescriptor::new(Target::Api, Method::Post, path).with_body(json!({ "n": path }))
  }

  #[tokio::test]
  async fn test_full_drain_is_fifo_and_empties_queue() {
    let queue = queue_with(Arc::new(MemoryStore::new()), 5);
    for path in ["/a", "/b", "/c", "/d"] {
      queue.enqueue(post(path)).unwrap();
    }

    let seen = StdMutex::new(Vec::new());
    let seen_ref = &seen;
    let report = queue
      .drain(move |req| async move {
        seen_ref.lock().unwrap().push(req.path);
        Ok(())
      })
      .await
      .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["/a", "/b", "/c", "/d"]);
    assert_eq!(report.processed.len(), 4);
    assert_eq!(report.remaining, 0);
    assert!(queue.is_empty().unwrap());
  }

  #[tokio::test]
  async fn test_failure_stops_pass_and_keeps_order() {
    let queue = queue_with(Arc::new(MemoryStore::new()), 5);
    for path in ["/0", "/1", "/2", "/3", "/4"] {
      queue.enqueue(post(path)).unwrap();
    }

    let report = queue
      .drain(|req| async move {
        if req.path == "/2" {
          Err(ApiError::new(ErrorKind::ServerError, "down"))
        } else {
          Ok(())
        }
      })
      .await
      .unwrap();

    let remaining: Vec<String> = queue
      .pending()
      .unwrap()
      .into_iter()
      .map(|e| e.request.path)
      .collect();
    assert_eq!(remaining, vec!["/2", "/3", "/4"]);
    assert_eq!(report.processed.len(), 2);
    assert_eq!(report.remaining, 3);
    assert!(report.stopped_at.is_some());
    assert_eq!(queue.pending().unwrap()[0].attempts, 1);
  }

  #[tokio::test]
  async fn test_permanent_failure_is_dead_lettered() {
    let queue = queue_with(Arc::new(MemoryStore::new()), 5);
    queue.enqueue(post("/bad")).unwrap();
    queue.enqueue(post("/good")).unwrap();

    let report = queue
      .drain(|req| async move {
        if req.path == "/bad" {
          Err(ApiError::new(ErrorKind::ValidationFailed, "Validation failed: title"))
        } else {
          Ok(())
        }
      })
      .await
      .unwrap();

    assert_eq!(report.dead_lettered.len(), 1);
    assert_eq!(report.processed.len(), 1);
    assert!(queue.is_empty().unwrap());

    let dead = queue.dead_letters().unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].request.path, "/bad");
    assert_eq!(
      dead[0].last_error.as_deref(),
      Some("Validation failed: title")
    );
  }

  #[tokio::test]
  async fn test_retryable_failure_dead_letters_after_max_attempts() {
    let queue = queue_with(Arc::new(MemoryStore::new()), 2);
    queue.enqueue(post("/flaky")).unwrap();
    queue.enqueue(post("/next")).unwrap();

    let failing = |req: RequestDescriptor| async move {
      if req.path == "/flaky" {
        Err(ApiError::new(ErrorKind::Timeout, "slow"))
      } else {
        Ok(())
      }
    };

    let first = queue.drain(failing).await.unwrap();
    assert_eq!(first.remaining, 2);
    assert!(first.dead_lettered.is_empty());

    let second = queue.drain(failing).await.unwrap();
    assert_eq!(second.dead_lettered.len(), 1);
    assert_eq!(second.processed.len(), 1);
    assert_eq!(second.remaining, 0);
  }

  #[tokio::test]
  async fn test_interrupted_replay_is_not_sent_again() {
    let queue = queue_with(Arc::new(MemoryStore::new()), 5);
    queue.enqueue(post("/incidents")).unwrap();

    let sends = StdMutex::new(0);
    let sends_ref = &sends;
    let dropping = move |_req: RequestDescriptor| async move {
      *sends_ref.lock().unwrap() += 1;
      Err(ApiError::new(ErrorKind::ConnectionLost, "connection closed"))
    };

    let report = queue.drain(dropping).await.unwrap();
    assert_eq!(report.dead_lettered.len(), 1);
    assert!(queue.is_empty().unwrap());

    queue.drain(dropping).await.unwrap();
    assert_eq!(*sends.lock().unwrap(), 1);
  }

  #[tokio::test]
  async fn test_queue_survives_reload() {
    let storage = Arc::new(MemoryStore::new());
    let id = {
      let queue = queue_with(storage.clone(), 5);
      queue.enqueue(post("/incidents")).unwrap()
    };

    let reloaded = queue_with(storage.clone(), 5);
    let pending = reloaded.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert_eq!(pending[0].timestamp, 1_000);
    assert_eq!(pending[0].request, post("/incidents"));

    reloaded.clear().unwrap();
    assert_eq!(storage.get(keys::REQUEST_QUEUE).unwrap(), None);
  }

  #[test]
  fn test_corrupt_queue_is_discarded() {
    let storage = Arc::new(MemoryStore::new());
    storage.set(keys::REQUEST_QUEUE, "[{").unwrap();

    let queue = queue_with(storage.clone(), 5);
    assert!(queue.is_empty().unwrap());
    assert_eq!(storage.get(keys::REQUEST_QUEUE).unwrap(), None);
  }

  #[test]
  fn test_persisted_shape() {
    let storage = Arc::new(MemoryStore::new());
    let queue = queue_with(storage.clone(), 5);
    queue.enqueue(post("/x")).unwrap();

    let stored = storage.get(keys::REQUEST_QUEUE).unwrap().unwrap();
    let raw: Value = serde_json::from_str(&stored).unwrap();
    let entry = &raw[0];
    assert!(entry["id"].as_str().unwrap().starts_with("req_1000_"));
    assert_eq!(entry["request"]["method"], "POST");
    assert_eq!(entry["request"]["target"], "api");
    assert_eq!(entry["timestamp"], 1000);
  }
}

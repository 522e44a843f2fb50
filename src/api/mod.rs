//! Domain API modules.
//!
//! Each module is a thin borrowed view over [`CivicClient`](crate::CivicClient):
//! it shapes the payload, calls the HTTP core, runs the response through an
//! adapter from `api_types`, and consults the cache where that pays off.
//! None of them hold state.

pub mod api_types;
mod analytics;
mod auth;
mod chat;
mod incidents;
mod kb;
mod services;
pub mod types;
mod users;

pub use analytics::AnalyticsApi;
pub use auth::AuthApi;
pub use chat::ChatApi;
pub use incidents::IncidentsApi;
pub use kb::{KbApi, KbQueryKey};
pub use services::ServicesApi;
pub use users::UsersApi;

use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::http::{ApiError, ErrorKind};

/// Log a failed best-effort call and substitute `fallback`.
pub(crate) fn best_effort<T>(result: Result<T, ApiError>, what: &str, fallback: T) -> T {
  match result {
    Ok(value) => value,
    Err(e) => {
      warn!(kind = %e.kind, "{} failed: {}", what, e);
      fallback
    }
  }
}

/// `message` field of an acknowledgement body, if any.
pub(crate) fn ack_message(value: &Value) -> Option<String> {
  value
    .get("message")
    .and_then(Value::as_str)
    .map(String::from)
}

/// Write an export into `dir`, returning the file path.
pub(crate) async fn write_export(
  dir: &Path,
  file_name: &str,
  bytes: &[u8],
) -> Result<PathBuf, ApiError> {
  let storage_error = |e: std::io::Error, what: &str| {
    ApiError::new(ErrorKind::Storage, format!("Failed to {}: {}", what, e))
  };

  tokio::fs::create_dir_all(dir)
    .await
    .map_err(|e| storage_error(e, &format!("create {}", dir.display())))?;

  let path = dir.join(file_name);
  tokio::fs::write(&path, bytes)
    .await
    .map_err(|e| storage_error(e, &format!("write {}", path.display())))?;

  info!(path = %path.display(), size = bytes.len(), "export written");
  Ok(path)
}

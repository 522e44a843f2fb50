//! Typed API errors and the response classifier.
//!
//! Every transport failure and non-2xx response is mapped to an [`ErrorKind`]
//! with a user-facing message. Callers match on the kind; the message is what
//! a front-end shows in its toast/alert.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const RATE_LIMITED_MESSAGE: &str = "Too many requests. Please wait a moment and try again.";
pub const SERVER_ERROR_MESSAGE: &str = "Server is experiencing issues. Please try again later.";
pub const TIMEOUT_MESSAGE: &str = "Request timed out. Please check your connection and try again.";
pub const AUTH_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";
pub const NETWORK_MESSAGE: &str = "Unable to reach the server. Please check your connection.";
pub const CONNECTION_LOST_MESSAGE: &str =
  "Connection lost before the server replied. Check whether the change was saved before retrying.";
pub const UNKNOWN_MESSAGE: &str = "An unexpected error occurred. Please try again.";

/// Classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
  /// HTTP 429
  RateLimited,
  /// HTTP 5xx
  ServerError,
  /// Client-side timeout elapsed
  Timeout,
  /// 4xx carrying a field-error list
  ValidationFailed,
  /// HTTP 401; handled globally by the auth interceptor
  AuthExpired,
  /// Connection could not be established; nothing reached the server
  Network,
  /// Connection dropped after the request was written; the server may
  /// have acted on it
  ConnectionLost,
  /// Local persisted state could not be read or written
  Storage,
  Unknown,
}

impl ErrorKind {
  /// Whether retrying the same call may succeed.
  pub fn retryable(self) -> bool {
    matches!(
      self,
      Self::RateLimited | Self::ServerError | Self::Timeout | Self::Network | Self::ConnectionLost
    )
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::RateLimited => "RATE_LIMITED",
      Self::ServerError => "SERVER_ERROR",
      Self::Timeout => "TIMEOUT",
      Self::ValidationFailed => "VALIDATION_FAILED",
      Self::AuthExpired => "AUTH_EXPIRED",
      Self::Network => "NETWORK",
      Self::ConnectionLost => "CONNECTION_LOST",
      Self::Storage => "STORAGE",
      Self::Unknown => "UNKNOWN",
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Error returned by every client call.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
  pub kind: ErrorKind,
  /// HTTP status, when a response was received
  pub status: Option<u16>,
  pub message: String,
  /// Whether `message` is specific (backend-provided or classified) rather
  /// than a raw transport description
  specific: bool,
  #[source]
  source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ApiError {
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      status: None,
      message: message.into(),
      specific: true,
      source: None,
    }
  }

  pub fn with_status(mut self, status: u16) -> Self {
    self.status = Some(status);
    self
  }

  pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
    self.source = Some(Box::new(source));
    self
  }

  /// Replace the message outright.
  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = message.into();
    self.specific = true;
    self
  }

  /// Use `fallback` when nothing more specific than the kind is known.
  ///
  /// Classified kinds keep their fixed messages and backend-supplied
  /// messages are never overwritten.
  pub fn or_message(mut self, fallback: &str) -> Self {
    if self.kind == ErrorKind::Unknown && !self.specific {
      self.message = fallback.to_string();
      self.specific = true;
    }
    self
  }

  /// Failures a queued replay must not repeat: requests that will never
  /// succeed, and requests the server may already have applied.
  pub fn is_permanent(&self) -> bool {
    match self.kind {
      ErrorKind::ValidationFailed | ErrorKind::ConnectionLost => true,
      ErrorKind::Unknown => matches!(self.status, Some(s) if (400..500).contains(&s)),
      _ => false,
    }
  }

  pub fn storage(report: color_eyre::Report) -> Self {
    Self::new(ErrorKind::Storage, format!("Local storage error: {}", report))
  }

  /// Response body did not have the expected shape.
  pub fn decode(err: serde_json::Error) -> Self {
    Self {
      kind: ErrorKind::Unknown,
      status: None,
      message: format!("Unexpected response from server: {}", err),
      specific: false,
      source: Some(Box::new(err)),
    }
  }
}

impl From<color_eyre::Report> for ApiError {
  fn from(report: color_eyre::Report) -> Self {
    Self::storage(report)
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(err: serde_json::Error) -> Self {
    Self::decode(err)
  }
}

// ============================================================================
// Classifier
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
  message: Option<String>,
  error: Option<String>,
  #[serde(default)]
  errors: Vec<FieldError>,
}

#[derive(Debug, Deserialize)]
struct FieldError {
  #[serde(default)]
  msg: String,
}

/// Best available message from an error body: `message`, then `error`.
fn body_message(body: &ErrorBody) -> Option<String> {
  body
    .message
    .as_deref()
    .or(body.error.as_deref())
    .filter(|m| !m.trim().is_empty())
    .map(String::from)
}

/// Classify a non-2xx response.
pub fn classify_status(status: u16, body: &[u8]) -> ApiError {
  let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();

  match status {
    401 => ApiError::new(ErrorKind::AuthExpired, AUTH_EXPIRED_MESSAGE).with_status(status),
    429 => ApiError::new(ErrorKind::RateLimited, RATE_LIMITED_MESSAGE).with_status(status),
    s if s >= 500 => ApiError::new(ErrorKind::ServerError, SERVER_ERROR_MESSAGE).with_status(s),
    s if (400..500).contains(&s) && !parsed.errors.is_empty() => {
      let joined = parsed
        .errors
        .iter()
        .map(|e| e.msg.as_str())
        .filter(|m| !m.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
      ApiError::new(
        ErrorKind::ValidationFailed,
        format!("Validation failed: {}", joined),
      )
      .with_status(s)
    }
    s => match body_message(&parsed) {
      Some(message) => ApiError::new(ErrorKind::Unknown, message).with_status(s),
      None => ApiError {
        kind: ErrorKind::Unknown,
        status: Some(s),
        message: format!("Request failed with status code {}", s),
        specific: false,
        source: None,
      },
    },
  }
}

/// Classify a failure that produced no HTTP response.
pub fn classify_transport(err: reqwest::Error) -> ApiError {
  if err.is_timeout() {
    ApiError::new(ErrorKind::Timeout, TIMEOUT_MESSAGE).with_source(err)
  } else if err.is_connect() {
    ApiError::new(ErrorKind::Network, NETWORK_MESSAGE).with_source(err)
  } else if err.is_request() {
    ApiError::new(ErrorKind::ConnectionLost, CONNECTION_LOST_MESSAGE).with_source(err)
  } else {
    ApiError {
      kind: ErrorKind::Unknown,
      status: err.status().map(|s| s.as_u16()),
      message: err.to_string(),
      specific: false,
      source: Some(Box::new(err)),
    }
  }
}

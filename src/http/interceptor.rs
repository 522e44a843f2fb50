//! Bearer-token attachment and the global 401 policy.

use std::sync::Arc;
use tracing::warn;

use super::error::{ApiError, ErrorKind};
use crate::cache::LocalCache;
use crate::session::CredentialStore;

/// Side effect run when the backend rejects the session.
pub trait LoginRedirect: Send + Sync {
  fn redirect_to_login(&self);
}

/// Redirect that only logs.
#[derive(Debug, Default)]
pub struct LogRedirect;

impl LoginRedirect for LogRedirect {
  fn redirect_to_login(&self) {
    warn!("Session rejected by backend; login required");
  }
}

/// Attaches the stored token to requests and enforces logout on 401.
///
/// There is no silent refresh: any live 401 clears the credential, the
/// cached user and every cached response, then triggers the redirect,
/// whichever call produced it.
#[derive(Clone)]
pub struct AuthInterceptor {
  credentials: Arc<CredentialStore>,
  cache: LocalCache,
  redirect: Arc<dyn LoginRedirect>,
}

impl AuthInterceptor {
  pub fn new(
    credentials: Arc<CredentialStore>,
    cache: LocalCache,
    redirect: Arc<dyn LoginRedirect>,
  ) -> Self {
    Self {
      credentials,
      cache,
      redirect,
    }
  }

  /// `Authorization` header value, when a credential is stored.
  pub fn authorization(&self) -> Result<Option<String>, ApiError> {
    Ok(
      self
        .credentials
        .token()?
        .map(|token| format!("Bearer {}", token)),
    )
  }

  /// Apply the global policy to a failed response.
  pub fn on_error(&self, err: &ApiError) {
    if err.kind != ErrorKind::AuthExpired {
      return;
    }

    warn!("Unauthorized - clearing stored credential and redirecting to login");
    if let Err(e) = self.credentials.clear() {
      warn!("Failed to clear stored credential: {}", e);
    }
    if let Err(e) = self.cache.clear() {
      warn!("Failed to clear cached responses: {}", e);
    }
    self.redirect.redirect_to_login();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::SystemClock;
  use std::time::Duration;
  use crate::http::error::classify_status;
  use crate::store::{keys, MemoryStore, Storage};
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[derive(Default)]
  struct CountingRedirect(AtomicUsize);

  impl LoginRedirect for CountingRedirect {
    fn redirect_to_login(&self) {
      self.0.fetch_add(1, Ordering::SeqCst);
    }
  }

  fn interceptor() -> (AuthInterceptor, Arc<MemoryStore>, Arc<CountingRedirect>) {
    let storage = Arc::new(MemoryStore::new());
    let credentials = Arc::new(CredentialStore::new(storage.clone(), Arc::new(SystemClock)));
    let cache = LocalCache::new(storage.clone(), Arc::new(SystemClock));
    let redirect = Arc::new(CountingRedirect::default());
    (
      AuthInterceptor::new(credentials, cache, redirect.clone()),
      storage,
      redirect,
    )
  }

  #[test]
  fn test_bearer_header_only_with_token() {
    let (auth, storage, _) = interceptor();
    assert_eq!(auth.authorization().unwrap(), None);

    storage.set(keys::AUTH_TOKEN, "t0k").unwrap();
    assert_eq!(auth.authorization().unwrap().as_deref(), Some("Bearer t0k"));
  }

  #[test]
  fn test_401_clears_and_redirects_once() {
    let (auth, storage, redirect) = interceptor();
    storage.set(keys::AUTH_TOKEN, "t0k").unwrap();
    storage.set(keys::USER, "{}").unwrap();
    LocalCache::new(storage.clone(), Arc::new(SystemClock))
      .set("kb_articles_x", &["Internal draft"], Duration::from_secs(300))
      .unwrap();

    auth.on_error(&classify_status(401, b""));

    assert_eq!(storage.get(keys::AUTH_TOKEN).unwrap(), None);
    assert_eq!(storage.get(keys::USER).unwrap(), None);
    assert!(storage.keys_with_prefix(keys::CACHE_PREFIX).unwrap().is_empty());
    assert_eq!(redirect.0.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_other_errors_leave_session_alone() {
    let (auth, storage, redirect) = interceptor();
    storage.set(keys::AUTH_TOKEN, "t0k").unwrap();

    auth.on_error(&classify_status(403, b""));
    auth.on_error(&classify_status(500, b""));

    assert!(storage.get(keys::AUTH_TOKEN).unwrap().is_some());
    assert_eq!(redirect.0.load(Ordering::SeqCst), 0);
  }
}

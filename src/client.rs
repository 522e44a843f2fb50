//! The explicitly constructed client context.
//!
//! `CivicClient` owns both HTTP endpoints and every piece of shared state
//! (credential, cache, queue, connectivity) and hands out the domain modules.
//! Nothing is global; build one per process, or several in tests.

use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::types::{ConfigInfo, HealthStatus, Submission};
use crate::api::{AnalyticsApi, AuthApi, ChatApi, IncidentsApi, KbApi, ServicesApi, UsersApi};
use crate::cache::LocalCache;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::http::{
  ApiError, ApiResponse, AuthInterceptor, ErrorKind, HttpClient, LoginRedirect, Method,
  RequestOptions, RetryPolicy,
};
use crate::queue::{ConnectivityMonitor, DrainReport, OfflineQueue, RequestDescriptor, Target};
use crate::session::CredentialStore;
use crate::store::Storage;

pub struct CivicClient {
  api: HttpClient,
  ai: HttpClient,
  credentials: Arc<CredentialStore>,
  cache: LocalCache,
  queue: Arc<OfflineQueue>,
  connectivity: Arc<ConnectivityMonitor>,
  clock: Arc<dyn Clock>,
  retry: RetryPolicy,
  probe_timeout: Duration,
  kb_ttl: Duration,
  locale: String,
}

impl CivicClient {
  pub fn new(
    config: &Config,
    storage: Arc<dyn Storage>,
    redirect: Arc<dyn LoginRedirect>,
  ) -> Result<Self, ApiError> {
    Self::with_clock(config, storage, redirect, Arc::new(SystemClock))
  }

  pub fn with_clock(
    config: &Config,
    storage: Arc<dyn Storage>,
    redirect: Arc<dyn LoginRedirect>,
    clock: Arc<dyn Clock>,
  ) -> Result<Self, ApiError> {
    let credentials = Arc::new(CredentialStore::new(storage.clone(), clock.clone()));
    let cache = LocalCache::new(storage.clone(), clock.clone())
      .with_default_ttl(Duration::from_secs(config.cache.default_ttl_secs));
    let auth = AuthInterceptor::new(credentials.clone(), cache.clone(), redirect);

    let api = HttpClient::new("api", &config.api.url, config.api.timeout(), auth.clone())?;
    let ai = HttpClient::new("ai", &config.api.ai_url, config.api.ai_timeout(), auth)?;
    let queue = Arc::new(OfflineQueue::load(
      storage,
      clock.clone(),
      config.queue.max_attempts,
    )?);

    info!(api = %api.base_url(), ai = %ai.base_url(), "client configured");

    Ok(Self {
      api,
      ai,
      credentials,
      cache,
      queue,
      connectivity: Arc::new(ConnectivityMonitor::new()),
      clock,
      retry: config.retry_policy(),
      probe_timeout: config.api.probe_timeout(),
      kb_ttl: Duration::from_secs(config.cache.kb_ttl_secs),
      locale: config.api.locale.clone(),
    })
  }

  // ==========================================================================
  // Domain modules
  // ==========================================================================

  pub fn auth(&self) -> AuthApi<'_> {
    AuthApi::new(self)
  }

  pub fn users(&self) -> UsersApi<'_> {
    UsersApi::new(self)
  }

  pub fn chat(&self) -> ChatApi<'_> {
    ChatApi::new(self)
  }

  pub fn incidents(&self) -> IncidentsApi<'_> {
    IncidentsApi::new(self)
  }

  pub fn kb(&self) -> KbApi<'_> {
    KbApi::new(self)
  }

  pub fn analytics(&self) -> AnalyticsApi<'_> {
    AnalyticsApi::new(self)
  }

  pub fn services(&self) -> ServicesApi<'_> {
    ServicesApi::new(self)
  }

  // ==========================================================================
  // Shared state
  // ==========================================================================

  pub fn api(&self) -> &HttpClient {
    &self.api
  }

  pub fn ai(&self) -> &HttpClient {
    &self.ai
  }

  pub fn credentials(&self) -> &CredentialStore {
    &self.credentials
  }

  pub fn cache(&self) -> &LocalCache {
    &self.cache
  }

  pub fn queue(&self) -> &OfflineQueue {
    &self.queue
  }

  pub fn connectivity(&self) -> &ConnectivityMonitor {
    &self.connectivity
  }

  pub fn clock(&self) -> &dyn Clock {
    self.clock.as_ref()
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    self.retry
  }

  pub(crate) fn kb_ttl(&self) -> Duration {
    self.kb_ttl
  }

  pub(crate) fn locale(&self) -> &str {
    &self.locale
  }

  // ==========================================================================
  // Request plumbing used by the domain modules
  // ==========================================================================

  fn http(&self, target: Target) -> &HttpClient {
    match target {
      Target::Api => &self.api,
      Target::Ai => &self.ai,
    }
  }

  /// Send a described request as-is.
  pub async fn dispatch(&self, request: &RequestDescriptor) -> Result<ApiResponse, ApiError> {
    self
      .http(request.target)
      .send(request.method, &request.path, request.options())
      .await
  }

  /// GET with the configured retry policy.
  pub(crate) async fn read<T: DeserializeOwned>(
    &self,
    target: Target,
    path: &str,
    options: RequestOptions,
  ) -> Result<T, ApiError> {
    let http = self.http(target);
    let options = &options;
    self
      .retry
      .run(move || http.get::<T>(path, options.clone()))
      .await
  }

  /// Send a mutating request, capturing it in the offline queue when the
  /// backend is unreachable.
  pub(crate) async fn submit<T: DeserializeOwned>(
    &self,
    request: RequestDescriptor,
  ) -> Result<Submission<T>, ApiError> {
    if !self.connectivity.is_online() {
      return self.capture(request);
    }

    match self.dispatch(&request).await {
      Ok(response) => Ok(Submission::Sent(response.json()?)),
      Err(err) if err.kind == ErrorKind::Network => {
        self.connectivity.mark_offline();
        self.capture(request)
      }
      Err(err) => Err(err),
    }
  }

  fn capture<T>(&self, request: RequestDescriptor) -> Result<Submission<T>, ApiError> {
    let id = self.queue.enqueue(request)?;
    Ok(Submission::Queued(id))
  }

  // ==========================================================================
  // Connectivity and queue replay
  // ==========================================================================

  /// Probe `HEAD <api>/health` and record the result.
  pub async fn check_connection(&self) -> bool {
    let reachable = self.api.probe("/health", self.probe_timeout).await;
    self.connectivity.record(reachable);
    reachable
  }

  /// Drain the offline queue if the backend is reachable.
  pub async fn process_queue(&self) -> Result<DrainReport, ApiError> {
    let pending = self.queue.len()?;
    if pending == 0 {
      return Ok(DrainReport::default());
    }

    if !self.check_connection().await {
      debug!(pending, "backend unreachable, leaving queue untouched");
      return Ok(DrainReport {
        remaining: pending,
        ..Default::default()
      });
    }

    let client = self;
    let report = self
      .queue
      .drain(move |request| async move { client.dispatch(&request).await.map(drop) })
      .await?;

    info!(
      processed = report.processed.len(),
      dead_lettered = report.dead_lettered.len(),
      remaining = report.remaining,
      "queue drain finished"
    );
    Ok(report)
  }

  /// Probe every `interval` and drain the queue whenever connectivity is
  /// restored or entries are waiting while online.
  pub fn spawn_connectivity_watch(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
    let client = Arc::clone(self);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      loop {
        ticker.tick().await;

        let was_online = client.connectivity.is_online();
        let reachable = client.check_connection().await;
        let pending = client.queue.len().unwrap_or(0);

        if reachable && (!was_online || pending > 0) {
          if !was_online {
            info!("Network restored, processing queued requests");
          }
          if let Err(e) = client.process_queue().await {
            warn!("Queue processing failed: {}", e);
          }
        }
      }
    })
  }

  // ==========================================================================
  // Utilities
  // ==========================================================================

  /// Hit every health endpoint concurrently.
  pub async fn health_check(&self) -> HealthStatus {
    let get = |http: &HttpClient, path: &'static str| {
      let http = http.clone();
      async move { http.send(Method::Get, path, RequestOptions::new()).await.is_ok() }
    };

    let (main_api, ai_api, auth_api, ai_health_api) = futures::join!(
      get(&self.api, "/health"),
      get(&self.ai, "/health"),
      get(&self.api, "/auth/health"),
      get(&self.ai, "/ai/health"),
    );

    let status = HealthStatus {
      main_api,
      ai_api,
      auth_api,
      ai_health_api,
    };
    debug!(?status, "health check");
    status
  }

  pub fn config_info(&self) -> ConfigInfo {
    let has_token = matches!(self.credentials.token(), Ok(Some(_)));
    let user = self.credentials.user().unwrap_or_else(|e| {
      warn!("{}", e);
      None
    });
    ConfigInfo {
      base_url: self.api.base_url().to_string(),
      ai_url: self.ai.base_url().to_string(),
      has_token,
      token_valid: self.credentials.is_token_valid(),
      user,
    }
  }

  /// Forget the credential, cached user and every cache entry.
  /// The offline queue is kept.
  /// Cached responses belong to the session that fetched them; drop them
  /// whenever the session changes.
  pub(crate) fn reset_session_cache(&self) {
    match self.cache.clear() {
      Ok(removed) if removed > 0 => debug!(removed, "dropped cached responses"),
      Ok(_) => {}
      Err(e) => warn!("Failed to clear cached responses: {}", e),
    }
  }

  pub fn clear_local_data(&self) -> Result<(), ApiError> {
    self.credentials.clear()?;
    let removed = self.cache.clear()?;
    info!(removed, "cleared local data");
    Ok(())
  }
}

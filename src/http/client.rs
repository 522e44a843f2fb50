use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::error::{classify_status, classify_transport, ApiError, ErrorKind};
use super::interceptor::AuthInterceptor;

/// HTTP methods the client issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
  Get,
  Post,
  Put,
  Patch,
  Delete,
  Head,
}

impl Method {
  fn as_reqwest(self) -> reqwest::Method {
    match self {
      Self::Get => reqwest::Method::GET,
      Self::Post => reqwest::Method::POST,
      Self::Put => reqwest::Method::PUT,
      Self::Patch => reqwest::Method::PATCH,
      Self::Delete => reqwest::Method::DELETE,
      Self::Head => reqwest::Method::HEAD,
    }
  }

  pub fn is_mutating(self) -> bool {
    matches!(self, Self::Post | Self::Put | Self::Patch | Self::Delete)
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_reqwest().as_str())
  }
}

/// Per-request options: query string, JSON body, and whether to skip auth.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
  pub query: Vec<(String, String)>,
  pub body: Option<Value>,
  /// Send without the bearer token
  pub public: bool,
}

impl RequestOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn query(mut self, key: &str, value: impl ToString) -> Self {
    self.query.push((key.to_string(), value.to_string()));
    self
  }

  /// Add a query parameter only when present and non-empty.
  pub fn query_opt(self, key: &str, value: Option<impl ToString>) -> Self {
    match value.map(|v| v.to_string()) {
      Some(v) if !v.trim().is_empty() => self.query(key, v),
      _ => self,
    }
  }

  pub fn body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }

  /// Serialize `body` as the JSON payload.
  pub fn json<B: Serialize + ?Sized>(self, body: &B) -> Result<Self, ApiError> {
    Ok(self.body(serde_json::to_value(body)?))
  }

  pub fn public(mut self) -> Self {
    self.public = true;
    self
  }
}

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
  pub status: u16,
  pub body: Vec<u8>,
}

impl ApiResponse {
  /// Decode the body as JSON. An empty body decodes as `null`.
  pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
    if self.body.iter().all(u8::is_ascii_whitespace) {
      return Ok(serde_json::from_value(Value::Null)?);
    }
    Ok(serde_json::from_slice(&self.body)?)
  }
}

/// One configured API endpoint: base URL, timeout and shared auth policy.
#[derive(Clone)]
pub struct HttpClient {
  name: &'static str,
  base_url: String,
  http: reqwest::Client,
  auth: AuthInterceptor,
}

impl HttpClient {
  pub fn new(
    name: &'static str,
    base_url: &str,
    timeout: Duration,
    auth: AuthInterceptor,
  ) -> Result<Self, ApiError> {
    let base_url = base_url.trim_end_matches('/').to_string();
    Url::parse(&base_url).map_err(|e| {
      ApiError::new(
        ErrorKind::Unknown,
        format!("Invalid {} base URL '{}': {}", name, base_url, e),
      )
    })?;

    let http = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("civic-navigator/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| {
        ApiError::new(
          ErrorKind::Unknown,
          format!("Failed to create {} HTTP client: {}", name, e),
        )
      })?;

    debug!(
      client = name,
      base_url = %base_url,
      timeout_ms = timeout.as_millis() as u64,
      "created http client"
    );

    Ok(Self {
      name,
      base_url,
      http,
      auth,
    })
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  /// Absolute URL for `path` relative to the base, with query appended.
  pub fn url(&self, path: &str, query: &[(String, String)]) -> Result<Url, ApiError> {
    let joined = if path.starts_with('/') {
      format!("{}{}", self.base_url, path)
    } else {
      format!("{}/{}", self.base_url, path)
    };
    let mut url = Url::parse(&joined).map_err(|e| {
      ApiError::new(
        ErrorKind::Unknown,
        format!("Invalid request URL '{}': {}", joined, e),
      )
    })?;

    if !query.is_empty() {
      let mut pairs = url.query_pairs_mut();
      for (key, value) in query {
        pairs.append_pair(key, value);
      }
    }

    Ok(url)
  }

  /// Send a request and return the raw successful response.
  pub async fn send(
    &self,
    method: Method,
    path: &str,
    options: RequestOptions,
  ) -> Result<ApiResponse, ApiError> {
    let url = self.url(path, &options.query)?;

    let mut request = self
      .http
      .request(method.as_reqwest(), url.clone())
      .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let authorization = if options.public {
      None
    } else {
      self.auth.authorization()?
    };
    let has_token = authorization.is_some();
    if let Some(value) = authorization {
      request = request.header(AUTHORIZATION, value);
    }

    let has_body = options.body.is_some();
    if let Some(body) = &options.body {
      request = request.body(serde_json::to_vec(body)?);
    }

    debug!(
      client = self.name,
      method = %method,
      url = %url,
      has_token,
      has_body,
      "api request"
    );

    let response = match request.send().await {
      Ok(response) => response,
      Err(e) => {
        let err = classify_transport(e);
        warn!(
          client = self.name,
          method = %method,
          url = %url,
          kind = %err.kind,
          "api request failed: {}",
          err
        );
        return Err(err);
      }
    };

    let status = response.status().as_u16();
    let body = match response.bytes().await {
      Ok(bytes) => bytes.to_vec(),
      Err(e) => {
        let err = classify_transport(e);
        warn!(
          client = self.name,
          method = %method,
          url = %url,
          kind = %err.kind,
          "failed reading response: {}",
          err
        );
        return Err(err);
      }
    };

    if !(200..300).contains(&status) {
      let err = classify_status(status, &body);
      warn!(
        client = self.name,
        method = %method,
        url = %url,
        status,
        kind = %err.kind,
        "api error: {}",
        err
      );
      self.auth.on_error(&err);
      return Err(err);
    }

    debug!(client = self.name, url = %url, status, size = body.len(), "api success");
    Ok(ApiResponse { status, body })
  }

  /// Send a request and decode the JSON response.
  pub async fn request<T: DeserializeOwned>(
    &self,
    method: Method,
    path: &str,
    options: RequestOptions,
  ) -> Result<T, ApiError> {
    self.send(method, path, options).await?.json()
  }

  pub async fn get<T: DeserializeOwned>(
    &self,
    path: &str,
    options: RequestOptions,
  ) -> Result<T, ApiError> {
    self.request(Method::Get, path, options).await
  }

  pub async fn post<T: DeserializeOwned>(
    &self,
    path: &str,
    options: RequestOptions,
  ) -> Result<T, ApiError> {
    self.request(Method::Post, path, options).await
  }

  pub async fn put<T: DeserializeOwned>(
    &self,
    path: &str,
    options: RequestOptions,
  ) -> Result<T, ApiError> {
    self.request(Method::Put, path, options).await
  }

  pub async fn patch<T: DeserializeOwned>(
    &self,
    path: &str,
    options: RequestOptions,
  ) -> Result<T, ApiError> {
    self.request(Method::Patch, path, options).await
  }

  pub async fn delete<T: DeserializeOwned>(
    &self,
    path: &str,
    options: RequestOptions,
  ) -> Result<T, ApiError> {
    self.request(Method::Delete, path, options).await
  }

  /// Raw response body, for file exports.
  pub async fn download(&self, path: &str, options: RequestOptions) -> Result<Vec<u8>, ApiError> {
    Ok(self.send(Method::Get, path, options).await?.body)
  }

  /// Reachability probe: unauthenticated `HEAD` with its own timeout.
  pub async fn probe(&self, path: &str, timeout: Duration) -> bool {
    let url = match self.url(path, &[]) {
      Ok(url) => url,
      Err(_) => return false,
    };

    match self.http.head(url).timeout(timeout).send().await {
      Ok(response) => response.status().is_success(),
      Err(e) => {
        warn!(client = self.name, "Network connectivity check failed: {}", e);
        false
      }
    }
  }
}

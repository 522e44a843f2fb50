//! Scripted HTTP backend for integration tests.
//!
//! Each connection carries one request (`Connection: close`). Routes are
//! matched on method and path; unmatched requests get a 404. While offline
//! the listener is closed, so connections are refused.

#![allow(dead_code)]

use civic_navigator::store::{MemoryStore, Storage};
use civic_navigator::{CivicClient, Config, LoginRedirect};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct Recorded {
  pub method: String,
  /// Path without the query string.
  pub path: String,
  pub query: Option<String>,
  pub headers: HashMap<String, String>,
  pub body: Option<Value>,
}

impl Recorded {
  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
  }
}

#[derive(Debug, Clone)]
pub struct Reply {
  status: u16,
  body: String,
  delay: Duration,
  /// Close the connection after reading the request, without replying.
  hang_up: bool,
}

impl Reply {
  pub fn json(status: u16, body: Value) -> Self {
    Self {
      status,
      body: body.to_string(),
      delay: Duration::ZERO,
      hang_up: false,
    }
  }

  pub fn ok(body: Value) -> Self {
    Self::json(200, body)
  }

  pub fn text(status: u16, body: &str) -> Self {
    Self {
      status,
      body: body.to_string(),
      delay: Duration::ZERO,
      hang_up: false,
    }
  }

  pub fn status(status: u16) -> Self {
    Self {
      status,
      body: String::new(),
      delay: Duration::ZERO,
      hang_up: false,
    }
  }

  pub fn hang_up() -> Self {
    Self {
      hang_up: true,
      ..Self::status(200)
    }
  }

  pub fn after(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }
}

struct Route {
  method: String,
  path: String,
  /// Replies served in order; the last one repeats.
  replies: VecDeque<Reply>,
}

#[derive(Default)]
struct State {
  routes: Vec<Route>,
  requests: Vec<Recorded>,
}

pub struct MockServer {
  addr: SocketAddr,
  url: String,
  state: Arc<Mutex<State>>,
  accept: Mutex<Option<JoinHandle<()>>>,
}

impl MockServer {
  pub async fn start() -> Self {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = Arc::new(Mutex::new(State::default()));
    let accept = accept_loop(listener, state.clone());

    Self {
      addr,
      url: format!("http://{}", addr),
      state,
      accept: Mutex::new(Some(accept)),
    }
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// Register a route. Calling again for the same route queues another reply.
  pub fn on(&self, method: &str, path: &str, reply: Reply) {
    let mut state = self.state.lock().expect("state");
    if let Some(route) = state
      .routes
      .iter_mut()
      .find(|r| r.method == method && r.path == path)
    {
      route.replies.push_back(reply);
      return;
    }
    state.routes.push(Route {
      method: method.to_string(),
      path: path.to_string(),
      replies: VecDeque::from([reply]),
    });
  }

  /// Close the listener (connections are refused) or bind it again on the
  /// same port.
  pub async fn set_offline(&self, offline: bool) {
    if offline {
      let running = self.accept.lock().expect("accept").take();
      if let Some(handle) = running {
        handle.abort();
        let _ = handle.await;
      }
      return;
    }

    if self.accept.lock().expect("accept").is_some() {
      return;
    }
    let listener = TcpListener::bind(self.addr).await.expect("rebind");
    let handle = accept_loop(listener, self.state.clone());
    *self.accept.lock().expect("accept") = Some(handle);
  }

  pub fn requests(&self) -> Vec<Recorded> {
    self.state.lock().expect("state").requests.clone()
  }

  /// Recorded requests for `method path`.
  pub fn requests_to(&self, method: &str, path: &str) -> Vec<Recorded> {
    self
      .requests()
      .into_iter()
      .filter(|r| r.method == method && r.path == path)
      .collect()
  }

  /// Config pointing both endpoints here, with fast retries.
  pub fn config(&self) -> Config {
    let mut config = Config::default();
    config.api.url = self.url.clone();
    config.api.ai_url = self.url.clone();
    config.api.timeout_ms = 2_000;
    config.api.ai_timeout_ms = 2_000;
    config.api.probe_timeout_ms = 500;
    config.retry.initial_delay_ms = 10;
    config
  }

  pub fn client(&self, redirect: Arc<dyn LoginRedirect>) -> (CivicClient, Arc<MemoryStore>) {
    client_with(&self.config(), redirect)
  }
}

pub fn client_with(
  config: &Config,
  redirect: Arc<dyn LoginRedirect>,
) -> (CivicClient, Arc<MemoryStore>) {
  let storage = Arc::new(MemoryStore::new());
  let shared: Arc<dyn Storage> = storage.clone();
  let client = CivicClient::new(config, shared, redirect).expect("client");
  (client, storage)
}

/// Redirect that counts how often it fired.
#[derive(Default)]
pub struct CountingRedirect(AtomicUsize);

impl CountingRedirect {
  pub fn count(&self) -> usize {
    self.0.load(Ordering::SeqCst)
  }
}

impl LoginRedirect for CountingRedirect {
  fn redirect_to_login(&self) {
    self.0.fetch_add(1, Ordering::SeqCst);
  }
}

fn accept_loop(listener: TcpListener, state: Arc<Mutex<State>>) -> JoinHandle<()> {
  tokio::spawn(async move {
    while let Ok((stream, _)) = listener.accept().await {
      let state = state.clone();
      tokio::spawn(async move {
        let _ = serve(stream, state).await;
      });
    }
  })
}

async fn serve(mut stream: TcpStream, state: Arc<Mutex<State>>) -> std::io::Result<()> {
  let mut buf = Vec::new();
  let mut chunk = [0u8; 4096];

  let header_end = loop {
    let n = stream.read(&mut chunk).await?;
    if n == 0 {
      return Ok(());
    }
    buf.extend_from_slice(&chunk[..n]);
    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
      break pos + 4;
    }
  };

  let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
  let mut lines = head.split("\r\n");
  let request_line = lines.next().unwrap_or_default();
  let mut parts = request_line.split_whitespace();
  let method = parts.next().unwrap_or_default().to_string();
  let target = parts.next().unwrap_or_default().to_string();

  let headers: HashMap<String, String> = lines
    .filter_map(|line| line.split_once(':'))
    .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
    .collect();

  let length: usize = headers
    .get("content-length")
    .and_then(|v| v.parse().ok())
    .unwrap_or(0);
  while buf.len() < header_end + length {
    let n = stream.read(&mut chunk).await?;
    if n == 0 {
      break;
    }
    buf.extend_from_slice(&chunk[..n]);
  }
  let body = &buf[header_end..(header_end + length).min(buf.len())];

  let (path, query) = match target.split_once('?') {
    Some((p, q)) => (p.to_string(), Some(q.to_string())),
    None => (target.clone(), None),
  };

  let reply = {
    let mut state = state.lock().expect("state");
    state.requests.push(Recorded {
      method: method.clone(),
      path: path.clone(),
      query,
      headers,
      body: serde_json::from_slice(body).ok(),
    });

    let route = state
      .routes
      .iter_mut()
      .find(|r| r.method == method && r.path == path);
    match route {
      Some(route) if route.replies.len() > 1 => route.replies.pop_front(),
      Some(route) => route.replies.front().cloned(),
      None if path == "/health" => Some(Reply::ok(serde_json::json!({ "status": "ok" }))),
      None => None,
    }
    .unwrap_or_else(|| Reply::json(404, serde_json::json!({ "message": "Not found" })))
  };

  if reply.hang_up {
    return Ok(());
  }
  if !reply.delay.is_zero() {
    tokio::time::sleep(reply.delay).await;
  }

  let response = format!(
    "HTTP/1.1 {} Mock\r\n\
     Content-Type: application/json\r\n\
     Content-Length: {}\r\n\
     Connection: close\r\n\r\n",
    reply.status,
    reply.body.len()
  );
  stream.write_all(response.as_bytes()).await?;
  if method != "HEAD" {
    stream.write_all(reply.body.as_bytes()).await?;
  }
  stream.flush().await?;
  Ok(())
}

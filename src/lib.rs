//! Client core for the CivicNavigator civic services API.
//!
//! [`CivicClient`] is the entry point: build it from a [`Config`], a
//! [`Storage`](store::Storage) backend and a [`LoginRedirect`] hook, then use
//! its domain modules (`auth()`, `incidents()`, `kb()`, ...). Mutating calls
//! made while the backend is unreachable are captured in a persistent queue
//! and replayed in order once connectivity returns.

pub mod api;
pub mod cache;
mod client;
pub mod clock;
pub mod config;
pub mod http;
pub mod logging;
pub mod queue;
pub mod session;
pub mod store;

pub use client::CivicClient;
pub use config::Config;
pub use http::util::{batch, generate_request_id, measure, Measured};
pub use http::{ApiError, ErrorKind, LogRedirect, LoginRedirect, RetryPolicy};

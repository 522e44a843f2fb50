//! HTTP client core: two configured endpoints, the auth interceptor,
//! response classification and caller-level retry.

mod client;
pub mod error;
mod interceptor;
mod retry;
pub mod util;

pub use client::{ApiResponse, HttpClient, Method, RequestOptions};
pub use error::{ApiError, ErrorKind};
pub use interceptor::{AuthInterceptor, LogRedirect, LoginRedirect};
pub use retry::RetryPolicy;

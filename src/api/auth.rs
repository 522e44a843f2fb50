use serde_json::{json, Value};
use tracing::{info, warn};

use super::api_types::{ApiLoginResponse, ApiRegisterResponse, ApiUserEnvelope};
use super::types::{ProfileUpdate, Registration, Role, User};
use super::ack_message;
use crate::client::CivicClient;
use crate::http::{ApiError, ErrorKind, Method, RequestOptions};
use crate::queue::Target;

const LOGIN_FAILED: &str = "Login failed. Please check your credentials.";

fn normalize_email(email: &str) -> String {
  email.trim().to_lowercase()
}

/// Session lifecycle: login, registration, profile.
pub struct AuthApi<'a> {
  client: &'a CivicClient,
}

impl<'a> AuthApi<'a> {
  pub(crate) fn new(client: &'a CivicClient) -> Self {
    Self { client }
  }

  /// Exchange credentials for a token and persist the session.
  pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
    let email = normalize_email(email);
    info!(email = %email, "Attempting login");

    let options = RequestOptions::new().body(json!({ "email": email, "password": password }));
    let response: ApiLoginResponse = self
      .client
      .api()
      .post("/auth/login", options)
      .await
      .map_err(|e| match e.kind {
        // a 401 here means bad credentials, not an expired session
        ErrorKind::AuthExpired => e.with_message(LOGIN_FAILED),
        _ => e.or_message(LOGIN_FAILED),
      })?;

    let expires_in = response.expires_in_secs();
    let user = response.user.into_user();

    self.client.reset_session_cache();
    let credentials = self.client.credentials();
    credentials.save(&response.token, expires_in)?;
    credentials.save_user(&user)?;

    info!(user = %user.name, role = %user.role, "Login successful");
    Ok(user)
  }

  /// Create an account. The user still has to log in afterwards.
  pub async fn register(
    &self,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
  ) -> Result<Registration, ApiError> {
    let email = normalize_email(email);
    info!(email = %email, "Attempting registration");

    let options = RequestOptions::new().body(json!({
      "name": name.trim(),
      "email": email,
      "password": password,
      "role": role,
    }));
    let response: Option<ApiRegisterResponse> = self
      .client
      .api()
      .post("/auth/register", options)
      .await
      .map_err(|e| e.or_message("Registration failed. Please try again."))?;

    let response = response.unwrap_or_default();
    Ok(Registration {
      message: response.message,
      user: response.user.map(|u| u.into_user()),
    })
  }

  /// Tell the backend, then always forget the local session.
  pub async fn logout(&self) -> Result<(), ApiError> {
    if let Err(e) = self
      .client
      .api()
      .send(Method::Post, "/auth/logout", RequestOptions::new())
      .await
    {
      warn!("Logout endpoint not available or failed: {}", e);
    }

    self.client.credentials().clear()?;
    self.client.reset_session_cache();
    info!("Logout completed");
    Ok(())
  }

  /// Fetch the current user and refresh the cached copy.
  pub async fn profile(&self) -> Result<User, ApiError> {
    let envelope: ApiUserEnvelope = self
      .client
      .read(Target::Api, "/auth/profile", RequestOptions::new())
      .await
      .map_err(|e| e.or_message("Failed to load profile. Please refresh and try again."))?;

    let user = envelope.into_user();
    self.client.credentials().save_user(&user)?;
    Ok(user)
  }

  pub async fn update_profile(&self, updates: &ProfileUpdate) -> Result<User, ApiError> {
    let envelope: ApiUserEnvelope = self
      .client
      .api()
      .put("/auth/profile", RequestOptions::new().json(updates)?)
      .await
      .map_err(|e| e.or_message("Failed to update profile."))?;

    let user = envelope.into_user();
    self.client.credentials().save_user(&user)?;
    info!("Profile updated successfully");
    Ok(user)
  }

  /// Request a reset email; returns the backend's acknowledgement.
  pub async fn reset_password(&self, email: &str) -> Result<Option<String>, ApiError> {
    let options = RequestOptions::new().body(json!({ "email": normalize_email(email) }));
    let response: Value = self
      .client
      .api()
      .post("/auth/reset-password", options)
      .await
      .map_err(|e| e.or_message("Password reset failed."))?;
    Ok(ack_message(&response))
  }

  /// A token is stored and, if it has an expiry, has not passed it.
  pub fn is_token_valid(&self) -> bool {
    self.client.credentials().is_token_valid()
  }

  /// Restore the session from local state without contacting the backend.
  ///
  /// Optimistic: a stored token and user are trusted until a live call
  /// returns 401. An unreadable cached user clears the credential.
  pub fn restore_session(&self) -> Result<Option<User>, ApiError> {
    let credentials = self.client.credentials();
    if credentials.token()?.is_none() {
      return Ok(None);
    }

    match credentials.user() {
      Ok(user) => Ok(user),
      Err(e) => {
        warn!("Error parsing saved user: {}", e);
        credentials.clear()?;
        Ok(None)
      }
    }
  }
}

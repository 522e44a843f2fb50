//! The stored credential and cached user record.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::types::User;
use crate::clock::Clock;
use crate::store::{keys, Storage};

/// The persisted bearer token for the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
  pub token: String,
  pub expires_at: Option<DateTime<Utc>>,
}

/// Reads and writes the one stored credential.
pub struct CredentialStore {
  storage: Arc<dyn Storage>,
  clock: Arc<dyn Clock>,
}

impl CredentialStore {
  pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
    Self { storage, clock }
  }

  /// Persist a token, replacing any previous credential.
  ///
  /// `expires_in` is in seconds, as issued by the backend.
  pub fn save(&self, token: &str, expires_in: Option<i64>) -> Result<()> {
    self.storage.set(keys::AUTH_TOKEN, token)?;
    match expires_in {
      Some(secs) => {
        let expires_at = self.clock.now_ms() + secs * 1000;
        self
          .storage
          .set(keys::TOKEN_EXPIRATION, &expires_at.to_string())?;
      }
      None => self.storage.remove(keys::TOKEN_EXPIRATION)?,
    }
    debug!(has_expiry = expires_in.is_some(), "stored credential");
    Ok(())
  }

  pub fn token(&self) -> Result<Option<String>> {
    self.storage.get(keys::AUTH_TOKEN)
  }

  pub fn credential(&self) -> Result<Option<StoredCredential>> {
    let Some(token) = self.token()? else {
      return Ok(None);
    };
    let expires_at = self
      .expiration_ms()?
      .and_then(DateTime::<Utc>::from_timestamp_millis);
    Ok(Some(StoredCredential { token, expires_at }))
  }

  /// A token exists and, if it carries an expiry, has not passed it.
  pub fn is_token_valid(&self) -> bool {
    match self.token() {
      Ok(Some(_)) => {}
      _ => return false,
    }
    match self.expiration_ms() {
      Ok(Some(expires_at)) => self.clock.now_ms() < expires_at,
      Ok(None) => true,
      Err(e) => {
        warn!("Unreadable token expiration: {}", e);
        false
      }
    }
  }

  fn expiration_ms(&self) -> Result<Option<i64>> {
    match self.storage.get(keys::TOKEN_EXPIRATION)? {
      Some(raw) => raw
        .trim()
        .parse::<i64>()
        .map(Some)
        .map_err(|e| eyre!("Invalid token expiration '{}': {}", raw, e)),
      None => Ok(None),
    }
  }

  pub fn save_user(&self, user: &User) -> Result<()> {
    let data =
      serde_json::to_string(user).map_err(|e| eyre!("Failed to serialize user: {}", e))?;
    self.storage.set(keys::USER, &data)
  }

  /// The cached user record, if one exists and parses.
  pub fn user(&self) -> Result<Option<User>> {
    match self.storage.get(keys::USER)? {
      Some(data) => serde_json::from_str(&data)
        .map(Some)
        .map_err(|e| eyre!("Failed to parse stored user: {}", e)),
      None => Ok(None),
    }
  }

  /// Remove token, expiration and cached user.
  pub fn clear(&self) -> Result<()> {
    self.storage.remove(keys::AUTH_TOKEN)?;
    self.storage.remove(keys::USER)?;
    self.storage.remove(keys::TOKEN_EXPIRATION)?;
    debug!("cleared stored credential");
    Ok(())
  }
}

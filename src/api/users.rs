use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::info;

use super::api_types::{ApiUserEnvelope, ApiUserList};
use super::types::{NewUser, User, UserPage, UserQuery, UserStats, UserUpdate};
use super::{ack_message, best_effort, write_export};
use crate::client::CivicClient;
use crate::http::{ApiError, RequestOptions};
use crate::queue::Target;

/// Staff and admin user management.
pub struct UsersApi<'a> {
  client: &'a CivicClient,
}

fn query_options(params: &UserQuery) -> RequestOptions {
  RequestOptions::new()
    .query("page", params.page.unwrap_or(1))
    .query("limit", params.limit.unwrap_or(20))
    .query_opt("search", params.search.as_deref())
    .query_opt("role", params.role)
    .query_opt("status", params.status.as_deref())
}

impl<'a> UsersApi<'a> {
  pub(crate) fn new(client: &'a CivicClient) -> Self {
    Self { client }
  }

  pub async fn list(&self, params: &UserQuery) -> Result<UserPage, ApiError> {
    let list: ApiUserList = self
      .client
      .read(Target::Api, "/users", query_options(params))
      .await
      .map_err(|e| e.or_message("Failed to load users."))?;
    Ok(UserPage::from(list))
  }

  pub async fn create(&self, user: &NewUser) -> Result<User, ApiError> {
    info!(name = %user.name, "Creating new user");
    let envelope: ApiUserEnvelope = self
      .client
      .api()
      .post("/users", RequestOptions::new().json(user)?)
      .await
      .map_err(|e| e.or_message("Failed to create user."))?;
    Ok(envelope.into_user())
  }

  pub async fn update(&self, user_id: &str, updates: &UserUpdate) -> Result<User, ApiError> {
    let envelope: ApiUserEnvelope = self
      .client
      .api()
      .put(&format!("/users/{}", user_id), RequestOptions::new().json(updates)?)
      .await
      .map_err(|e| e.or_message("Failed to update user."))?;
    Ok(envelope.into_user())
  }

  pub async fn delete(&self, user_id: &str) -> Result<Option<String>, ApiError> {
    let response: Value = self
      .client
      .api()
      .delete(&format!("/users/{}", user_id), RequestOptions::new())
      .await
      .map_err(|e| e.or_message("Failed to delete user."))?;
    info!(user_id, "User deleted");
    Ok(ack_message(&response))
  }

  pub async fn get(&self, user_id: &str) -> Result<User, ApiError> {
    let envelope: ApiUserEnvelope = self
      .client
      .read(Target::Api, &format!("/users/{}", user_id), RequestOptions::new())
      .await
      .map_err(|e| e.or_message("User not found or failed to load."))?;
    Ok(envelope.into_user())
  }

  /// Best-effort: zeroed counts on failure.
  pub async fn stats(&self) -> UserStats {
    let result = self
      .client
      .read::<UserStats>(Target::Api, "/users/stats", RequestOptions::new())
      .await;
    best_effort(result, "User stats", UserStats::default())
  }

  pub async fn bulk_update(
    &self,
    user_ids: &[String],
    updates: &UserUpdate,
  ) -> Result<Option<String>, ApiError> {
    info!(count = user_ids.len(), "Bulk updating users");
    let body = json!({ "userIds": user_ids, "updates": updates });
    let response: Value = self
      .client
      .api()
      .patch("/users/bulk", RequestOptions::new().body(body))
      .await
      .map_err(|e| e.or_message("Failed to update users."))?;
    Ok(ack_message(&response))
  }

  /// Download the CSV export into `dir` as `users-YYYY-MM-DD.csv`.
  pub async fn export(&self, params: &UserQuery, dir: &Path) -> Result<PathBuf, ApiError> {
    let options = RequestOptions::new()
      .query_opt("page", params.page)
      .query_opt("limit", params.limit)
      .query_opt("search", params.search.as_deref())
      .query_opt("role", params.role)
      .query_opt("status", params.status.as_deref());

    let bytes = self
      .client
      .api()
      .download("/users/export", options)
      .await
      .map_err(|e| e.or_message("Failed to export users data."))?;

    let file_name = format!("users-{}.csv", self.client.clock().now().format("%Y-%m-%d"));
    write_export(dir, &file_name, &bytes).await
  }
}

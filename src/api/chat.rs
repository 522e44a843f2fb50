use serde_json::{json, Value};
use tracing::{debug, info};

use super::api_types::{ApiChatReply, ApiChatSession, ApiSessionList};
use super::best_effort;
use super::types::{ChatReply, ChatSession, ChatStats};
use crate::client::CivicClient;
use crate::http::{ApiError, ErrorKind, RequestOptions};
use crate::queue::Target;

pub const CHAT_RATE_LIMITED_MESSAGE: &str =
  "Too many messages. Please wait a moment before sending another message.";
pub const CHAT_TIMEOUT_MESSAGE: &str =
  "Response took too long. The AI might be processing - please wait a moment.";
const SEND_FAILED: &str = "Failed to send message. Please try again.";

const MAX_TITLE_CHARS: usize = 100;

/// Conversations with the assistant. Messages go to the AI endpoint;
/// history lives on the main API.
pub struct ChatApi<'a> {
  client: &'a CivicClient,
}

impl<'a> ChatApi<'a> {
  pub(crate) fn new(client: &'a CivicClient) -> Self {
    Self { client }
  }

  pub async fn send_message(
    &self,
    message: &str,
    session_id: Option<&str>,
  ) -> Result<ChatReply, ApiError> {
    let message = message.trim();
    if message.is_empty() {
      return Err(ApiError::new(
        ErrorKind::ValidationFailed,
        "Validation failed: message cannot be empty",
      ));
    }
    debug!(
      preview = %message.chars().take(50).collect::<String>(),
      session = ?session_id,
      "Sending message"
    );

    let body = json!({
      "message": message,
      "sessionId": session_id,
      "timestamp": self.client.clock().now().to_rfc3339(),
      "userAgent": concat!("civic-navigator/", env!("CARGO_PKG_VERSION")),
      "locale": self.client.locale(),
    });

    let reply: ApiChatReply = self
      .client
      .ai()
      .post("/chat/message", RequestOptions::new().body(body))
      .await
      .map_err(|e| match e.kind {
        ErrorKind::RateLimited => e.with_message(CHAT_RATE_LIMITED_MESSAGE),
        ErrorKind::Timeout => e.with_message(CHAT_TIMEOUT_MESSAGE),
        ErrorKind::AuthExpired | ErrorKind::Storage => e,
        _ => e.with_message(SEND_FAILED),
      })?;

    let reply = ChatReply::from(reply);
    info!(length = reply.message.content.len(), "Message sent successfully");
    Ok(reply)
  }

  /// The 50 most recently updated sessions.
  pub async fn sessions(&self) -> Result<Vec<ChatSession>, ApiError> {
    let options = RequestOptions::new()
      .query("limit", 50)
      .query("orderBy", "lastUpdated")
      .query("order", "desc");

    let list: ApiSessionList = self
      .client
      .read(Target::Api, "/chat/sessions", options)
      .await
      .map_err(|e| e.or_message("Failed to load chat history. Please refresh and try again."))?;
    list.into_sessions()
  }

  pub async fn session(&self, session_id: &str) -> Result<ChatSession, ApiError> {
    let session: ApiChatSession = self
      .client
      .read(
        Target::Api,
        &format!("/chat/sessions/{}", session_id),
        RequestOptions::new(),
      )
      .await
      .map_err(|e| e.or_message("Failed to load conversation. Please try again."))?;
    session.into_session()
  }

  pub async fn delete_session(&self, session_id: &str) -> Result<(), ApiError> {
    self
      .client
      .api()
      .delete::<Value>(&format!("/chat/sessions/{}", session_id), RequestOptions::new())
      .await
      .map_err(|e| e.or_message("Failed to delete conversation. Please try again."))?;
    info!(session_id, "Session deleted");
    Ok(())
  }

  /// Titles are trimmed and capped at 100 characters.
  pub async fn rename_session(&self, session_id: &str, title: &str) -> Result<String, ApiError> {
    let title: String = title.trim().chars().take(MAX_TITLE_CHARS).collect();
    self
      .client
      .api()
      .patch::<Value>(
        &format!("/chat/sessions/{}", session_id),
        RequestOptions::new().body(json!({ "title": title })),
      )
      .await
      .map_err(|e| e.or_message("Failed to update conversation title."))?;
    Ok(title)
  }

  /// Best-effort: zeroed counts on failure.
  pub async fn stats(&self) -> ChatStats {
    let result = self
      .client
      .read::<ChatStats>(Target::Api, "/chat/stats", RequestOptions::new())
      .await;
    best_effort(result, "Chat stats", ChatStats::default())
  }
}

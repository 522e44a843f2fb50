//! Serde-deserializable types matching CivicNavigator backend responses.
//!
//! The backend is inconsistent about field names (`id` vs `_id`,
//! `createdAt` vs `submittedOn`) and about whether lists come wrapped with
//! pagination. These types accept every known variant; the adapters below
//! turn them into the view models in `types`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::types::{
  ArticlePage, ArticleStatus, ChatMessage, ChatReply, ChatSession, Citation, ContactInfo,
  Incident, IncidentPage, IncidentStatus, KbArticle, MessageKind, Pagination, Priority, Role,
  User, UserPage,
};
use crate::http::{ApiError, ErrorKind};

/// Prefix of human-facing incident references.
pub const DISPLAY_PREFIX: &str = "INC-";

/// Confidence assumed when the assistant does not report one.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

// ============================================================================
// Helpers
// ============================================================================

/// `INC-` plus the last six characters of the raw id, uppercased.
pub fn display_id(raw_id: &str) -> String {
  let chars: Vec<char> = raw_id.chars().collect();
  let tail: String = chars[chars.len().saturating_sub(6)..].iter().collect();
  format!("{}{}", DISPLAY_PREFIX, tail.to_uppercase())
}

/// Accept either a display reference or a raw id.
pub fn strip_display_prefix(id: &str) -> &str {
  let id = id.trim();
  id.strip_prefix(DISPLAY_PREFIX).unwrap_or(id)
}

/// Coerce a backend timestamp (RFC 3339 string, naive datetime string, or
/// epoch milliseconds) to UTC.
pub fn coerce_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
  match value? {
    Value::String(s) => {
      let s = s.trim();
      DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
          NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
            .map(|naive| naive.and_utc())
            .ok()
        })
    }
    Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
    _ => None,
  }
}

/// Reference fields arrive either as an id string or as a populated object;
/// for objects the first of `keys` present wins.
fn reference(value: Option<Value>, keys: &[&str]) -> Option<String> {
  match value? {
    Value::String(s) if !s.is_empty() => Some(s),
    Value::Object(map) => keys
      .iter()
      .find_map(|k| map.get(*k).and_then(Value::as_str))
      .map(String::from),
    _ => None,
  }
}

const ID_KEYS: &[&str] = &["id", "_id"];
const NAME_KEYS: &[&str] = &["name", "email", "id", "_id"];

fn pick_id(id: Option<String>, mongo_id: Option<String>) -> Option<String> {
  id.filter(|s| !s.is_empty())
    .or(mongo_id.filter(|s| !s.is_empty()))
}

fn missing_id(resource: &str) -> ApiError {
  ApiError::new(
    ErrorKind::Unknown,
    format!("Unexpected response from server: {} has no id", resource),
  )
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiPagination {
  pub current: Option<u32>,
  pub pages: Option<u32>,
  pub total: Option<u64>,
}

impl ApiPagination {
  fn resolve(self, fallback_total: usize) -> Pagination {
    Pagination {
      current: self.current.unwrap_or(1),
      pages: self.pages.unwrap_or(1),
      total: self.total.unwrap_or(fallback_total as u64),
    }
  }
}

// ============================================================================
// Users and auth
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUser {
  pub id: Option<String>,
  #[serde(rename = "_id")]
  pub mongo_id: Option<String>,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub email: String,
  pub role: Option<String>,
  pub created_at: Option<String>,
  pub last_active: Option<String>,
}

impl ApiUser {
  /// A missing or unrecognized role falls back to the email convention.
  pub fn into_user(self) -> User {
    let role = match self.role.as_deref().map(str::parse::<Role>) {
      Some(Ok(role)) => role,
      _ => {
        let inferred = Role::infer_from_email(&self.email);
        debug!(email = %self.email, role = %inferred, "inferred user role from email");
        inferred
      }
    };
    User {
      id: pick_id(self.id, self.mongo_id).unwrap_or_else(|| self.email.clone()),
      name: self.name,
      email: self.email,
      role,
      created_at: self.created_at,
      last_active: self.last_active,
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLoginResponse {
  pub token: String,
  pub user: ApiUser,
  /// Seconds until the token expires
  pub expires_in: Option<Value>,
}

impl ApiLoginResponse {
  pub fn expires_in_secs(&self) -> Option<i64> {
    let secs = match self.expires_in.as_ref()? {
      Value::Number(n) => n.as_i64(),
      Value::String(s) => s.trim().parse().ok(),
      _ => None,
    };
    secs.filter(|secs| *secs > 0)
  }
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiRegisterResponse {
  pub message: Option<String>,
  pub user: Option<ApiUser>,
}

/// Single-user payloads come bare or wrapped in `{ user }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiUserEnvelope {
  Wrapped { user: ApiUser },
  Bare(ApiUser),
}

impl ApiUserEnvelope {
  pub fn into_user(self) -> User {
    match self {
      Self::Wrapped { user } | Self::Bare(user) => user.into_user(),
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiUserList {
  Paged {
    users: Vec<ApiUser>,
    #[serde(default)]
    pagination: Option<ApiPagination>,
  },
  Bare(Vec<ApiUser>),
}

impl From<ApiUserList> for UserPage {
  fn from(list: ApiUserList) -> Self {
    let (users, pagination) = match list {
      ApiUserList::Paged { users, pagination } => (users, pagination),
      ApiUserList::Bare(users) => (users, None),
    };
    let users: Vec<User> = users.into_iter().map(ApiUser::into_user).collect();
    let pagination = pagination.unwrap_or_default().resolve(users.len());
    UserPage { users, pagination }
  }
}

// ============================================================================
// Chat
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiChatMessage {
  pub id: Option<String>,
  #[serde(rename = "_id")]
  pub mongo_id: Option<String>,
  #[serde(rename = "type")]
  pub kind: Option<String>,
  pub role: Option<String>,
  #[serde(default)]
  pub content: String,
  pub timestamp: Option<Value>,
  pub citations: Option<Vec<Citation>>,
  pub confidence: Option<f64>,
}

impl ApiChatMessage {
  fn into_message(self, default_kind: MessageKind) -> ChatMessage {
    let kind = match self.kind.as_deref().or(self.role.as_deref()) {
      Some("user") => MessageKind::User,
      Some("ai") | Some("assistant") => MessageKind::Ai,
      _ => default_kind,
    };
    ChatMessage {
      id: pick_id(self.id, self.mongo_id).unwrap_or_default(),
      kind,
      content: self.content,
      timestamp: coerce_timestamp(self.timestamp.as_ref()),
      citations: self.citations.unwrap_or_default(),
      confidence: self.confidence,
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiChatReply {
  pub message: ApiChatMessage,
  pub session_id: Option<String>,
  pub suggestions: Option<Vec<String>>,
}

impl From<ApiChatReply> for ChatReply {
  fn from(reply: ApiChatReply) -> Self {
    let mut message = reply.message.into_message(MessageKind::Ai);
    // zero counts as "not reported"
    message.confidence = message
      .confidence
      .filter(|c| *c > 0.0)
      .or(Some(DEFAULT_CONFIDENCE));
    ChatReply {
      message,
      session_id: reply.session_id,
      suggestions: reply.suggestions.unwrap_or_default(),
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiChatSession {
  pub id: Option<String>,
  #[serde(rename = "_id")]
  pub mongo_id: Option<String>,
  #[serde(default)]
  pub title: String,
  pub timestamp: Option<Value>,
  pub last_updated: Option<Value>,
  pub messages: Option<Vec<ApiChatMessage>>,
  pub user_id: Option<Value>,
}

impl ApiChatSession {
  pub fn into_session(self) -> Result<ChatSession, ApiError> {
    let id = pick_id(self.id, self.mongo_id).ok_or_else(|| missing_id("chat session"))?;
    let timestamp = coerce_timestamp(self.timestamp.as_ref())
      .or_else(|| coerce_timestamp(self.last_updated.as_ref()));
    Ok(ChatSession {
      id,
      title: self.title,
      timestamp,
      messages: self
        .messages
        .unwrap_or_default()
        .into_iter()
        .map(|m| m.into_message(MessageKind::User))
        .collect(),
      user_id: reference(self.user_id, ID_KEYS),
    })
  }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiSessionList {
  Wrapped { sessions: Vec<ApiChatSession> },
  Bare(Vec<ApiChatSession>),
}

impl ApiSessionList {
  pub fn into_sessions(self) -> Result<Vec<ChatSession>, ApiError> {
    let sessions = match self {
      Self::Wrapped { sessions } | Self::Bare(sessions) => sessions,
    };
    sessions.into_iter().map(ApiChatSession::into_session).collect()
  }
}

// ============================================================================
// Incidents
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiContact {
  Details(ContactInfo),
  Text(String),
}

impl From<ApiContact> for ContactInfo {
  fn from(contact: ApiContact) -> Self {
    match contact {
      ApiContact::Details(info) => info,
      ApiContact::Text(text) if text.contains('@') => ContactInfo {
        email: Some(text),
        phone: None,
      },
      ApiContact::Text(text) => ContactInfo {
        email: None,
        phone: Some(text),
      },
    }
  }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiIncident {
  pub id: Option<String>,
  #[serde(rename = "_id")]
  pub mongo_id: Option<String>,
  pub incident_id: Option<String>,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub category: String,
  #[serde(default)]
  pub location: Option<Value>,
  pub status: Option<String>,
  pub priority: Option<String>,
  pub created_at: Option<Value>,
  pub submitted_on: Option<Value>,
  pub updated_at: Option<Value>,
  pub last_updated: Option<Value>,
  pub contact_info: Option<ApiContact>,
  pub user_id: Option<Value>,
  pub assigned_to: Option<Value>,
  #[serde(default)]
  pub photos: Vec<String>,
}

fn location_text(value: Option<Value>) -> String {
  match value {
    Some(Value::String(s)) => s,
    Some(Value::Object(map)) => map
      .get("address")
      .or_else(|| map.get("name"))
      .and_then(Value::as_str)
      .unwrap_or_default()
      .to_string(),
    _ => String::new(),
  }
}

impl ApiIncident {
  /// Reconcile id, display id, timestamps and enums into an [`Incident`].
  pub fn into_incident(self) -> Result<Incident, ApiError> {
    let id = pick_id(self.id, self.mongo_id).ok_or_else(|| missing_id("incident"))?;
    let incident_id = self
      .incident_id
      .filter(|s| !s.trim().is_empty())
      .unwrap_or_else(|| display_id(&id));

    let status = match self.status.as_deref().map(str::parse::<IncidentStatus>) {
      Some(Ok(status)) => status,
      Some(Err(e)) => {
        debug!("{}; treating as NEW", e);
        IncidentStatus::New
      }
      None => IncidentStatus::New,
    };
    let priority = self
      .priority
      .as_deref()
      .and_then(|p| p.parse::<Priority>().ok())
      .unwrap_or_default();

    Ok(Incident {
      id,
      incident_id,
      title: self.title,
      description: self.description,
      category: self.category,
      location: location_text(self.location),
      status,
      priority,
      submitted_on: coerce_timestamp(self.created_at.as_ref())
        .or_else(|| coerce_timestamp(self.submitted_on.as_ref())),
      last_updated: coerce_timestamp(self.updated_at.as_ref())
        .or_else(|| coerce_timestamp(self.last_updated.as_ref())),
      contact_info: self.contact_info.map(ContactInfo::from),
      user_id: reference(self.user_id, ID_KEYS),
      assigned_to: reference(self.assigned_to, NAME_KEYS),
      photos: self.photos,
    })
  }
}

/// Single-incident payloads come bare or wrapped in `{ incident }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiIncidentEnvelope {
  Wrapped { incident: ApiIncident },
  Bare(ApiIncident),
}

impl ApiIncidentEnvelope {
  pub fn into_incident(self) -> Result<Incident, ApiError> {
    match self {
      Self::Wrapped { incident } | Self::Bare(incident) => incident.into_incident(),
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiIncidentList {
  Paged {
    incidents: Vec<ApiIncident>,
    #[serde(default)]
    pagination: Option<ApiPagination>,
  },
  Bare(Vec<ApiIncident>),
}

impl ApiIncidentList {
  pub fn into_page(self) -> Result<IncidentPage, ApiError> {
    let (raw, pagination) = match self {
      Self::Paged {
        incidents,
        pagination,
      } => (incidents, pagination),
      Self::Bare(incidents) => (incidents, None),
    };
    let incidents = raw
      .into_iter()
      .map(ApiIncident::into_incident)
      .collect::<Result<Vec<_>, _>>()?;
    let pagination = pagination.unwrap_or_default().resolve(incidents.len());
    Ok(IncidentPage {
      incidents,
      total: pagination.total,
      current_page: pagination.current,
      total_pages: pagination.pages,
    })
  }
}

// ============================================================================
// Knowledge base
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiArticle {
  pub id: Option<String>,
  #[serde(rename = "_id")]
  pub mongo_id: Option<String>,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub content: String,
  #[serde(default)]
  pub category: String,
  #[serde(default)]
  pub tags: Vec<String>,
  pub status: Option<String>,
  pub author: Option<Value>,
  pub created_at: Option<Value>,
  pub updated_at: Option<Value>,
  #[serde(default)]
  pub views: u64,
  pub source_url: Option<String>,
}

impl ApiArticle {
  pub fn into_article(self) -> Result<KbArticle, ApiError> {
    let id = pick_id(self.id, self.mongo_id).ok_or_else(|| missing_id("article"))?;
    Ok(KbArticle {
      id,
      title: self.title,
      content: self.content,
      category: self.category,
      tags: self.tags,
      status: self
        .status
        .as_deref()
        .and_then(|s| s.parse::<ArticleStatus>().ok()),
      author: reference(self.author, NAME_KEYS).unwrap_or_default(),
      created_at: coerce_timestamp(self.created_at.as_ref()),
      updated_at: coerce_timestamp(self.updated_at.as_ref()),
      views: self.views,
      source_url: self.source_url,
    })
  }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiArticleEnvelope {
  Wrapped { article: ApiArticle },
  Bare(ApiArticle),
}

impl ApiArticleEnvelope {
  pub fn into_article(self) -> Result<KbArticle, ApiError> {
    match self {
      Self::Wrapped { article } | Self::Bare(article) => article.into_article(),
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiArticleList {
  Paged {
    articles: Vec<ApiArticle>,
    #[serde(default)]
    pagination: Option<ApiPagination>,
  },
  Bare(Vec<ApiArticle>),
}

impl ApiArticleList {
  pub fn into_page(self) -> Result<ArticlePage, ApiError> {
    let (raw, pagination) = match self {
      Self::Paged {
        articles,
        pagination,
      } => (articles, pagination),
      Self::Bare(articles) => (articles, None),
    };
    let articles = raw
      .into_iter()
      .map(ApiArticle::into_article)
      .collect::<Result<Vec<_>, _>>()?;
    let pagination = pagination.unwrap_or_default().resolve(articles.len());
    Ok(ArticlePage {
      articles,
      pagination,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;
  use serde_json::json;

  #[test]
  fn test_display_id() {
    assert_eq!(display_id("64f1a2b3c4d5e6f7a8b9c0d1"), "INC-B9C0D1");
    assert_eq!(display_id("ab1"), "INC-AB1");
  }

  #[test]
  fn test_strip_display_prefix() {
    assert_eq!(strip_display_prefix("INC-B9C0D1"), "B9C0D1");
    assert_eq!(strip_display_prefix("64f1a2b3"), "64f1a2b3");
    assert_eq!(strip_display_prefix("XINC-1"), "XINC-1");
  }

  #[test]
  fn test_coerce_timestamp_variants() {
    let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    assert_eq!(
      coerce_timestamp(Some(&json!("2024-03-01T12:00:00.000Z"))),
      Some(expected)
    );
    assert_eq!(
      coerce_timestamp(Some(&json!("2024-03-01T15:00:00+03:00"))),
      Some(expected)
    );
    assert_eq!(
      coerce_timestamp(Some(&json!("2024-03-01T12:00:00"))),
      Some(expected)
    );
    assert_eq!(
      coerce_timestamp(Some(&json!(expected.timestamp_millis()))),
      Some(expected)
    );
    assert_eq!(coerce_timestamp(Some(&json!("yesterday"))), None);
    assert_eq!(coerce_timestamp(None), None);
  }

  #[test]
  fn test_incident_adapter_reconciles_field_names() {
    let raw: ApiIncidentEnvelope = serde_json::from_value(json!({
      "_id": "64f1a2b3c4d5e6f7a8b9c0d1",
      "title": "Pothole",
      "description": "Deep one",
      "category": "Road Maintenance",
      "location": "CBD",
      "status": "IN_PROGRESS",
      "createdAt": "2024-03-01T12:00:00Z",
      "lastUpdated": "2024-03-02T12:00:00Z",
      "contactInfo": { "email": "jane@example.com" },
      "assignedTo": { "_id": "u9", "name": "Road Crew" }
    }))
    .unwrap();

    let incident = raw.into_incident().unwrap();
    assert_eq!(incident.id, "64f1a2b3c4d5e6f7a8b9c0d1");
    assert_eq!(incident.incident_id, "INC-B9C0D1");
    assert_eq!(incident.status, IncidentStatus::InProgress);
    assert_eq!(incident.priority, Priority::Medium);
    assert_eq!(
      incident.submitted_on,
      Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
    );
    assert_eq!(
      incident.last_updated,
      Some(Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap())
    );
    assert_eq!(incident.assigned_to.as_deref(), Some("Road Crew"));
    assert_eq!(
      incident.contact_info.unwrap().email.as_deref(),
      Some("jane@example.com")
    );
  }

  #[test]
  fn test_incident_adapter_prefers_backend_reference() {
    let raw: ApiIncidentEnvelope = serde_json::from_value(json!({
      "incident": { "id": "abc123456", "incidentId": "INC-2024-0001", "status": "NEW" }
    }))
    .unwrap();
    assert_eq!(raw.into_incident().unwrap().incident_id, "INC-2024-0001");

    let missing: ApiIncidentEnvelope = serde_json::from_value(json!({ "title": "x" })).unwrap();
    assert!(missing.into_incident().is_err());
  }

  #[test]
  fn test_user_role_falls_back_to_email() {
    let user: ApiUser = serde_json::from_value(json!({
      "_id": "u1", "name": "Admin", "email": "admin@city.gov"
    }))
    .unwrap();
    let user = user.into_user();
    assert_eq!(user.id, "u1");
    assert_eq!(user.role, Role::Admin);

    let explicit: ApiUser = serde_json::from_value(json!({
      "id": "u2", "name": "Sam", "email": "admin.sam@example.com", "role": "resident"
    }))
    .unwrap();
    assert_eq!(explicit.into_user().role, Role::Resident);
  }

  #[test]
  fn test_unknown_article_status_is_kept_unset() {
    let list: ApiArticleList = serde_json::from_value(json!([
      { "_id": "a1", "status": "archived" },
      { "_id": "a2" },
      { "_id": "a3", "status": "draft" }
    ]))
    .unwrap();
    let page = list.into_page().unwrap();
    let statuses: Vec<_> = page.articles.iter().map(|a| a.status).collect();
    assert_eq!(statuses, vec![None, None, Some(ArticleStatus::Draft)]);
  }

  #[test]
  fn test_lists_accept_paged_and_bare_shapes() {
    let paged: ApiArticleList = serde_json::from_value(json!({
      "articles": [{ "_id": "a1", "title": "Rates", "status": "published" }],
      "pagination": { "current": 2, "pages": 3, "total": 41 }
    }))
    .unwrap();
    let page = paged.into_page().unwrap();
    assert_eq!(page.articles[0].status, Some(ArticleStatus::Published));
    assert_eq!(page.pagination.total, 41);

    let bare: ApiArticleList =
      serde_json::from_value(json!([{ "id": "a1" }, { "id": "a2" }])).unwrap();
    let page = bare.into_page().unwrap();
    assert_eq!(page.pagination, Pagination::single(2));

    let users: ApiUserList = serde_json::from_value(json!({ "users": [] })).unwrap();
    assert_eq!(UserPage::from(users).pagination, Pagination::single(0));
  }

  #[test]
  fn test_chat_reply_defaults() {
    let reply: ApiChatReply = serde_json::from_value(json!({
      "message": { "id": "m1", "content": "Hello", "confidence": 0 },
      "sessionId": "s1"
    }))
    .unwrap();
    let reply = ChatReply::from(reply);
    assert_eq!(reply.message.kind, MessageKind::Ai);
    assert_eq!(reply.message.confidence, Some(DEFAULT_CONFIDENCE));
    assert!(reply.message.citations.is_empty());
    assert!(reply.suggestions.is_empty());
    assert_eq!(reply.session_id.as_deref(), Some("s1"));
  }

  #[test]
  fn test_login_expiry_parsing() {
    let login: ApiLoginResponse = serde_json::from_value(json!({
      "token": "t", "user": { "id": "u" }, "expiresIn": "3600"
    }))
    .unwrap();
    assert_eq!(login.expires_in_secs(), Some(3600));
  }
}

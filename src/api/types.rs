//! View models returned by the domain modules.
//!
//! These are the normalized shapes callers work with. Raw backend payloads
//! live in `api_types` and are converted by per-resource adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  #[default]
  Resident,
  Staff,
  Admin,
}

impl Role {
  /// Demo convention for accounts the backend returns without a role.
  pub fn infer_from_email(email: &str) -> Self {
    let email = email.to_lowercase();
    if email.contains("admin") {
      Self::Admin
    } else if email.contains("staff") {
      Self::Staff
    } else {
      Self::Resident
    }
  }

  /// Staff and admins see the staff console.
  pub fn is_staff(self) -> bool {
    matches!(self, Self::Staff | Self::Admin)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Resident => "resident",
      Self::Staff => "staff",
      Self::Admin => "admin",
    }
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Role {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "resident" => Ok(Self::Resident),
      "staff" => Ok(Self::Staff),
      "admin" => Ok(Self::Admin),
      other => Err(format!("unknown role '{}'", other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id: String,
  pub name: String,
  pub email: String,
  #[serde(default)]
  pub role: Role,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_active: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
  pub current: u32,
  pub pages: u32,
  pub total: u64,
}

impl Pagination {
  /// Single-page pagination for unpaged list responses.
  pub fn single(total: usize) -> Self {
    Self {
      current: 1,
      pages: 1,
      total: total as u64,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct UserQuery {
  pub page: Option<u32>,
  pub limit: Option<u32>,
  pub search: Option<String>,
  pub role: Option<Role>,
  pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPage {
  pub users: Vec<User>,
  pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
  pub name: String,
  pub email: String,
  pub password: String,
  pub role: Role,
  pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub role: Option<Role>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_active: Option<bool>,
  pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
}

/// Outcome of a registration; the backend does not log the user in.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Registration {
  pub message: Option<String>,
  pub user: Option<User>,
}

// ============================================================================
// Chat
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
  User,
  Ai,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Citation {
  pub title: String,
  pub snippet: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub source_link: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub doc_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
  pub id: String,
  #[serde(rename = "type")]
  pub kind: MessageKind,
  pub content: String,
  pub timestamp: Option<DateTime<Utc>>,
  pub citations: Vec<Citation>,
  pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
  pub id: String,
  pub title: String,
  pub timestamp: Option<DateTime<Utc>>,
  pub messages: Vec<ChatMessage>,
  pub user_id: Option<String>,
}

/// The assistant's answer to one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
  pub message: ChatMessage,
  pub session_id: Option<String>,
  pub suggestions: Vec<String>,
}

// ============================================================================
// Incidents
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
  #[default]
  New,
  InProgress,
  Resolved,
  Closed,
}

impl IncidentStatus {
  pub const ALL: [IncidentStatus; 4] = [Self::New, Self::InProgress, Self::Resolved, Self::Closed];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::New => "NEW",
      Self::InProgress => "IN_PROGRESS",
      Self::Resolved => "RESOLVED",
      Self::Closed => "CLOSED",
    }
  }
}

impl fmt::Display for IncidentStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for IncidentStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_uppercase().replace([' ', '-'], "_").as_str() {
      "NEW" => Ok(Self::New),
      "IN_PROGRESS" => Ok(Self::InProgress),
      "RESOLVED" => Ok(Self::Resolved),
      "CLOSED" => Ok(Self::Closed),
      other => Err(format!("unknown incident status '{}'", other)),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
  Low,
  #[default]
  Medium,
  High,
}

impl Priority {
  pub const ALL: [Priority; 3] = [Self::Low, Self::Medium, Self::High];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Low => "LOW",
      Self::Medium => "MEDIUM",
      Self::High => "HIGH",
    }
  }
}

impl fmt::Display for Priority {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Priority {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_uppercase().as_str() {
      "LOW" => Ok(Self::Low),
      "MEDIUM" => Ok(Self::Medium),
      "HIGH" => Ok(Self::High),
      other => Err(format!("unknown priority '{}'", other)),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
  pub lat: f64,
  pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
  /// Raw backend identifier
  pub id: String,
  /// Human-facing reference, e.g. `INC-3F9A1C`
  pub incident_id: String,
  pub title: String,
  pub description: String,
  pub category: String,
  pub location: String,
  pub status: IncidentStatus,
  pub priority: Priority,
  pub submitted_on: Option<DateTime<Utc>>,
  pub last_updated: Option<DateTime<Utc>>,
  pub contact_info: Option<ContactInfo>,
  pub user_id: Option<String>,
  pub assigned_to: Option<String>,
  pub photos: Vec<String>,
}

/// A resident's report, before submission.
#[derive(Debug, Clone, Default)]
pub struct NewIncident {
  pub title: String,
  pub description: String,
  pub category: String,
  pub location: String,
  pub contact_info: Option<ContactInfo>,
  /// Used as the contact email when `contact_info` is absent
  pub email: Option<String>,
  pub priority: Option<Priority>,
  pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, Default)]
pub struct IncidentQuery {
  pub page: Option<u32>,
  pub limit: Option<u32>,
  pub search: Option<String>,
  pub category: Option<String>,
  pub status: Option<IncidentStatus>,
  pub priority: Option<Priority>,
  pub assigned: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentPage {
  pub incidents: Vec<Incident>,
  pub total: u64,
  pub current_page: u32,
  pub total_pages: u32,
}

/// Result of a mutating call that may have been deferred.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission<T> {
  /// Delivered to the backend
  Sent(T),
  /// Captured in the offline queue under this id
  Queued(String),
}

impl<T> Submission<T> {
  pub fn is_queued(&self) -> bool {
    matches!(self, Self::Queued(_))
  }

  pub fn sent(self) -> Option<T> {
    match self {
      Self::Sent(value) => Some(value),
      Self::Queued(_) => None,
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Submission<U> {
    match self {
      Self::Sent(value) => Submission::Sent(f(value)),
      Self::Queued(id) => Submission::Queued(id),
    }
  }
}

// ============================================================================
// Knowledge base
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
  #[default]
  Draft,
  Published,
}

impl ArticleStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Draft => "draft",
      Self::Published => "published",
    }
  }
}

impl fmt::Display for ArticleStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ArticleStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "draft" => Ok(Self::Draft),
      "published" => Ok(Self::Published),
      other => Err(format!("unknown article status '{}'", other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KbArticle {
  pub id: String,
  pub title: String,
  pub content: String,
  pub category: String,
  pub tags: Vec<String>,
  /// `None` when the backend sent no status or one outside draft/published
  pub status: Option<ArticleStatus>,
  pub author: String,
  pub created_at: Option<DateTime<Utc>>,
  pub updated_at: Option<DateTime<Utc>>,
  pub views: u64,
  pub source_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleDraft {
  pub title: String,
  pub content: String,
  pub category: String,
  pub tags: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub source_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<ArticleStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct ArticleQuery {
  pub page: Option<u32>,
  pub limit: Option<u32>,
  pub search: Option<String>,
  pub status: Option<ArticleStatus>,
  pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticlePage {
  pub articles: Vec<KbArticle>,
  pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KbSearchHit {
  pub id: Option<String>,
  pub title: String,
  pub snippet: Option<String>,
  pub content: Option<String>,
  pub category: Option<String>,
  pub score: Option<f64>,
  pub source_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KbSearchResults {
  pub query: String,
  pub results: Vec<KbSearchHit>,
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserStats {
  pub total_users: u64,
  pub active_users: u64,
  pub residents: u64,
  pub staff: u64,
  pub admins: u64,
  pub recent_registrations: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatStats {
  pub total_sessions: u64,
  pub total_messages: u64,
  pub avg_response_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IncidentStats {
  pub total: u64,
  pub by_status: BTreeMap<String, u64>,
  pub by_category: BTreeMap<String, u64>,
  pub by_priority: BTreeMap<String, u64>,
}

impl Default for IncidentStats {
  fn default() -> Self {
    Self {
      total: 0,
      by_status: IncidentStatus::ALL
        .iter()
        .map(|s| (s.to_string(), 0))
        .collect(),
      by_category: BTreeMap::new(),
      by_priority: Priority::ALL.iter().map(|p| (p.to_string(), 0)).collect(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KbStats {
  pub total_articles: u64,
  pub total_views: u64,
  pub published_articles: u64,
  pub draft_articles: u64,
  pub category_counts: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemMetrics {
  pub total_users: u64,
  pub total_incidents: u64,
  pub total_chat_sessions: u64,
  pub system_uptime: f64,
  pub response_time: f64,
}

// ============================================================================
// Utilities
// ============================================================================

/// Reachability of each backend surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
  #[serde(rename = "mainAPI")]
  pub main_api: bool,
  #[serde(rename = "aiAPI")]
  pub ai_api: bool,
  #[serde(rename = "authAPI")]
  pub auth_api: bool,
  #[serde(rename = "aiHealthAPI")]
  pub ai_health_api: bool,
}

impl HealthStatus {
  pub fn all_up(&self) -> bool {
    self.main_api && self.ai_api && self.auth_api && self.ai_health_api
  }
}

/// Snapshot of the client's configuration and session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInfo {
  #[serde(rename = "baseURL")]
  pub base_url: String,
  #[serde(rename = "aiURL")]
  pub ai_url: String,
  pub has_token: bool,
  pub token_valid: bool,
  pub user: Option<User>,
}

// ============================================================================
// In-memory filters for staff listings
// ============================================================================

fn matches_text(needle: &Option<String>, haystacks: &[&str]) -> bool {
  match needle.as_deref().map(str::trim) {
    None | Some("") => true,
    Some(needle) => {
      let needle = needle.to_lowercase();
      haystacks
        .iter()
        .any(|h| h.to_lowercase().contains(&needle))
    }
  }
}

fn matches_category(wanted: &Option<String>, actual: &str) -> bool {
  match wanted.as_deref() {
    None | Some("") | Some("all") => true,
    Some(wanted) => wanted.eq_ignore_ascii_case(actual),
  }
}

#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
  /// Case-insensitive match on title or content
  pub search: Option<String>,
  pub status: Option<ArticleStatus>,
  pub category: Option<String>,
}

impl ArticleFilter {
  pub fn matches(&self, article: &KbArticle) -> bool {
    matches_text(&self.search, &[&article.title, &article.content])
      && self.status.map_or(true, |s| article.status == Some(s))
      && matches_category(&self.category, &article.category)
  }

  pub fn apply<'a>(&self, articles: &'a [KbArticle]) -> Vec<&'a KbArticle> {
    articles.iter().filter(|a| self.matches(a)).collect()
  }
}

#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
  /// Case-insensitive match on title, description, location or reference
  pub search: Option<String>,
  pub status: Option<IncidentStatus>,
  pub priority: Option<Priority>,
  pub category: Option<String>,
}

impl IncidentFilter {
  pub fn matches(&self, incident: &Incident) -> bool {
    matches_text(
      &self.search,
      &[
        &incident.title,
        &incident.description,
        &incident.location,
        &incident.incident_id,
      ],
    ) && self.status.map_or(true, |s| s == incident.status)
      && self.priority.map_or(true, |p| p == incident.priority)
      && matches_category(&self.category, &incident.category)
  }

  pub fn apply<'a>(&self, incidents: &'a [Incident]) -> Vec<&'a Incident> {
    incidents.iter().filter(|i| self.matches(i)).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn article(title: &str, status: ArticleStatus, category: &str) -> KbArticle {
    KbArticle {
      id: title.to_lowercase(),
      title: title.to_string(),
      content: format!("About {}", title),
      category: category.to_string(),
      tags: Vec::new(),
      status: Some(status),
      author: "staff".to_string(),
      created_at: None,
      updated_at: None,
      views: 0,
      source_url: None,
    }
  }

  #[test]
  fn test_role_inference() {
    assert_eq!(Role::infer_from_email("admin@city.gov"), Role::Admin);
    assert_eq!(Role::infer_from_email("Road.Staff@city.gov"), Role::Staff);
    assert_eq!(Role::infer_from_email("jane@example.com"), Role::Resident);
    assert!(Role::Admin.is_staff());
    assert!(!Role::Resident.is_staff());
  }

  #[test]
  fn test_enum_wire_names() {
    assert_eq!(
      serde_json::to_string(&IncidentStatus::InProgress).unwrap(),
      "\"IN_PROGRESS\""
    );
    assert_eq!("in progress".parse::<IncidentStatus>(), Ok(IncidentStatus::InProgress));
    assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"HIGH\"");
    assert_eq!(serde_json::to_string(&ArticleStatus::Draft).unwrap(), "\"draft\"");
    assert_eq!(serde_json::to_string(&MessageKind::Ai).unwrap(), "\"ai\"");
    assert!("urgent".parse::<Priority>().is_err());
  }

  #[test]
  fn test_incident_stats_default_is_zeroed() {
    let stats = IncidentStats::default();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.by_status.len(), 4);
    assert_eq!(stats.by_status["IN_PROGRESS"], 0);
    assert_eq!(stats.by_priority.len(), 3);
    assert!(stats.by_category.is_empty());
  }

  #[test]
  fn test_article_filter() {
    let articles = vec![
      article("Water rates", ArticleStatus::Published, "Utilities"),
      article("Parking permits", ArticleStatus::Draft, "Transport"),
      article("Waste collection", ArticleStatus::Draft, "Utilities"),
    ];

    let drafts = ArticleFilter {
      status: Some(ArticleStatus::Draft),
      ..Default::default()
    };
    assert_eq!(drafts.apply(&articles).len(), 2);

    let search = ArticleFilter {
      search: Some("  WATER ".into()),
      ..Default::default()
    };
    let hits = search.apply(&articles);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Water rates");

    let category = ArticleFilter {
      category: Some("utilities".into()),
      status: Some(ArticleStatus::Draft),
      ..Default::default()
    };
    assert_eq!(category.apply(&articles)[0].title, "Waste collection");

    assert_eq!(ArticleFilter::default().apply(&articles).len(), 3);
  }
}

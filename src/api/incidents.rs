use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::api_types::{strip_display_prefix, ApiIncidentEnvelope, ApiIncidentList};
use super::best_effort;
use super::types::{
  ContactInfo, Incident, IncidentPage, IncidentQuery, IncidentStats, IncidentStatus, NewIncident,
  Submission,
};
use crate::client::CivicClient;
use crate::http::{ApiError, ErrorKind, Method, RequestOptions};
use crate::queue::{RequestDescriptor, Target};

const NOT_FOUND_BY_REFERENCE: &str = "Incident not found. Please check your reference ID.";

/// Incident reporting and the staff workflow around it.
///
/// `create`, `update_status` and `add_comment` are captured in the offline
/// queue when the backend cannot be reached, returning
/// [`Submission::Queued`] instead of failing.
pub struct IncidentsApi<'a> {
  client: &'a CivicClient,
}

fn filter_options(options: RequestOptions, params: &IncidentQuery) -> RequestOptions {
  options
    .query_opt("search", params.search.as_deref())
    .query_opt("category", params.category.as_deref())
    .query_opt("status", params.status)
    .query_opt("priority", params.priority)
    .query_opt("assigned", params.assigned.as_deref())
}

impl<'a> IncidentsApi<'a> {
  pub(crate) fn new(client: &'a CivicClient) -> Self {
    Self { client }
  }

  /// The contact email falls back to the logged-in user's.
  fn contact_for(&self, incident: &NewIncident) -> ContactInfo {
    if let Some(contact) = &incident.contact_info {
      return contact.clone();
    }
    let email = incident.email.clone().or_else(|| {
      match self.client.credentials().user() {
        Ok(user) => user.map(|u| u.email),
        Err(e) => {
          warn!("{}", e);
          None
        }
      }
    });
    ContactInfo { email, phone: None }
  }

  pub async fn create(&self, incident: &NewIncident) -> Result<Submission<Incident>, ApiError> {
    info!(title = %incident.title, "Creating new incident");

    let body = json!({
      "title": incident.title,
      "description": incident.description,
      "category": incident.category,
      "location": incident.location,
      "contactInfo": self.contact_for(incident),
      "priority": incident.priority.unwrap_or_default(),
      "coordinates": incident.coordinates,
    });
    let request = RequestDescriptor::new(Target::Api, Method::Post, "/incidents").with_body(body);

    let submission = self
      .client
      .submit::<ApiIncidentEnvelope>(request)
      .await
      .map_err(|e| e.or_message("Failed to submit incident report."))?;

    match submission {
      Submission::Sent(envelope) => {
        let created = envelope.into_incident()?;
        info!(incident_id = %created.incident_id, "Incident created successfully");
        Ok(Submission::Sent(created))
      }
      Submission::Queued(id) => {
        info!(queue_id = %id, "Incident queued until connectivity returns");
        Ok(Submission::Queued(id))
      }
    }
  }

  pub async fn list(&self, params: &IncidentQuery) -> Result<IncidentPage, ApiError> {
    let options = RequestOptions::new()
      .query("page", params.page.unwrap_or(1))
      .query("limit", params.limit.unwrap_or(10));

    let list: ApiIncidentList = self
      .client
      .read(Target::Api, "/incidents", filter_options(options, params))
      .await
      .map_err(|e| e.or_message("Failed to load incidents."))?;
    list.into_page()
  }

  /// Accepts either a raw id or an `INC-` reference.
  pub async fn get(&self, incident_id: &str) -> Result<Incident, ApiError> {
    let path = format!("/incidents/{}", strip_display_prefix(incident_id));
    let envelope: ApiIncidentEnvelope = self
      .client
      .read(Target::Api, &path, RequestOptions::new())
      .await
      .map_err(|e| e.or_message("Incident not found or failed to load."))?;
    envelope.into_incident()
  }

  /// Returns the updated incident when the backend echoes it.
  pub async fn update_status(
    &self,
    incident_id: &str,
    status: IncidentStatus,
    notes: Option<&str>,
    assigned_to: Option<&str>,
  ) -> Result<Submission<Option<Incident>>, ApiError> {
    info!(incident_id, status = %status, "Updating incident status");

    let mut body = Map::new();
    body.insert("status".into(), json!(status));
    if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
      body.insert("notes".into(), json!(notes));
    }
    if let Some(assignee) = assigned_to.filter(|a| !a.trim().is_empty()) {
      body.insert("assignedTo".into(), json!(assignee));
    }

    let path = format!("/incidents/{}/status", strip_display_prefix(incident_id));
    let request =
      RequestDescriptor::new(Target::Api, Method::Put, path).with_body(Value::Object(body));

    let submission = self
      .client
      .submit::<Value>(request)
      .await
      .map_err(|e| e.or_message("Failed to update incident status."))?;

    Ok(submission.map(|value| {
      serde_json::from_value::<ApiIncidentEnvelope>(value)
        .ok()
        .and_then(|envelope| envelope.into_incident().ok())
    }))
  }

  /// Public status lookup by reference; sent without the bearer token.
  pub async fn check_status(&self, reference: &str) -> Result<Incident, ApiError> {
    let path = format!("/incidents/status/{}", strip_display_prefix(reference));
    let envelope: ApiIncidentEnvelope = self
      .client
      .read(Target::Api, &path, RequestOptions::new().public())
      .await
      .map_err(|e| match e.kind {
        ErrorKind::Unknown | ErrorKind::ValidationFailed => e.with_message(NOT_FOUND_BY_REFERENCE),
        _ => e,
      })?;
    envelope.into_incident()
  }

  pub async fn add_comment(
    &self,
    incident_id: &str,
    comment: &str,
  ) -> Result<Submission<()>, ApiError> {
    let path = format!("/incidents/{}/comments", strip_display_prefix(incident_id));
    let request = RequestDescriptor::new(Target::Api, Method::Post, path)
      .with_body(json!({ "content": comment.trim() }));

    let submission = self
      .client
      .submit::<Value>(request)
      .await
      .map_err(|e| e.or_message("Failed to add comment."))?;
    Ok(submission.map(drop))
  }

  /// Best-effort: zeroed counts on failure.
  pub async fn stats(&self, timeframe: &str) -> IncidentStats {
    let result = self
      .client
      .read::<IncidentStats>(
        Target::Api,
        "/incidents/stats",
        RequestOptions::new().query("timeframe", timeframe),
      )
      .await;
    best_effort(result, "Incident stats", IncidentStats::default())
  }

  /// Free-text search with filters; up to 50 results.
  pub async fn search(
    &self,
    query: &str,
    filters: &IncidentQuery,
  ) -> Result<IncidentPage, ApiError> {
    let filters = IncidentQuery {
      search: Some(query.trim().to_string()),
      ..filters.clone()
    };
    let options = filter_options(RequestOptions::new(), &filters).query("limit", 50);

    let list: ApiIncidentList = self
      .client
      .read(Target::Api, "/incidents", options)
      .await
      .map_err(|e| e.or_message("Search failed. Please try again."))?;
    list.into_page()
  }
}

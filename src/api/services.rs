use serde_json::Value;
use tracing::info;

use super::best_effort;
use super::types::Submission;
use crate::client::CivicClient;
use crate::http::{ApiError, Method, RequestOptions};
use crate::queue::{RequestDescriptor, Target};

/// Government service lookups: IEBC voter registration, county services
/// and NTSA records. Responses are passed through as JSON.
pub struct ServicesApi<'a> {
  client: &'a CivicClient,
}

impl<'a> ServicesApi<'a> {
  pub(crate) fn new(client: &'a CivicClient) -> Self {
    Self { client }
  }

  async fn lookup(
    &self,
    path: &str,
    options: RequestOptions,
    fallback: &str,
  ) -> Result<Value, ApiError> {
    self
      .client
      .read(Target::Api, path, options)
      .await
      .map_err(|e| e.or_message(fallback))
  }

  async fn list_or_empty(&self, path: &str, options: RequestOptions, what: &str) -> Vec<Value> {
    let result = self
      .client
      .read::<Option<Vec<Value>>>(Target::Api, path, options)
      .await
      .map(Option::unwrap_or_default);
    best_effort(result, what, Vec::new())
  }

  // IEBC

  pub async fn voter_status(&self, id_number: &str) -> Result<Value, ApiError> {
    info!("Checking voter status");
    self
      .lookup(
        &format!("/kenya/iebc/voter-status/{}", id_number.trim()),
        RequestOptions::new(),
        "Failed to check voter status. Please try again.",
      )
      .await
  }

  pub async fn polling_stations(&self, constituency: &str) -> Result<Value, ApiError> {
    self
      .lookup(
        "/kenya/iebc/polling-stations",
        RequestOptions::new().query("constituency", constituency),
        "Failed to load polling stations.",
      )
      .await
  }

  /// Best-effort: empty on failure.
  pub async fn registration_centers(&self, county: &str) -> Vec<Value> {
    self
      .list_or_empty(
        "/kenya/iebc/registration-centers",
        RequestOptions::new().query("county", county),
        "Registration centers",
      )
      .await
  }

  // County

  /// Best-effort: empty on failure.
  pub async fn county_services(&self, county_code: &str) -> Vec<Value> {
    self
      .list_or_empty(
        &format!("/kenya/county/{}/services", county_code),
        RequestOptions::new(),
        "County services",
      )
      .await
  }

  pub async fn property_rates(&self, property_id: &str, county: &str) -> Result<Value, ApiError> {
    self
      .lookup(
        &format!("/kenya/county/{}/property-rates/{}", county, property_id),
        RequestOptions::new(),
        "Failed to check property rates.",
      )
      .await
  }

  /// Queued while offline like other submissions.
  pub async fn submit_permit(
    &self,
    permit: &Value,
    county: &str,
  ) -> Result<Submission<Value>, ApiError> {
    info!(county, "Submitting permit application");
    let request = RequestDescriptor::new(
      Target::Api,
      Method::Post,
      format!("/kenya/county/{}/permits", county),
    )
    .with_body(permit.clone());

    self
      .client
      .submit(request)
      .await
      .map_err(|e| e.or_message("Failed to submit permit application."))
  }

  // NTSA

  pub async fn vehicle_status(&self, plate_number: &str) -> Result<Value, ApiError> {
    self
      .lookup(
        &format!("/kenya/ntsa/vehicle/{}", plate_number.trim()),
        RequestOptions::new(),
        "Failed to check vehicle status.",
      )
      .await
  }

  /// Best-effort: `None` on failure.
  pub async fn driving_licence_info(&self) -> Option<Value> {
    let result = self
      .client
      .read::<Option<Value>>(Target::Api, "/kenya/ntsa/driving-license-info", RequestOptions::new())
      .await;
    best_effort(result, "Driving licence info", None)
  }
}

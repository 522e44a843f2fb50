use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

use super::types::SystemMetrics;
use super::{best_effort, write_export};
use crate::client::CivicClient;
use crate::http::{ApiError, RequestOptions};
use crate::queue::Target;

/// Admin dashboards. Metric payloads are passed through as JSON since
/// their shape depends on the requested timeframe.
pub struct AnalyticsApi<'a> {
  client: &'a CivicClient,
}

impl<'a> AnalyticsApi<'a> {
  pub(crate) fn new(client: &'a CivicClient) -> Self {
    Self { client }
  }

  async fn metrics(&self, path: &str, options: RequestOptions, what: &str) -> Option<Value> {
    let result = self
      .client
      .read::<Option<Value>>(Target::Api, path, options)
      .await;
    best_effort(result, what, None)
  }

  pub async fn chat_metrics(&self, timeframe: &str) -> Option<Value> {
    let options = RequestOptions::new().query("timeframe", timeframe);
    self.metrics("/analytics/chat", options, "Chat metrics").await
  }

  pub async fn incident_metrics(&self, timeframe: &str) -> Option<Value> {
    let options = RequestOptions::new().query("timeframe", timeframe);
    self
      .metrics("/analytics/incidents", options, "Incident metrics")
      .await
  }

  pub async fn user_activity(&self, user_id: Option<&str>) -> Option<Value> {
    let options = RequestOptions::new().query_opt("userId", user_id);
    self
      .metrics("/analytics/user-activity", options, "User activity")
      .await
  }

  /// Best-effort: zeroed metrics on failure.
  pub async fn system_metrics(&self) -> SystemMetrics {
    let result = self
      .client
      .read::<SystemMetrics>(Target::Api, "/analytics/system", RequestOptions::new())
      .await;
    best_effort(result, "System metrics", SystemMetrics::default())
  }

  /// Download a CSV export into `dir` as `<kind>-analytics-YYYY-MM-DD.csv`.
  pub async fn export(&self, kind: &str, timeframe: &str, dir: &Path) -> Result<PathBuf, ApiError> {
    info!(kind, timeframe, "Exporting analytics data");
    let bytes = self
      .client
      .api()
      .download(
        &format!("/analytics/export/{}", kind),
        RequestOptions::new().query("timeframe", timeframe),
      )
      .await
      .map_err(|e| e.or_message("Failed to export analytics data."))?;

    let file_name = format!(
      "{}-analytics-{}.csv",
      kind,
      self.client.clock().now().format("%Y-%m-%d")
    );
    write_export(dir, &file_name, &bytes).await
  }
}

mod common;

use civic_navigator::api::types::{IncidentStatus, NewIncident, Submission};
use civic_navigator::ErrorKind;
use common::{CountingRedirect, MockServer, Reply};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn pothole() -> NewIncident {
  NewIncident {
    title: "Pothole on Moi Avenue".into(),
    description: "Deep pothole near the junction".into(),
    category: "roads".into(),
    location: "Moi Avenue".into(),
    email: Some("resident@example.com".into()),
    ..Default::default()
  }
}

fn created() -> Reply {
  Reply::json(
    201,
    json!({
      "incident": {
        "_id": "64f1a2b3c4d5e6f7a8b9c0d1",
        "title": "Pothole on Moi Avenue",
        "status": "NEW"
      }
    }),
  )
}

#[tokio::test]
async fn test_offline_submission_is_queued_then_replayed_once() {
  let server = MockServer::start().await;
  server.on("POST", "/incidents", created());
  let (client, _) = server.client(Arc::new(CountingRedirect::default()));

  server.set_offline(true).await;
  let submission = client.incidents().create(&pothole()).await.unwrap();
  let Submission::Queued(queue_id) = submission else {
    panic!("expected the report to be queued");
  };
  assert!(queue_id.starts_with("req_"));
  assert!(!client.connectivity().is_online());
  assert_eq!(client.queue().len().unwrap(), 1);

  // still offline: nothing replayed
  let report = client.process_queue().await.unwrap();
  assert!(report.processed.is_empty());
  assert_eq!(report.remaining, 1);

  server.set_offline(false).await;
  let report = client.process_queue().await.unwrap();
  assert_eq!(report.processed, vec![queue_id]);
  assert_eq!(report.remaining, 0);
  assert!(client.queue().is_empty().unwrap());
  assert!(client.connectivity().is_online());

  let posted = server.requests_to("POST", "/incidents");
  assert_eq!(posted.len(), 1);
  let body = posted[0].body.as_ref().unwrap();
  assert_eq!(body["title"], "Pothole on Moi Avenue");
  assert_eq!(body["priority"], "MEDIUM");
  assert_eq!(body["contactInfo"]["email"], "resident@example.com");

  // a second drain has nothing to send
  client.process_queue().await.unwrap();
  assert_eq!(server.requests_to("POST", "/incidents").len(), 1);
}

#[tokio::test]
async fn test_connection_dropped_after_send_is_not_queued() {
  let server = MockServer::start().await;
  server.on("POST", "/incidents", Reply::hang_up());
  server.on("POST", "/incidents", created());
  let (client, _) = server.client(Arc::new(CountingRedirect::default()));

  let err = client.incidents().create(&pothole()).await.unwrap_err();
  assert_eq!(err.kind, ErrorKind::ConnectionLost);
  assert!(client.queue().is_empty().unwrap());

  let report = client.process_queue().await.unwrap();
  assert!(report.processed.is_empty());
  assert_eq!(server.requests_to("POST", "/incidents").len(), 1);
}

#[tokio::test]
async fn test_known_offline_skips_the_network() {
  let server = MockServer::start().await;
  let (client, _) = server.client(Arc::new(CountingRedirect::default()));
  client.connectivity().mark_offline();

  let submission = client
    .incidents()
    .update_status("INC-B9C0D1", IncidentStatus::Resolved, Some("patched"), None)
    .await
    .unwrap();

  assert!(submission.is_queued());
  assert!(server.requests().is_empty());

  let pending = client.queue().pending().unwrap();
  assert_eq!(pending[0].request.path, "/incidents/B9C0D1/status");
  assert_eq!(pending[0].request.body.as_ref().unwrap()["status"], "RESOLVED");
}

#[tokio::test]
async fn test_online_submission_is_sent_directly() {
  let server = MockServer::start().await;
  server.on("POST", "/incidents", created());
  let (client, _) = server.client(Arc::new(CountingRedirect::default()));

  let incident = client.incidents().create(&pothole()).await.unwrap().sent().unwrap();

  assert_eq!(incident.incident_id, "INC-B9C0D1");
  assert_eq!(incident.status, IncidentStatus::New);
  assert!(client.queue().is_empty().unwrap());
}

#[tokio::test]
async fn test_rejected_replay_is_dead_lettered() {
  let server = MockServer::start().await;
  server.on(
    "POST",
    "/incidents/abc/comments",
    Reply::json(400, json!({ "errors": [{ "msg": "comment too long" }] })),
  );
  let (client, _) = server.client(Arc::new(CountingRedirect::default()));
  client.connectivity().mark_offline();

  client.incidents().add_comment("abc", "hello").await.unwrap();
  let report = client.process_queue().await.unwrap();

  assert_eq!(report.dead_lettered.len(), 1);
  assert!(client.queue().is_empty().unwrap());
  let dead = client.queue().dead_letters().unwrap();
  assert_eq!(dead[0].attempts, 1);
  assert!(dead[0].last_error.as_deref().unwrap().contains("comment too long"));
}

#[tokio::test]
async fn test_watch_drains_after_reconnect() {
  let server = MockServer::start().await;
  server.on("POST", "/incidents", created());
  let (client, _) = server.client(Arc::new(CountingRedirect::default()));
  let client = Arc::new(client);

  server.set_offline(true).await;
  assert!(client.incidents().create(&pothole()).await.unwrap().is_queued());
  server.set_offline(false).await;

  let watch = client.spawn_connectivity_watch(Duration::from_millis(50));
  for _ in 0..40 {
    if client.queue().is_empty().unwrap() {
      break;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
  }
  watch.abort();

  assert!(client.queue().is_empty().unwrap());
  assert_eq!(server.requests_to("POST", "/incidents").len(), 1);
}

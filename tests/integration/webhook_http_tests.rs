//! `POST /api/webhooks/jira` and `GET /health` over a real listener.
//!
//! The server runs on an ephemeral port with a [`FakeTracker`] for issue
//! detail and the in-memory broker behind the publisher.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use jira_automation::http::{self, AppState};
use jira_automation::jira::IssueTracker;
use jira_automation::models::task::Task;
use jira_automation::queue::memory::InMemoryBroker;
use jira_automation::trigger::engine::{REASON_LABEL_ADDED, REASON_MISSING_LABEL};
use jira_automation::trigger::TriggerEngine;

use super::test_helpers::{publisher, snapshot, FakeTracker, TRIGGER_LABEL, WORK_QUEUE};

struct TestServer {
    base_url: String,
    ct: CancellationToken,
    broker: InMemoryBroker,
    tracker: Arc<FakeTracker>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.ct.cancel();
    }
}

/// Bind an ephemeral listener and serve the router on it.
async fn spawn_server(tracker: FakeTracker) -> TestServer {
    let broker = InMemoryBroker::new();
    let (_channels, publisher) = publisher(&broker);
    let tracker = Arc::new(tracker);

    let state = Arc::new(AppState {
        engine: TriggerEngine::new(TRIGGER_LABEL),
        tracker: Arc::clone(&tracker) as Arc<dyn IssueTracker>,
        publisher: Arc::new(publisher),
    });

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let addr = listener.local_addr().expect("local addr");

    let ct = CancellationToken::new();
    let server_ct = ct.clone();
    tokio::spawn(async move {
        let _ = http::serve(listener, state, server_ct).await;
    });

    TestServer {
        base_url: format!("http://{addr}"),
        ct,
        broker,
        tracker,
    }
}

fn created(key: &str, labels: &[&str]) -> Value {
    json!({
        "webhookEvent": "jira:issue_created",
        "timestamp": 1_700_000_000_000_i64,
        "issue": {
            "id": "10001",
            "key": key,
            "fields": { "summary": "Add login page", "labels": labels }
        }
    })
}

fn labels_updated(key: &str, to: &str) -> Value {
    json!({
        "webhookEvent": "jira:issue_updated",
        "issue": {
            "id": "10001",
            "key": key,
            "fields": { "summary": "Add login page", "labels": to.split(' ').collect::<Vec<_>>() }
        },
        "changelog": {
            "items": [
                { "field": "labels", "fromString": "", "toString": to },
                { "field": "Sprint", "fromString": null, "toString": "Sprint 4" }
            ]
        }
    })
}

async fn post_webhook(
    server: &TestServer,
    body: String,
    txn_id: Option<&str>,
) -> reqwest::Response {
    let mut request = reqwest::Client::new()
        .post(format!("{}/api/webhooks/jira", server.base_url))
        .header("content-type", "application/json")
        .body(body);
    if let Some(txn_id) = txn_id {
        request = request.header("x-txn-id", txn_id);
    }
    request.send().await.expect("POST webhook")
}

// ── Health ───────────────────────────────────────────────────

#[tokio::test]
async fn health_returns_envelope() {
    let server = spawn_server(FakeTracker::default()).await;

    let resp = reqwest::get(format!("{}/health", server.base_url))
        .await
        .expect("GET /health");

    assert_eq!(resp.status(), 200);
    let txn_id = resp
        .headers()
        .get("x-txn-id")
        .expect("txn id header")
        .to_str()
        .expect("ascii")
        .to_owned();
    assert_eq!(txn_id.len(), 6);

    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Service is healthy");
    assert_eq!(body["data"]["status"], "ok");
}

// ── Triggering events ────────────────────────────────────────

#[tokio::test]
async fn created_with_label_enqueues_task() {
    let server = spawn_server(FakeTracker::with_issue(snapshot("PROJ-1"))).await;

    let resp = post_webhook(
        &server,
        created("PROJ-1", &[TRIGGER_LABEL, "backend"]).to_string(),
        Some("123456"),
    )
    .await;

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("x-txn-id").and_then(|v| v.to_str().ok()),
        Some("123456")
    );
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Webhook received");
    assert_eq!(body["data"]["processed"], true);
    assert_eq!(body["data"]["issueKey"], "PROJ-1");
    assert_eq!(body["data"]["queue"], WORK_QUEUE);

    assert_eq!(
        server.tracker.calls(),
        vec![("PROJ-1".to_owned(), "123456".to_owned())]
    );

    let messages = server.broker.messages(WORK_QUEUE);
    assert_eq!(messages.len(), 1);
    let task = Task::from_bytes(&messages[0].body).expect("task body");
    assert_eq!(task.issue_key, "PROJ-1");
    assert_eq!(task.txn_id.as_deref(), Some("123456"));
    assert_eq!(task.timestamp, 1_700_000_000_000);
    assert_eq!(task.issue.repository_urls, vec!["https://github.com/acme/api"]);
}

#[tokio::test]
async fn label_added_on_update_enqueues_and_reports_changes() {
    let server = spawn_server(FakeTracker::with_issue(snapshot("PROJ-2"))).await;

    let resp = post_webhook(
        &server,
        labels_updated("PROJ-2", &format!("backend {TRIGGER_LABEL}")).to_string(),
        None,
    )
    .await;

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["data"]["processed"], true);
    assert_eq!(body["data"]["reason"], REASON_LABEL_ADDED);

    let changes = body["data"]["changes"].as_array().expect("changes");
    assert_eq!(changes.len(), 1, "only relevant fields are reported");
    assert_eq!(changes[0]["field"], "labels");

    assert_eq!(server.broker.queue_depth(WORK_QUEUE), Some(1));
}

// ── Non-triggering events ────────────────────────────────────

#[tokio::test]
async fn created_without_label_is_acknowledged_but_not_enqueued() {
    let server = spawn_server(FakeTracker::default()).await;

    let resp = post_webhook(&server, created("PROJ-3", &["backend"]).to_string(), None).await;

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["processed"], false);
    assert_eq!(body["data"]["reason"], REASON_MISSING_LABEL);
    assert!(body["data"].get("queue").is_none());

    assert!(server.tracker.calls().is_empty(), "no enrichment when not triggered");
    assert_eq!(server.broker.queue_depth(WORK_QUEUE), None, "nothing declared");
}

#[tokio::test]
async fn unsupported_event_is_not_processed() {
    let server = spawn_server(FakeTracker::default()).await;
    let payload = json!({
        "webhookEvent": "jira:issue_deleted",
        "issue": { "id": "1", "key": "PROJ-4", "fields": { "labels": [TRIGGER_LABEL] } }
    });

    let resp = post_webhook(&server, payload.to_string(), None).await;

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["data"]["processed"], false);
}

// ── Failures ─────────────────────────────────────────────────

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let server = spawn_server(FakeTracker::default()).await;

    let resp = post_webhook(&server, "{not json".to_owned(), Some("654321")).await;

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["txnId"], "654321");
}

#[tokio::test]
async fn missing_issue_is_bad_request() {
    let server = spawn_server(FakeTracker::default()).await;
    let payload = json!({ "webhookEvent": "jira:issue_created" });

    let resp = post_webhook(&server, payload.to_string(), None).await;

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn empty_issue_key_is_bad_request() {
    let server = spawn_server(FakeTracker::default()).await;

    let resp = post_webhook(&server, created("  ", &[TRIGGER_LABEL]).to_string(), None).await;

    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn tracker_failure_is_server_error() {
    // The tracker knows no issues, so enrichment fails.
    let server = spawn_server(FakeTracker::default()).await;

    let resp = post_webhook(
        &server,
        created("PROJ-5", &[TRIGGER_LABEL]).to_string(),
        Some("111111"),
    )
    .await;

    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["success"], false);
    assert!(body["message"]
        .as_str()
        .expect("message")
        .contains("PROJ-5"));
    assert_eq!(body["data"]["txnId"], "111111");
    assert_eq!(server.broker.queue_depth(WORK_QUEUE), None);
}

#[tokio::test]
async fn refused_publish_is_server_error() {
    let server = spawn_server(FakeTracker::with_issue(snapshot("PROJ-6"))).await;
    server.broker.refuse_publishes(true);

    let resp = post_webhook(&server, created("PROJ-6", &[TRIGGER_LABEL]).to_string(), None).await;

    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["success"], false);
    assert_eq!(server.broker.queue_depth(WORK_QUEUE), Some(0));
}

//! Integration tests for the webhook HTTP surface.
//!
//! Each test spins up an Axum server on a random port and talks to it over
//! real HTTP with reqwest. Mail capabilities and the classifier are stubs.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use inbox_sorter::dispatch::Dispatcher;
use inbox_sorter::document::Document;
use inbox_sorter::error::{PredictError, SourceError};
use inbox_sorter::inference::Classifier;
use inbox_sorter::mail::{LabelSink, MailSource};
use inbox_sorter::server::routes;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Checkpoint "100" has one new message, "500" is an expired history id,
/// anything else has nothing new.
struct StubMailbox {
    content: String,
}

#[async_trait]
impl MailSource for StubMailbox {
    async fn list_documents_by_category(
        &self,
        _category: &str,
        _max_count: usize,
    ) -> Result<Vec<Document>, SourceError> {
        Ok(Vec::new())
    }

    async fn get_document_content(&self, _id: &str) -> Result<String, SourceError> {
        Ok(self.content.clone())
    }

    async fn list_new_items_since(&self, checkpoint: &str) -> Result<Vec<String>, SourceError> {
        match checkpoint {
            "100" => Ok(vec!["m1".to_string()]),
            "500" => Err(SourceError::Status {
                provider: "stub".into(),
                status: 404,
                body: "history too old".into(),
            }),
            _ => Ok(Vec::new()),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    calls: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl LabelSink for RecordingSink {
    async fn apply_label(&self, id: &str, label: &str) -> Result<bool, SourceError> {
        self.calls
            .lock()
            .unwrap()
            .push((id.to_string(), label.to_string()));
        Ok(true)
    }
}

#[derive(Default)]
struct FixedClassifier {
    calls: AtomicUsize,
}

impl Classifier for FixedClassifier {
    fn predict(&self, _text: &str) -> Result<Option<String>, PredictError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some("Promotions".to_string()))
    }
}

struct Server {
    base: String,
    sink: Arc<RecordingSink>,
    classifier: Arc<FixedClassifier>,
}

/// Start an Axum server on a random port.
async fn start_server(content: &str) -> Server {
    let sink = Arc::new(RecordingSink::default());
    let classifier = Arc::new(FixedClassifier::default());
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(StubMailbox {
            content: content.to_string(),
        }),
        sink.clone(),
        classifier.clone(),
        Duration::from_secs(2),
    ));
    let app = routes(dispatcher);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Server {
        base: format!("http://127.0.0.1:{port}"),
        sink,
        classifier,
    }
}

async fn post_webhook(base: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{base}/webhook"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    let json = resp.json().await.unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn health_returns_ok_text() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server("irrelevant").await;
        let resp = reqwest::get(format!("{}/health", server.base)).await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        assert_eq!(resp.text().await.unwrap(), "ok");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn new_message_is_labelled() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server("Subject: Sale! Buy now").await;
        let (status, body) = post_webhook(
            &server.base,
            json!({ "emailAddress": "user@example.com", "historyId": 100 }),
        )
        .await;

        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["result"], "labeled");
        assert_eq!(body["label"], "Promotions");
        assert_eq!(body["item_id"], "m1");
        assert!(body["dispatch_id"].is_string());
        assert_eq!(
            *server.sink.calls.lock().unwrap(),
            vec![("m1".to_string(), "Promotions".to_string())]
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn repeated_noop_notifications_never_label() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server("unused").await;
        for _ in 0..2 {
            let (status, body) = post_webhook(
                &server.base,
                json!({ "emailAddress": "user@example.com", "historyId": "200" }),
            )
            .await;
            assert_eq!(status, 200);
            assert_eq!(body["result"], "no_op");
        }
        assert!(server.sink.calls.lock().unwrap().is_empty());
        assert_eq!(server.classifier.calls.load(Ordering::SeqCst), 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn empty_content_reports_failure() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server("   ").await;
        let (status, body) = post_webhook(
            &server.base,
            json!({ "emailAddress": "user@example.com", "historyId": 100 }),
        )
        .await;

        assert_eq!(status, 500);
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "content_unavailable");
        assert_eq!(server.classifier.calls.load(Ordering::SeqCst), 0);
        assert!(server.sink.calls.lock().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn source_failure_reports_error_and_server_survives() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server("Subject: hi").await;
        let (status, body) = post_webhook(
            &server.base,
            json!({ "emailAddress": "user@example.com", "historyId": 500 }),
        )
        .await;
        assert_eq!(status, 500);
        assert_eq!(body["error"], "source_unavailable");

        // Still serving.
        let (status, _) = post_webhook(
            &server.base,
            json!({ "emailAddress": "user@example.com", "historyId": 100 }),
        )
        .await;
        assert_eq!(status, 200);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn malformed_payload_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server("unused").await;

        let (status, _) = post_webhook(&server.base, json!({ "emailAddress": "user@example.com" })).await;
        assert!(status == 400 || status == 422, "status {status}");

        let (status, body) = post_webhook(
            &server.base,
            json!({ "emailAddress": "user@example.com", "historyId": "" }),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "invalid_payload");
        assert!(server.sink.calls.lock().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

fn push_envelope(payload: Value) -> Value {
    json!({
        "message": {
            "data": STANDARD.encode(payload.to_string()),
            "messageId": "2070443601311540",
            "publishTime": "2026-10-16T09:00:00Z"
        },
        "subscription": "projects/demo/subscriptions/inbox-push"
    })
}

#[tokio::test]
async fn push_envelope_is_labelled_like_direct_payload() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server("Subject: Sale! Buy now").await;
        let (status, body) = post_webhook(
            &server.base,
            push_envelope(json!({ "emailAddress": "user@example.com", "historyId": 100 })),
        )
        .await;

        assert_eq!(status, 200);
        assert_eq!(body["result"], "labeled");
        assert_eq!(body["label"], "Promotions");
        assert_eq!(
            *server.sink.calls.lock().unwrap(),
            vec![("m1".to_string(), "Promotions".to_string())]
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn push_envelope_without_new_items_is_noop() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server("unused").await;
        let (status, body) = post_webhook(
            &server.base,
            push_envelope(json!({ "emailAddress": "user@example.com", "historyId": "200" })),
        )
        .await;

        assert_eq!(status, 200);
        assert_eq!(body["result"], "no_op");
        assert!(server.sink.calls.lock().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn push_envelope_with_garbage_data_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server("unused").await;
        let (status, body) = post_webhook(
            &server.base,
            json!({ "message": { "data": "!!not-base64!!" }, "subscription": "s" }),
        )
        .await;

        assert_eq!(status, 400);
        assert_eq!(body["error"], "invalid_payload");
        assert_eq!(server.classifier.calls.load(Ordering::SeqCst), 0);
    })
    .await
    .expect("test timed out");
}

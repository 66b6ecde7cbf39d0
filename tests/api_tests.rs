//! HTTP API tests driven through the router without a listening socket

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use parking_lot::Mutex;
use relay_gateway::gateway::{AppState, create_router};
use relay_gateway::relay::{CommandRunner, Invocation};
use relay_gateway::send::MessageSender;
use relay_gateway::webhook::WebhookRegistry;
use relay_gateway::{Error, Result};
use serde_json::{Value, json};
use tower::ServiceExt;

#[derive(Default)]
struct RecordingRunner {
    calls: Mutex<Vec<Invocation>>,
    fail_with: Option<String>,
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, invocation: &Invocation) -> Result<String> {
        self.calls.lock().push(invocation.clone());
        match &self.fail_with {
            Some(output) => Err(Error::Subprocess(output.clone())),
            None => Ok(String::new()),
        }
    }
}

fn app(dir: &Path, runner: Arc<RecordingRunner>) -> Router {
    let state = Arc::new(AppState {
        registry: Arc::new(WebhookRegistry::new(dir.join("webhook"))),
        sender: Arc::new(MessageSender::new(runner, dir.join("attachments"))),
        max_body_size: 1024 * 1024,
    });
    create_router(state)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_and_about() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), Arc::default());

    let (status, _) = call(&app, "GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(&app, "GET", "/v1/about", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["versions"], json!(["v1", "v2", "v3"]));
}

#[tokio::test]
async fn test_webhook_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), Arc::default());
    let hook = json!({ "url": "https://example.com/hook" });

    let (status, body) = call(&app, "POST", "/v3/webhook", Some(hook.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": true, "data": "OK" }));

    // Registering again is idempotent
    call(&app, "POST", "/v3/webhook", Some(hook.clone())).await;

    let (status, body) = call(&app, "GET", "/v3/webhook", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": true, "data": ["https://example.com/hook"] }));

    let (status, body) = call(&app, "POST", "/v3/webhook/remove", Some(hook.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!(true));

    // Removing an unknown URL is not an error
    let (status, _) = call(&app, "POST", "/v3/webhook/remove", Some(hook)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call(&app, "GET", "/v3/webhook", None).await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_empty_webhook_url_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), Arc::default());

    let (status, body) = call(&app, "POST", "/v3/webhook", Some(json!({ "url": "" }))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], json!(false));
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_send_success() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(RecordingRunner::default());
    let app = app(dir.path(), Arc::clone(&runner));

    let (status, body) = call(
        &app,
        "POST",
        "/v2/send",
        Some(json!({
            "number": "+15550001",
            "message": "hello",
            "recipients": ["+15550002"]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": true }));
    let calls = runner.calls.lock();
    assert_eq!(
        calls[0].args,
        vec!["--dbus-system", "--username", "+15550001", "send", "+15550002"]
    );
}

#[tokio::test]
async fn test_send_rejects_mixed_targets() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(RecordingRunner::default());
    let app = app(dir.path(), Arc::clone(&runner));

    let (status, body) = call(
        &app,
        "POST",
        "/v2/send",
        Some(json!({
            "number": "+15550001",
            "message": "hello",
            "recipients": ["+15550002", "group.Z3JvdXA="]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], json!(false));
    assert!(runner.calls.lock().is_empty());
}

#[tokio::test]
async fn test_send_invalid_body() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), Arc::default());

    let (status, body) = call(&app, "POST", "/v2/send", Some(json!({ "message": 42 }))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({ "status": false, "error": "Couldn't process request - invalid request" })
    );
}

#[tokio::test]
async fn test_send_relay_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(RecordingRunner {
        calls: Mutex::new(Vec::new()),
        fail_with: Some("Unregistered user \"+15550002\"".to_string()),
    });
    let app = app(dir.path(), runner);

    let (status, body) = call(
        &app,
        "POST",
        "/v2/send",
        Some(json!({
            "number": "+15550001",
            "message": "hello",
            "recipients": ["+15550002"]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({ "status": false, "error": "Unregistered user \"+15550002\"" })
    );
}

//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{error, warn};

use crate::Error;
use crate::send::{MessageSender, OutboundSendRequest};
use crate::webhook::WebhookRegistry;

/// API versions served by this gateway
const API_VERSIONS: [&str; 3] = ["v1", "v2", "v3"];

/// Shared application state
pub struct AppState {
    /// Webhook registry
    pub registry: Arc<WebhookRegistry>,
    /// Outbound message sender
    pub sender: Arc<MessageSender>,
    /// Maximum accepted request body size (bytes)
    pub max_body_size: usize,
}

/// Response envelope shared by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceResult {
    /// Whether the operation succeeded
    pub status: bool,
    /// Payload on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceResult {
    fn ok(data: Option<Value>) -> Response {
        (
            StatusCode::OK,
            Json(Self {
                status: true,
                data,
                error: None,
            }),
        )
            .into_response()
    }

    fn failed(message: impl Into<String>) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self {
                status: false,
                data: None,
                error: Some(message.into()),
            }),
        )
            .into_response()
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if self.is_client_error() {
            warn!(error = %self, "Rejected request");
        } else {
            error!(error = %self, "Request failed");
        }
        ServiceResult::failed(self.to_string())
    }
}

/// Webhook registration body
#[derive(Debug, Deserialize)]
pub struct WebhookRequest {
    /// Callback URL
    #[serde(default)]
    pub url: String,
}

/// Send body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// Sending account
    pub number: String,
    /// Message text
    #[serde(default)]
    pub message: String,
    /// Numbers, or `group.<id>` targets
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Base64 encoded attachments
    #[serde(default)]
    pub base64_attachments: Vec<String>,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let max_body_size = state.max_body_size;

    Router::new()
        .route("/v1/health", get(health_handler))
        .route("/v1/about", get(about_handler))
        .route("/v2/send", post(send_handler))
        .route("/v3/webhook", get(list_webhooks_handler).post(add_webhook_handler))
        .route("/v3/webhook/remove", post(remove_webhook_handler))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /v1/health
async fn health_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// GET /v1/about
async fn about_handler() -> impl IntoResponse {
    Json(json!({
        "versions": API_VERSIONS,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /v2/send
async fn send_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Invalid send request body");
            return ServiceResult::failed("Couldn't process request - invalid request");
        }
    };

    let request = match OutboundSendRequest::from_api(
        req.number,
        req.message,
        req.recipients,
        req.base64_attachments,
    ) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    match state.sender.send(&request).await {
        Ok(()) => ServiceResult::ok(None),
        Err(e) => e.into_response(),
    }
}

/// GET /v3/webhook
async fn list_webhooks_handler(State(state): State<Arc<AppState>>) -> Response {
    let urls: Vec<Value> = state
        .registry
        .list()
        .iter()
        .map(|url| Value::String(url.clone()))
        .collect();
    ServiceResult::ok(Some(Value::Array(urls)))
}

/// POST /v3/webhook
async fn add_webhook_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<WebhookRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(e) => return ServiceResult::failed(e.body_text()),
    };

    match state.registry.register(&req.url) {
        Ok(()) => ServiceResult::ok(Some(json!("OK"))),
        Err(e) => e.into_response(),
    }
}

/// POST /v3/webhook/remove
async fn remove_webhook_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<WebhookRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(e) => return ServiceResult::failed(e.body_text()),
    };

    match state.registry.unregister(&req.url) {
        Ok(()) => ServiceResult::ok(Some(json!("OK"))),
        Err(e) => e.into_response(),
    }
}

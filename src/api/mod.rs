//! HTTP API for invocations, queries and health checks
//!
//! The invoke endpoint takes `caller.address` and `caller.role` from the
//! request body without verifying them. Deploy it only behind the identity
//! layer that authenticates callers and rewrites or rejects the `caller`
//! field; exposed directly, any client can claim `admin` or `relay`.

use crate::chain::{ChannelManager, InvokeRequest, InvokeResponse};
use crate::config::ApiConfig;
use crate::error::{ChannelError, ErrorKind};

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub channels: Arc<ChannelManager>,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/channels", get(get_channels))
        .route("/channels/:channel/invoke", post(invoke))
        .route("/channels/:channel/query", post(query))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, channels: Arc<ChannelManager>) -> Result<()> {
    let app = router(AppState { channels });

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind API server on {}", addr))?;
    axum::serve(listener, app).await.context("API server failed")?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Get hosted channels
async fn get_channels(State(state): State<AppState>) -> impl IntoResponse {
    Json(ChannelsResponse {
        channels: state.channels.names(),
    })
}

/// Run a state-mutating method
async fn invoke(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Json(req): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>, ApiError> {
    let channel = state.channels.get(&channel)?;
    let response = channel.invoke(req).await?;
    Ok(Json(response))
}

/// Evaluate a query; the payload is returned as-is
async fn query(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Json(req): Json<QueryRequest>,
) -> Result<String, ApiError> {
    let channel = state.channels.get(&channel)?;
    Ok(channel.query(&req.method, &req.args).await?)
}

/// Channel error rendered as `{error, kind}`
#[derive(Debug)]
pub struct ApiError(ChannelError);

impl From<ChannelError> for ApiError {
    fn from(e: ChannelError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict | ErrorKind::InvalidTransition => StatusCode::CONFLICT,
            ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.0.to_string(),
            kind: self.0.kind().as_str().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

// Request and response types

#[derive(Deserialize)]
struct QueryRequest {
    method: String,
    #[serde(default)]
    args: Vec<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ChannelsResponse {
    channels: Vec<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const SETTINGS: &str = r#"
[node]
instance_id = "api-test"

[api]
host = "127.0.0.1"
port = 0

[metrics]
enabled = false
port = 0

[channels.FIAT]
token = "FIAT"
enabled = true
capabilities = { token = true, channel_transfer = true }
"#;

    fn app() -> Router {
        let settings = Settings::from_toml_str(SETTINGS).unwrap();
        let channels = Arc::new(ChannelManager::new(&settings).unwrap());
        router(AppState { channels })
    }

    async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, String) {
        let response = app
            .clone()
            .oneshot(
                Request::post(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health_and_channels() {
        let app = app();
        let response = app
            .clone()
            .oneshot(Request::get("/channels").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["channels"], json!(["FIAT"]));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invoke_then_query() {
        let app = app();
        let (status, body) = post_json(
            &app,
            "/channels/FIAT/invoke",
            json!({
                "method": "emit",
                "args": ["user1", "1000"],
                "caller": {"address": "admin", "role": "admin"},
                "nonce": "1660055050000"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["payload"], "\"1000\"");
        assert!(json["txId"].is_string());

        let (status, body) = post_json(
            &app,
            "/channels/FIAT/query",
            json!({"method": "balanceOf", "args": ["user1"]}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "\"1000\"");
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        let app = app();

        let (status, body) = post_json(
            &app,
            "/channels/GOLD/query",
            json!({"method": "getNonce", "args": ["user1"]}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["kind"], "not_found");

        let (status, _) = post_json(
            &app,
            "/channels/FIAT/invoke",
            json!({
                "method": "emit",
                "args": ["user1", "1000"],
                "caller": {"address": "user1", "role": "customer"},
                "nonce": "1660055050000"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = post_json(
            &app,
            "/channels/FIAT/invoke",
            json!({
                "method": "emit",
                "args": ["user1", "1000"],
                "caller": {"address": "admin", "role": "admin"},
                "nonce": "12"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"], "incorrect nonce format");

        let (status, _) = post_json(
            &app,
            "/channels/FIAT/invoke",
            json!({
                "method": "commitCCTransferFrom",
                "args": ["missing"],
                "caller": {"address": "relay", "role": "relay"}
            }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

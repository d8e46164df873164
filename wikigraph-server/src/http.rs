//! wikigraph HTTP REST API
//!
//! Axum-based HTTP server exposing the graph document and its merge flows.
//! Runs alongside the Unix socket IPC server on port 5001 (configurable).
//!
//! Each endpoint has a thin axum handler that delegates to an inner function
//! returning `(StatusCode, body)`, so the inner functions are testable without
//! axum dispatch.
//!
//! Endpoints:
//! - GET  /api/get-graph: current graph document
//! - POST /api/add-node: add a topic node
//! - POST /api/expand-node: expand a topic with its Wikipedia links and summary
//! - POST /api/merge-links: merge a title and its related titles
//! - GET  /health: document status
//! - GET  /version: server version info

use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use wikigraph_core::ipc::{GraphRequest, PROTOCOL_VERSION};
use wikigraph_core::{GraphError, GraphStore, TopicSource, WikigraphConfig};

use crate::router;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<GraphStore>,
    pub source: Arc<dyn TopicSource>,
    pub config: WikigraphConfig,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/api/get-graph", get(get_graph_handler))
        .route("/api/add-node", post(add_node_handler))
        .route("/api/expand-node", post(expand_node_handler))
        .route("/api/merge-links", post(merge_links_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("wikigraph HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct AddNodeRequest {
    pub topic: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ExpandNodeRequest {
    pub topic: Option<String>,
    /// Id the client clicked; the topic name is authoritative.
    #[serde(rename = "nodeId")]
    pub node_id: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct MergeLinksRequest {
    pub title: Option<String>,
    pub related: Option<Vec<String>>,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Map a graph error to the HTTP status class it belongs to.
pub fn status_for(err: &GraphError) -> StatusCode {
    match err {
        GraphError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        GraphError::NotFound(_) => StatusCode::NOT_FOUND,
        GraphError::Upstream(_) => StatusCode::BAD_GATEWAY,
        GraphError::Persistence(_)
        | GraphError::Serialization(_)
        | GraphError::Integrity(_)
        | GraphError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_body(err: &GraphError) -> (StatusCode, serde_json::Value) {
    let status = status_for(err);
    if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
    }
    (status, serde_json::json!(ErrorResponse::new(err.to_string())))
}

fn missing_field(field: &str) -> (StatusCode, serde_json::Value) {
    (
        StatusCode::BAD_REQUEST,
        serde_json::json!(ErrorResponse::new(format!("No {} provided", field))),
    )
}

/// Unparsable request bodies get the same `{error, status}` shape as every other error.
fn rejection_body(rejection: &JsonRejection) -> (StatusCode, serde_json::Value) {
    tracing::debug!(error = %rejection.body_text(), "Rejected request body");
    (
        rejection.status(),
        serde_json::json!(ErrorResponse::new(rejection.body_text())),
    )
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn run(state: &HttpState, request: GraphRequest) -> (StatusCode, serde_json::Value) {
    match router::dispatch(request, &state.store, state.source.as_ref()).await {
        Ok(data) => (StatusCode::OK, data),
        Err(e) => error_body(&e),
    }
}

/// Inner get-graph: returns the current document (pure read).
pub async fn get_graph_inner(state: &HttpState) -> (StatusCode, serde_json::Value) {
    run(state, GraphRequest::GetGraph).await
}

/// Inner add-node: validates topic and adds it to the graph.
pub async fn add_node_inner(state: &HttpState, req: AddNodeRequest) -> (StatusCode, serde_json::Value) {
    let topic = match present(req.topic) {
        Some(t) => t,
        None => return missing_field("topic"),
    };
    run(state, GraphRequest::AddNode { topic }).await
}

/// Inner expand-node: validates topic, fetches from the producer and expands.
pub async fn expand_node_inner(
    state: &HttpState,
    req: ExpandNodeRequest,
) -> (StatusCode, serde_json::Value) {
    let topic = match present(req.topic) {
        Some(t) => t,
        None => return missing_field("topic"),
    };
    tracing::debug!(topic = %topic, node_id = ?req.node_id, "Expand requested");
    run(state, GraphRequest::ExpandNode { topic }).await
}

/// Inner merge-links: validates title and merges its related titles.
pub async fn merge_links_inner(
    state: &HttpState,
    req: MergeLinksRequest,
) -> (StatusCode, serde_json::Value) {
    let title = match present(req.title) {
        Some(t) => t,
        None => return missing_field("title"),
    };
    run(
        state,
        GraphRequest::MergeLinks {
            title,
            related: req.related,
        },
    )
    .await
}

/// Inner health: 200 with document counts, 503 when the document is unreadable.
pub async fn health_inner(state: &HttpState) -> (StatusCode, serde_json::Value) {
    match router::dispatch(GraphRequest::Health, &state.store, state.source.as_ref()).await {
        Ok(data) => (StatusCode::OK, data),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        ),
    }
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": PROTOCOL_VERSION,
    })
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

pub async fn get_graph_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = get_graph_inner(&state).await;
    (status, Json(body))
}

pub async fn add_node_handler(
    State(state): State<Arc<HttpState>>,
    payload: Result<Json<AddNodeRequest>, JsonRejection>,
) -> impl IntoResponse {
    let (status, body) = match payload {
        Ok(Json(req)) => add_node_inner(&state, req).await,
        Err(rejection) => rejection_body(&rejection),
    };
    (status, Json(body))
}

pub async fn expand_node_handler(
    State(state): State<Arc<HttpState>>,
    payload: Result<Json<ExpandNodeRequest>, JsonRejection>,
) -> impl IntoResponse {
    let (status, body) = match payload {
        Ok(Json(req)) => expand_node_inner(&state, req).await,
        Err(rejection) => rejection_body(&rejection),
    };
    (status, Json(body))
}

pub async fn merge_links_handler(
    State(state): State<Arc<HttpState>>,
    payload: Result<Json<MergeLinksRequest>, JsonRejection>,
) -> impl IntoResponse {
    let (status, body) = match payload {
        Ok(Json(req)) => merge_links_inner(&state, req).await,
        Err(rejection) => rejection_body(&rejection),
    };
    (status, Json(body))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct OfflineSource;

    #[async_trait]
    impl TopicSource for OfflineSource {
        async fn related_titles(&self, _title: &str) -> Result<Vec<String>, GraphError> {
            Err(GraphError::Upstream("Wikipedia unreachable".to_string()))
        }

        async fn summary(&self, _title: &str) -> Result<String, GraphError> {
            Err(GraphError::Upstream("Wikipedia unreachable".to_string()))
        }

        fn name(&self) -> &str {
            "offline"
        }
    }

    fn make_state() -> HttpState {
        HttpState {
            store: Arc::new(GraphStore::in_memory(50)),
            source: Arc::new(OfflineSource),
            config: WikigraphConfig::default(),
        }
    }

    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string(), "version must be string");
        assert_eq!(v["protocol"], "wikigraph/1");
    }

    #[test]
    fn test_status_for_error_classes() {
        assert_eq!(
            status_for(&GraphError::InvalidInput("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(&GraphError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&GraphError::Upstream("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_for(&GraphError::Integrity("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        assert_eq!(
            status_for(&GraphError::Persistence(io)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_add_node_inner_missing_topic() {
        let state = make_state();

        for topic in [None, Some("".to_string()), Some("   ".to_string())] {
            let (status, body) = add_node_inner(&state, AddNodeRequest { topic }).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["status"], "error");
            assert_eq!(body["error"], "No topic provided");
        }
        assert!(state.store.get_graph().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_node_inner_creates_then_reports_existing() {
        let state = make_state();

        let (status, body) = add_node_inner(
            &state,
            AddNodeRequest {
                topic: Some("Ethics".to_string()),
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created"], true);
        assert_eq!(body["nodeId"], 1);
        assert_eq!(body["message"], "Node added successfully");

        let (status, body) = add_node_inner(
            &state,
            AddNodeRequest {
                topic: Some("ETHICS".to_string()),
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created"], false);
        assert_eq!(body["message"], "Node already exists");
        assert_eq!(body["graph"]["nodes"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expand_node_inner_upstream_failure_is_502() {
        let state = make_state();
        let req = ExpandNodeRequest {
            topic: Some("Ethics".to_string()),
            node_id: Some(1),
        };

        let (status, body) = expand_node_inner(&state, req).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("unreachable"));
        assert!(state.store.get_graph().await.is_empty());
    }

    #[tokio::test]
    async fn test_merge_links_inner_with_supplied_related() {
        let state = make_state();
        let req = MergeLinksRequest {
            title: Some("Analytic Philosophy".to_string()),
            related: Some(vec!["Logic".to_string(), "Metaphysics".to_string()]),
        };

        let (status, body) = merge_links_inner(&state, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["nodes"].as_array().unwrap().len(), 3);
        assert_eq!(
            body["links"],
            serde_json::json!([
                {"source": 1, "target": 2, "label": ""},
                {"source": 1, "target": 3, "label": ""}
            ])
        );
    }

    #[tokio::test]
    async fn test_merge_links_inner_missing_title() {
        let state = make_state();
        let (status, body) = merge_links_inner(&state, MergeLinksRequest::default()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No title provided");
    }

    #[tokio::test]
    async fn test_health_inner_ok_on_empty_store() {
        let state = make_state();
        let (status, body) = health_inner(&state).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["nodes"], 0);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}

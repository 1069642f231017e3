//! REST API server for the support agent orchestrator
//!
//! Thin transport shell over the orchestrator: classification endpoint,
//! session management, statistics and the sweep trigger.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::error::OrchestrationError;
use crate::memory::DEFAULT_SWEEP_MAX_IDLE;
use crate::orchestrator::Orchestrator;
use crate::taxonomy::{AgentKind, Category};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClassifyRequest {
    pub message: String,
    #[serde(default = "default_session_id")]
    pub session_id: String,
}

fn default_session_id() -> String {
    "default_session".to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct SweepRequest {
    pub max_idle_seconds: Option<u64>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let stats = state.orchestrator.stats().await.ok();

    Json(serde_json::json!({
        "status": "healthy",
        "checks": {
            "orchestrator": "operational",
            "detection_engine": "ready",
            "session_store": "ready",
        },
        "stats": stats,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// =============================
/// Classification Endpoint
/// =============================

async fn classify(
    State(state): State<ApiState>,
    Json(req): Json<ClassifyRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if let Err(error) = Orchestrator::validate_message(&req.message) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(error.to_string())),
        );
    }

    let bundle = state.orchestrator.classify(&req.message, &req.session_id).await;

    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({
            "session_id": req.session_id,
            "classification": bundle,
        }))),
    )
}

/// =============================
/// Statistics & Catalog Endpoints
/// =============================

async fn stats(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.stats().await {
        Ok(stats) => (StatusCode::OK, Json(ApiResponse::success(stats))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Failed to get stats: {}", e))),
        ),
    }
}

async fn list_agents() -> Json<ApiResponse> {
    let agents: Vec<_> = AgentKind::ALL
        .iter()
        .map(|agent| {
            serde_json::json!({
                "agent": agent,
                "specialization": agent.specialization(),
            })
        })
        .collect();

    Json(ApiResponse::success(serde_json::json!({
        "agents": agents,
        "total_agents": AgentKind::ALL.len(),
    })))
}

async fn list_categories(State(state): State<ApiState>) -> Json<ApiResponse> {
    let taxonomy = state.orchestrator.taxonomy();
    let categories: Vec<_> = Category::ALL
        .iter()
        .map(|category| {
            serde_json::json!({
                "category": category,
                "description": taxonomy.description(*category),
                "priority": taxonomy.tier(*category),
                "keywords_count": taxonomy.keywords(*category).len(),
                "agent": taxonomy.agent_for(*category),
            })
        })
        .collect();

    Json(ApiResponse::success(serde_json::json!({
        "categories": categories,
        "total_categories": Category::ALL.len(),
    })))
}

/// =============================
/// Session Management Endpoints
/// =============================

async fn clear_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.clear_session(&session_id).await {
        Ok(true) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "session_id": session_id,
                "cleared": true,
            }))),
        ),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Session {} not found", session_id))),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Failed to clear session: {}", e))),
        ),
    }
}

async fn export_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.export_session(&session_id).await {
        Ok(Some(export)) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "session_id": session_id,
                "data": export,
            }))),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Session {} not found", session_id))),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Failed to export session: {}", e))),
        ),
    }
}

async fn import_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Json(blob): Json<serde_json::Value>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.import_session(&session_id, blob).await {
        Ok(true) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "session_id": session_id,
                "imported": true,
            }))),
        ),
        Ok(false) | Err(OrchestrationError::SerializationError(_)) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Invalid session data".to_string())),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Failed to import session: {}", e))),
        ),
    }
}

/// =============================
/// Sweep Trigger
/// =============================

async fn sweep(
    State(state): State<ApiState>,
    body: Option<Json<SweepRequest>>,
) -> (StatusCode, Json<ApiResponse>) {
    let Json(req) = body.unwrap_or_default();
    let max_idle = req
        .max_idle_seconds
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_SWEEP_MAX_IDLE);

    match state.orchestrator.sweep_inactive(max_idle).await {
        Ok(removed) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "removed": removed,
                "max_idle_seconds": max_idle.as_secs(),
            }))),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Sweep failed: {}", e))),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/classify", post(classify))
        .route("/stats", get(stats))
        .route("/agents", get(list_agents))
        .route("/categories", get(list_categories))
        .route("/sessions/:session_id/clear", post(clear_session))
        .route("/sessions/:session_id/export", get(export_session))
        .route("/sessions/:session_id/import", post(import_session))
        .route("/sweep", post(sweep))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

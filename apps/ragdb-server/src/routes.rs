use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use ragdb_admin::{PermissionMatrix, PermissionMatrixService};
use ragdb_core::types::DocumentChunk;
use ragdb_core::Error;
use ragdb_hybrid::{QueryRequest, QueryResponse, RagService};

use crate::error::AppError;

const ROLE_HEADER: &str = "x-user-role";

#[derive(Clone)]
pub struct AppState {
    pub rag: Arc<RagService>,
    pub admin: Arc<PermissionMatrixService>,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
pub struct UpsertRequest {
    #[serde(default)]
    pub docs: Vec<DocumentChunk>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpsertResponse {
    pub rows: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/rag/upsert", post(upsert_handler))
        .route("/rag/query", post(query_handler))
        .route("/admin/settings", get(get_settings_handler).post(update_settings_handler))
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn upsert_handler(State(state): State<AppState>, Json(request): Json<UpsertRequest>) -> Result<Json<UpsertResponse>, AppError> {
    let rows = state.rag.upsert(request.docs).await?;
    Ok(Json(UpsertResponse { rows }))
}

async fn query_handler(State(state): State<AppState>, Json(request): Json<QueryRequest>) -> Result<Json<QueryResponse>, AppError> {
    let outcome = tokio::time::timeout(state.request_timeout, state.rag.query(request))
        .await
        .map_err(|_| Error::Timeout(format!("query exceeded {}s", state.request_timeout.as_secs())))??;
    Ok(Json(outcome.into_response()))
}

fn authorize(headers: &HeaderMap) -> Result<(), AppError> {
    let role = headers
        .get(ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_lowercase())
        .unwrap_or_default();
    match role.as_str() {
        "admin" | "operator" => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

async fn get_settings_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<PermissionMatrix>, AppError> {
    authorize(&headers)?;
    Ok(Json(state.admin.get().await?))
}

async fn update_settings_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(matrix): Json<PermissionMatrix>,
) -> Result<Json<PermissionMatrix>, AppError> {
    authorize(&headers)?;
    Ok(Json(state.admin.update(matrix).await?))
}

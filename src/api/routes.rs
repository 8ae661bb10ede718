//! Axum router for the control API (§6 table): Start/Status/Cancel/Accept-and-background.

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::model::{BatchConfig, CheckpointConfig};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tower_http::trace::TraceLayer;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/scrape/batch/start", post(start_batch))
        .route("/scrape/batch/status", get(batch_status))
        .route("/scrape/batch/cancel", post(cancel_batch))
        .route("/scrape/company", post(accept_company))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct StartBatchRequest {
    limit: Option<u64>,
    worker_count: Option<u32>,
    flush_size: Option<usize>,
    instances: Option<u32>,
    #[serde(default)]
    status_filter: Vec<String>,
    /// Presence turns on periodic checkpoint persistence for this batch (§4.9a); absent
    /// by default.
    checkpoint_path: Option<PathBuf>,
    checkpoint_interval_secs: Option<u64>,
}

async fn start_batch(
    State(state): State<AppState>,
    Json(req): Json<StartBatchRequest>,
) -> Result<Json<Value>, ApiError> {
    let defaults = BatchConfig::default();
    let config = BatchConfig {
        limit: req.limit,
        worker_count: req.worker_count.unwrap_or(defaults.worker_count),
        flush_size: req.flush_size.unwrap_or(defaults.flush_size),
        instances: req.instances.unwrap_or(defaults.instances),
        status_filter: if req.status_filter.is_empty() { defaults.status_filter } else { req.status_filter },
        checkpoint: req.checkpoint_path.map(|path| CheckpointConfig {
            path,
            interval: Duration::from_secs(req.checkpoint_interval_secs.unwrap_or(30)),
        }),
    };

    let response = state.batch_processor.start(config).await?;
    Ok(Json(json!({
        "success": true,
        "batch_id": response.batch_id,
        "total_companies": response.total_companies,
    })))
}

async fn batch_status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match state.batch_processor.status().await {
        Some(snapshot) => Ok(Json(serde_json::to_value(snapshot).unwrap_or(Value::Null))),
        None => Err(ApiError::NotFound("no active batch".to_string())),
    }
}

async fn cancel_batch(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.batch_processor.cancel().await?;
    Ok(Json(json!({ "success": true, "message": "batch cancelled, draining buffer" })))
}

#[derive(Debug, Deserialize)]
struct AcceptCompanyRequest {
    cnpj: String,
}

async fn accept_company(
    State(state): State<AppState>,
    Json(req): Json<AcceptCompanyRequest>,
) -> Result<Json<Value>, ApiError> {
    state.job_queue.enqueue(req.cnpj).map_err(ApiError::Internal)?;
    Ok(Json(json!({ "success": true, "message": "accepted", "status": "accepted" })))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "job_queue_depth": state.job_queue.depth() }))
}

//! Margin API
//!
//! - GET /api/margin/status/:client_id - Evaluate a client's margin now
//! - POST /api/margin - Create or replace a client's margin record

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::api::extract::{ApiJson, ApiPath};
use crate::error::Result;
use crate::services::blocking;
use crate::types::{MarginStatus, UpdateMarginRequest};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(update_margin))
        .route("/status/:client_id", get(margin_status))
}

#[derive(Debug, Serialize)]
pub struct MarginStatusResponse {
    pub client_id: i64,
    pub evaluated_at: i64,
    #[serde(flatten)]
    pub status: MarginStatus,
}

async fn margin_status(
    State(state): State<AppState>,
    ApiPath(client_id): ApiPath<i64>,
) -> Result<Json<MarginStatusResponse>> {
    let margin = state.margin.clone();
    let evaluation = blocking(move || margin.status(client_id)).await?;

    Ok(Json(MarginStatusResponse {
        client_id: evaluation.client_id,
        evaluated_at: evaluation.evaluated_at,
        status: evaluation.status,
    }))
}

async fn update_margin(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<UpdateMarginRequest>,
) -> Result<Json<Value>> {
    let client_id = request.client_id;
    let margin = state.margin.clone();
    blocking(move || margin.update_margin(request)).await?;

    Ok(Json(json!({
        "message": "Margin updated",
        "client_id": client_id,
    })))
}

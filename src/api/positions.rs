//! Positions API
//!
//! - GET /api/positions/:client_id - List a client's positions
//! - POST /api/positions - Enter a trade (overwrites an existing lot)
//! - PUT /api/positions/:id - Amend quantity and cost basis
//! - DELETE /api/positions/:id?clientId= - Liquidate a position

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::api::extract::{ApiJson, ApiPath, ApiQuery};
use crate::error::{AppError, Result};
use crate::services::{blocking, PositionStore};
use crate::types::{normalize_symbol, CreatePositionRequest, Position, UpdatePositionRequest};
use crate::AppState;

pub fn router() -> Router<AppState> {
    // GET takes a client id, PUT and DELETE take a position id.
    Router::new().route("/", post(create_position)).route(
        "/:id",
        get(list_positions)
            .put(update_position)
            .delete(delete_position),
    )
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    #[serde(rename = "clientId")]
    pub client_id: i64,
}

fn validate_cost_basis(cost_basis: f64) -> Result<()> {
    if cost_basis.is_finite() && cost_basis >= 0.0 {
        Ok(())
    } else {
        Err(AppError::BadRequest(
            "cost_basis must be a non-negative number".to_string(),
        ))
    }
}

fn position_not_found(id: i64, client_id: i64) -> AppError {
    AppError::NotFound(format!("position {} not found for client {}", id, client_id))
}

async fn list_positions(
    State(state): State<AppState>,
    ApiPath(client_id): ApiPath<i64>,
) -> Result<Json<Vec<Position>>> {
    let store = state.store.clone();
    let positions = blocking(move || Ok(store.list_by_client(client_id)?)).await?;
    Ok(Json(positions))
}

async fn create_position(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreatePositionRequest>,
) -> Result<(StatusCode, Json<Position>)> {
    let symbol = normalize_symbol(&request.symbol).ok_or_else(|| {
        AppError::BadRequest(format!(
            "invalid symbol {:?}: use letters, digits, '.' or '-'",
            request.symbol
        ))
    })?;
    validate_cost_basis(request.cost_basis)?;

    let store = state.store.clone();
    let position = blocking(move || {
        Ok(store.create_position(
            request.client_id,
            &symbol,
            request.quantity,
            request.cost_basis,
        )?)
    })
    .await?;

    info!(
        "Client {} position {} {} x{}",
        position.client_id, position.id, position.symbol, position.quantity
    );
    Ok((StatusCode::CREATED, Json(position)))
}

async fn update_position(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<UpdatePositionRequest>,
) -> Result<Json<Position>> {
    validate_cost_basis(request.cost_basis)?;
    let client_id = request.client_id;

    let store = state.store.clone();
    blocking(move || {
        Ok(store.update_position(id, client_id, request.quantity, request.cost_basis)?)
    })
    .await?
    .map(Json)
    .ok_or_else(|| position_not_found(id, client_id))
}

async fn delete_position(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(params): ApiQuery<DeleteParams>,
) -> Result<Json<Value>> {
    let client_id = params.client_id;
    let store = state.store.clone();
    if !blocking(move || Ok(store.delete_position(id, client_id)?)).await? {
        return Err(position_not_found(id, client_id));
    }

    info!("Client {} liquidated position {}", client_id, id);
    Ok(Json(json!({ "message": "Position liquidated", "id": id })))
}

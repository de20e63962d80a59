//! Market data API
//!
//! - GET /api/market-data/:symbol - Latest fresh price for a symbol
//! - POST /api/market-data - Manually record a price

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::info;

use crate::api::extract::{ApiJson, ApiPath};
use crate::error::{AppError, Result};
use crate::services::{blocking, PriceStore};
use crate::types::{freshness_cutoff, normalize_symbol, MarketPrice, UpdatePriceRequest};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(update_price))
        .route("/:symbol", get(get_price))
}

fn parse_symbol(symbol: &str) -> Result<String> {
    normalize_symbol(symbol).ok_or_else(|| {
        AppError::BadRequest(format!(
            "invalid symbol {:?}: use letters, digits, '.' or '-'",
            symbol
        ))
    })
}

async fn get_price(
    State(state): State<AppState>,
    ApiPath(symbol): ApiPath<String>,
) -> Result<Json<MarketPrice>> {
    let symbol = parse_symbol(&symbol)?;

    let now = chrono::Utc::now().timestamp_millis();
    let fresh_since = freshness_cutoff(now, state.margin.freshness());

    let store = state.store.clone();
    let lookup = symbol.clone();
    blocking(move || Ok(store.current_price(&lookup, fresh_since)?))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no fresh price for {}", symbol)))
}

async fn update_price(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<UpdatePriceRequest>,
) -> Result<Json<Value>> {
    let symbol = parse_symbol(&request.symbol)?;
    let price = request.current_price;
    if !price.is_finite() || price <= 0.0 {
        return Err(AppError::BadRequest(
            "current_price must be a positive number".to_string(),
        ));
    }

    let observed_at = chrono::Utc::now().timestamp_millis();
    let store = state.store.clone();
    let stored = symbol.clone();
    blocking(move || Ok(store.upsert_price(&stored, price, observed_at)?)).await?;

    info!("Manual price update {} = {}", symbol, price);
    Ok(Json(json!({
        "message": "Market data updated",
        "symbol": symbol,
        "current_price": price,
        "observed_at": observed_at,
    })))
}

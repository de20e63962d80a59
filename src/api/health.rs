use crate::services::blocking;
use crate::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tracing::error;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    database: &'static str,
}

impl HealthResponse {
    fn new(database_ok: bool) -> (StatusCode, Self) {
        let (code, status, database) = if database_ok {
            (StatusCode::OK, "ok", "ok")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unavailable")
        };
        (
            code,
            Self {
                status,
                version: env!("CARGO_PKG_VERSION"),
                database,
            },
        )
    }
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store = state.store.clone();
    let database_ok = match blocking(move || Ok(store.ping()?)).await {
        Ok(()) => true,
        Err(e) => {
            error!("Health check database ping failed: {}", e);
            false
        }
    };
    let (code, response) = HealthResponse::new(database_ok);
    (code, Json(response))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/health", get(health))
}

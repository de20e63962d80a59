use crate::services::RateDecision;
use crate::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::debug;

/// Per-IP request limiting. Requests without connection info share one bucket.
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    match state.rate_limiter.check(&ip) {
        RateDecision::Allowed { .. } => next.run(req).await,
        RateDecision::Limited { retry_after } => {
            debug!("Rate limited {} for {:?}", ip, retry_after);
            let retry_secs = retry_after.as_secs().max(1).to_string();
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_secs)],
                Json(json!({
                    "error": "Rate limit exceeded",
                    "status": StatusCode::TOO_MANY_REQUESTS.as_u16(),
                })),
            )
                .into_response()
        }
    }
}

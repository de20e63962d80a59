//! HTTP API tests

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use minirisk::config::Config;
use minirisk::services::{PositionStore, PriceStore, SqliteStore};
use minirisk::{api, AppState};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("MARKET_DATA_API_URL".to_string(), "http://quotes.invalid".to_string()),
        ("MARKET_DATA_API_KEY".to_string(), "test-key".to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

fn setup(overrides: &[(&str, &str)]) -> (Router, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    let state = AppState::new(test_config(overrides), store.clone());
    (api::app(state), store)
}

fn now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let (app, _) = setup(&[]);
    let (status, body) = send(&app, Method::GET, "/api/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

// =============================================================================
// Market data
// =============================================================================

#[tokio::test]
async fn test_price_roundtrip_normalizes_symbol() {
    let (app, _) = setup(&[]);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/market-data",
        Some(json!({ "symbol": " aapl ", "current_price": 150.25 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::GET, "/api/market-data/AAPL", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["symbol"], "AAPL");
    assert_eq!(body["current_price"], 150.25);
}

#[tokio::test]
async fn test_unknown_or_stale_price_is_not_found() {
    let (app, store) = setup(&[]);
    store
        .upsert_price("OLD", 10.0, now() - 10 * 60 * 1000)
        .unwrap();

    let (status, body) = send(&app, Method::GET, "/api/market-data/NOPE", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);

    let (status, _) = send(&app, Method::GET, "/api/market-data/OLD", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejects_invalid_price() {
    let (app, _) = setup(&[]);
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/market-data",
        Some(json!({ "symbol": "AAPL", "current_price": 0.0 })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
}

// =============================================================================
// Positions
// =============================================================================

#[tokio::test]
async fn test_position_lifecycle() {
    let (app, _) = setup(&[]);

    let (status, created) = send(
        &app,
        Method::POST,
        "/api/positions",
        Some(json!({ "client_id": 7, "symbol": "msft", "quantity": 3, "cost_basis": 1200.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["symbol"], "MSFT");
    let id = created["id"].as_i64().unwrap();

    let (status, updated) = send(
        &app,
        Method::PUT,
        &format!("/api/positions/{}", id),
        Some(json!({ "client_id": 7, "quantity": 5, "cost_basis": 2000.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["quantity"], 5);

    let (status, list) = send(&app, Method::GET, "/api/positions/7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    // Another client cannot liquidate the lot.
    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/positions/{}?clientId=8", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/positions/{}?clientId=7", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, list) = send(&app, Method::GET, "/api/positions/7", None).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_update_unknown_position() {
    let (app, _) = setup(&[]);
    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/positions/999",
        Some(json!({ "client_id": 1, "quantity": 1, "cost_basis": 1.0 })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_position_rejects_blank_symbol() {
    let (app, store) = setup(&[]);
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/positions",
        Some(json!({ "client_id": 1, "symbol": "  ", "quantity": 1, "cost_basis": 1.0 })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(store.distinct_clients().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_position_rejects_url_characters() {
    let (app, store) = setup(&[]);

    for symbol in ["AAPL#X", "AAPL?a=1", "A/B"] {
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/positions",
            Some(json!({ "client_id": 1, "symbol": symbol, "quantity": 1, "cost_basis": 1.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", symbol);
        assert_eq!(body["status"], 400);
    }
    assert!(store.distinct_symbols().unwrap().is_empty());
}

// =============================================================================
// Malformed requests
// =============================================================================

#[tokio::test]
async fn test_malformed_body_returns_json_error() {
    let (app, _) = setup(&[]);
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/positions",
        Some(json!({ "client_id": "x" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid request data"));
}

#[tokio::test]
async fn test_missing_content_type_returns_json_error() {
    let (app, _) = setup(&[]);
    let response = app
        .oneshot(
            Request::post("/api/margin")
                .body(Body::from(r#"{"client_id":1}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn test_bad_path_and_query_return_json_errors() {
    let (app, _) = setup(&[]);

    let (status, body) = send(&app, Method::GET, "/api/margin/status/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid path"));

    let (status, body) = send(&app, Method::GET, "/api/positions/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);

    let (status, body) = send(&app, Method::DELETE, "/api/positions/1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid query"));
}

// =============================================================================
// Margin
// =============================================================================

#[tokio::test]
async fn test_margin_status() {
    let (app, store) = setup(&[]);
    store.create_position(1, "AAPL", 10, 1400.0).unwrap();
    store.upsert_price("AAPL", 150.0, now()).unwrap();

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/margin",
        Some(json!({
            "client_id": 1,
            "loan_amount": 1400.0,
            "initial_margin": 0.5,
            "maintenance_margin": 0.25,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::GET, "/api/margin/status/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["client_id"], 1);
    assert_eq!(body["portfolio_value"], 1500.0);
    assert_eq!(body["net_equity"], 100.0);
    assert_eq!(body["margin_shortfall"], 275.0);
    assert_eq!(body["margin_call"], true);
}

#[tokio::test]
async fn test_margin_status_without_record() {
    let (app, store) = setup(&[]);
    store.create_position(2, "AAPL", 10, 1400.0).unwrap();

    let (status, body) = send(&app, Method::GET, "/api/margin/status/2", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("client 2"));
}

#[tokio::test]
async fn test_margin_update_validation() {
    let (app, _) = setup(&[]);
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/margin",
        Some(json!({
            "client_id": 1,
            "loan_amount": 100.0,
            "initial_margin": 0.5,
            "maintenance_margin": 1.5,
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("maintenance_margin"));
}

// =============================================================================
// Middleware
// =============================================================================

#[tokio::test]
async fn test_rate_limit() {
    let (app, _) = setup(&[("RATE_LIMIT_PER_MINUTE", "2")]);

    for _ in 0..2 {
        let (status, _) = send(&app, Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn test_cors_allows_configured_origin() {
    let (app, _) = setup(&[("CORS_ALLOWED_ORIGINS", "https://desk.example.com")]);

    let response = app
        .oneshot(
            Request::get("/api/health")
                .header(header::ORIGIN, "https://desk.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://desk.example.com"
    );
}

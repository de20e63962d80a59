//! minirisk - brokerage back-office service for positions, market prices and
//! margin monitoring.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod sources;
pub mod types;

use config::Config;
use services::{MarginService, RateLimiter, SqliteStore};
use std::net::IpAddr;
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<SqliteStore>,
    pub margin: Arc<MarginService>,
    pub rate_limiter: Arc<RateLimiter<IpAddr>>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<SqliteStore>) -> Self {
        let margin = Arc::new(MarginService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            config.margin.price_freshness,
        ));
        let rate_limiter = Arc::new(RateLimiter::per_minute(config.rate_limit_per_minute));

        Self {
            config: Arc::new(config),
            store,
            margin,
            rate_limiter,
        }
    }
}

// Re-export commonly used types
pub use error::{AppError, Result};
pub use types::*;

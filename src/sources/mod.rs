pub mod market_api;

pub use market_api::{ClientError, MarketDataClient};

use async_trait::async_trait;
use thiserror::Error;

/// Failure fetching one symbol's quote.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("request for {symbol} timed out")]
    Timeout { symbol: String },
    #[error("request for {symbol} failed: {message}")]
    Transport { symbol: String, message: String },
    #[error("quote API returned {status} for {symbol}")]
    Status { symbol: String, status: u16 },
    #[error("malformed quote for {symbol}: {message}")]
    Malformed { symbol: String, message: String },
}

/// Upstream price source. One call per symbol, no batching.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote(&self, symbol: &str) -> Result<f64, QuoteError>;
}

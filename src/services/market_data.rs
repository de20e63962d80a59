//! Market data refresher.
//!
//! Each tick discovers every symbol held by any client, fetches one quote per
//! symbol and upserts it. A failure for one symbol is logged and skipped.

use crate::services::scheduler::{Job, TickReport};
use crate::services::stores::{blocking, PositionStore, PriceStore};
use crate::sources::QuoteSource;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolOutcome {
    Updated,
    FetchFailed,
    StoreFailed,
}

/// Keeps the market price store fresh for all held symbols.
pub struct MarketDataRefresher {
    positions: Arc<dyn PositionStore>,
    prices: Arc<dyn PriceStore>,
    source: Arc<dyn QuoteSource>,
    fetch_timeout: Duration,
    max_concurrent: usize,
}

impl MarketDataRefresher {
    pub fn new(
        positions: Arc<dyn PositionStore>,
        prices: Arc<dyn PriceStore>,
        source: Arc<dyn QuoteSource>,
        fetch_timeout: Duration,
        max_concurrent: usize,
    ) -> Self {
        Self {
            positions,
            prices,
            source,
            fetch_timeout,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Fetch and store one symbol. The upsert always follows its own fetch.
    async fn refresh_symbol(&self, symbol: String) -> SymbolOutcome {
        let fetch = tokio::time::timeout(self.fetch_timeout, self.source.quote(&symbol));
        let price = match fetch.await {
            Ok(Ok(price)) => price,
            Ok(Err(e)) => {
                warn!(symbol = %symbol, "Failed to fetch quote: {}", e);
                return SymbolOutcome::FetchFailed;
            }
            Err(_) => {
                warn!(symbol = %symbol, "Quote request timed out after {:?}", self.fetch_timeout);
                return SymbolOutcome::FetchFailed;
            }
        };

        let observed_at = chrono::Utc::now().timestamp_millis();
        let prices = self.prices.clone();
        let stored = symbol.clone();
        match blocking(move || Ok(prices.upsert_price(&stored, price, observed_at)?)).await {
            Ok(()) => {
                debug!("Updated market data for {}: {}", symbol, price);
                SymbolOutcome::Updated
            }
            Err(e) => {
                warn!(symbol = %symbol, "Failed to store market data: {}", e);
                SymbolOutcome::StoreFailed
            }
        }
    }

    /// One full discovery, fetch and upsert pass.
    pub async fn refresh(&self) -> TickReport {
        let mut report = TickReport::begin(self.name());

        let positions = self.positions.clone();
        let symbols = match blocking(move || Ok(positions.distinct_symbols()?)).await {
            Ok(symbols) => symbols,
            Err(e) => {
                error!("Failed to discover tracked symbols: {}", e);
                report.discovery_error = Some(e.to_string());
                return report.finish();
            }
        };
        report.attempted = symbols.len();

        let outcomes: Vec<SymbolOutcome> = stream::iter(symbols)
            .map(|symbol| self.refresh_symbol(symbol))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        report.succeeded = outcomes
            .iter()
            .filter(|o| **o == SymbolOutcome::Updated)
            .count();
        report.failed = report.attempted - report.succeeded;

        let store_failures = outcomes
            .iter()
            .filter(|o| **o == SymbolOutcome::StoreFailed)
            .count();
        if store_failures > 0 {
            warn!("{} fetched prices could not be stored", store_failures);
        }

        report.finish()
    }
}

#[async_trait]
impl Job for MarketDataRefresher {
    fn name(&self) -> &'static str {
        "market data refresh"
    }

    async fn tick(&self) -> TickReport {
        self.refresh().await
    }
}

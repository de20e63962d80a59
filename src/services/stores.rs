//! Persistence seams used by the margin pipeline.
//!
//! Each call is its own atomic unit; callers never rely on cross-statement
//! atomicity. Store calls block, so async code runs them through [`blocking`].

use crate::error::{AppError, Result};
use crate::types::{MarginRecord, MarketPrice, Position, PriceMap};

pub type StoreResult<T> = std::result::Result<T, rusqlite::Error>;

/// Run blocking store work on the blocking thread pool.
pub async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::Internal(format!("store task failed: {}", e)))?
}

/// Durable client positions.
pub trait PositionStore: Send + Sync {
    fn list_by_client(&self, client_id: i64) -> StoreResult<Vec<Position>>;

    /// Distinct symbols held by any client.
    fn distinct_symbols(&self) -> StoreResult<Vec<String>>;

    /// Distinct clients holding at least one position.
    fn distinct_clients(&self) -> StoreResult<Vec<i64>>;

    /// Enter a lot, overwriting quantity and cost basis if the client already
    /// holds the symbol.
    fn create_position(
        &self,
        client_id: i64,
        symbol: &str,
        quantity: i64,
        cost_basis: f64,
    ) -> StoreResult<Position>;

    /// Amend a lot. Returns `None` when no lot with that id belongs to the client.
    fn update_position(
        &self,
        id: i64,
        client_id: i64,
        quantity: i64,
        cost_basis: f64,
    ) -> StoreResult<Option<Position>>;

    /// Remove a lot. Returns whether a row was deleted.
    fn delete_position(&self, id: i64, client_id: i64) -> StoreResult<bool>;
}

/// Latest market prices.
///
/// Both read paths apply the same freshness rule: observations older than
/// `fresh_since` (epoch milliseconds) are treated as absent.
pub trait PriceStore: Send + Sync {
    fn current_price(&self, symbol: &str, fresh_since: i64) -> StoreResult<Option<MarketPrice>>;

    fn current_prices(&self, symbols: &[String], fresh_since: i64) -> StoreResult<PriceMap>;

    fn upsert_price(&self, symbol: &str, price: f64, observed_at: i64) -> StoreResult<()>;
}

/// Per-client loan and margin parameters.
pub trait MarginStore: Send + Sync {
    fn margin_for_client(&self, client_id: i64) -> StoreResult<Option<MarginRecord>>;

    fn upsert_margin(&self, record: &MarginRecord) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blocking_returns_work_result() {
        assert_eq!(blocking(|| Ok(42)).await.unwrap(), 42);

        let err = blocking::<(), _>(|| Err(AppError::NotFound("client 3".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(msg) if msg == "client 3"));
    }

    #[tokio::test]
    async fn test_blocking_panic_becomes_internal_error() {
        let err = blocking::<(), _>(|| panic!("store crashed")).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}

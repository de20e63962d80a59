use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default maximum age of a price observation used for valuation.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Latest observed price for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPrice {
    pub symbol: String,
    pub current_price: f64,
    /// Observation time (epoch milliseconds).
    pub observed_at: i64,
}

/// Symbol to price lookup handed to the margin evaluator.
pub type PriceMap = HashMap<String, f64>;

/// Request body for a manual price update.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePriceRequest {
    pub symbol: String,
    pub current_price: f64,
}

/// Earliest `observed_at` still considered fresh at `as_of`.
pub fn freshness_cutoff(as_of: i64, window: Duration) -> i64 {
    let window = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
    as_of.saturating_sub(window)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freshness_cutoff() {
        assert_eq!(freshness_cutoff(600_000, Duration::from_secs(300)), 300_000);
        assert_eq!(freshness_cutoff(600_000, DEFAULT_FRESHNESS_WINDOW), 300_000);
    }

    #[test]
    fn test_freshness_cutoff_saturates() {
        let huge = Duration::from_secs(5_000_000_000_000 * 3600);
        assert_eq!(freshness_cutoff(1_700_000_000_000, huge), 1_700_000_000_000 - i64::MAX);
        assert_eq!(freshness_cutoff(i64::MIN + 10, Duration::from_secs(1)), i64::MIN);
    }
}

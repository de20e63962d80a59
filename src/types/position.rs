use serde::{Deserialize, Serialize};

/// A client's holding of a single symbol.
///
/// A client holds at most one lot per symbol; amending the lot overwrites
/// quantity and cost basis instead of appending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: i64,
    pub client_id: i64,
    pub symbol: String,
    /// Signed share count (negative for short lots).
    pub quantity: i64,
    /// Total amount paid for the lot.
    pub cost_basis: f64,
    /// Creation time (epoch milliseconds).
    pub created_at: i64,
    /// Last amendment time (epoch milliseconds).
    pub updated_at: i64,
}

/// Request body for entering a trade.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePositionRequest {
    pub client_id: i64,
    pub symbol: String,
    pub quantity: i64,
    pub cost_basis: f64,
}

/// Request body for amending an existing lot.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePositionRequest {
    pub client_id: i64,
    pub quantity: i64,
    pub cost_basis: f64,
}

/// Normalize a ticker symbol for storage and lookup.
///
/// Symbols are limited to ASCII letters, digits, `.` and `-`. Returns `None`
/// for anything else, including an empty symbol.
pub fn normalize_symbol(symbol: &str) -> Option<String> {
    let trimmed = symbol.trim();
    let valid = trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if trimmed.is_empty() || !valid {
        None
    } else {
        Some(trimmed.to_ascii_uppercase())
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Loan and margin parameters for a client. One record per client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginRecord {
    pub client_id: i64,
    /// Outstanding borrowed amount, never negative.
    pub loan_amount: f64,
    /// Fraction required at trade entry. Not used by the status calculation.
    pub initial_margin: f64,
    /// Fraction of portfolio value that must be held as equity.
    pub maintenance_margin: f64,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

/// Request body for a margin record upsert.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMarginRequest {
    pub client_id: i64,
    pub loan_amount: f64,
    pub initial_margin: f64,
    pub maintenance_margin: f64,
}

impl UpdateMarginRequest {
    /// Check the record invariants before it reaches the store.
    pub fn validate(&self) -> Result<(), String> {
        if !self.loan_amount.is_finite() || self.loan_amount < 0.0 {
            return Err(format!(
                "loan_amount must be a non-negative number, got {}",
                self.loan_amount
            ));
        }
        if !is_rate(self.initial_margin) {
            return Err(format!(
                "initial_margin must be a fraction in [0, 1], got {}",
                self.initial_margin
            ));
        }
        if !is_rate(self.maintenance_margin) {
            return Err(format!(
                "maintenance_margin must be a fraction in [0, 1], got {}",
                self.maintenance_margin
            ));
        }
        Ok(())
    }
}

fn is_rate(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

/// Derived collateral position of a client. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginStatus {
    pub portfolio_value: f64,
    pub net_equity: f64,
    pub margin_shortfall: f64,
    pub margin_call: bool,
}

/// Alert event raised by the margin sweep for an under-collateralized client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginAlert {
    pub id: Uuid,
    pub client_id: i64,
    pub portfolio_value: f64,
    pub net_equity: f64,
    pub margin_shortfall: f64,
    /// Evaluation time (epoch milliseconds).
    pub at: i64,
}

impl MarginAlert {
    pub fn new(client_id: i64, status: &MarginStatus, at: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            portfolio_value: status.portfolio_value,
            net_equity: status.net_equity,
            margin_shortfall: status.margin_shortfall,
            at,
        }
    }
}

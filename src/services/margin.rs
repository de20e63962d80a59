//! Margin evaluation.
//!
//! [`evaluate`] is a pure valuation of a client's positions at a price map.
//! [`MarginService`] loads the consistent snapshot it needs from the stores.

use crate::error::{AppError, Result};
use crate::services::stores::{MarginStore, PositionStore, PriceStore};
use crate::types::{
    freshness_cutoff, MarginRecord, MarginStatus, Position, PriceMap, UpdateMarginRequest,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Compute the margin status of a client.
///
/// Positions whose symbol is missing from `prices` contribute nothing.
/// A client without a margin record is an error: treating it as fully
/// margined would hide a data problem.
pub fn evaluate(
    client_id: i64,
    positions: &[Position],
    prices: &PriceMap,
    margin: Option<&MarginRecord>,
) -> Result<MarginStatus> {
    let margin = margin
        .ok_or_else(|| AppError::NotFound(format!("no margin record for client {}", client_id)))?;

    let portfolio_value: f64 = positions
        .iter()
        .filter_map(|p| prices.get(&p.symbol).map(|price| p.quantity as f64 * price))
        .sum();

    let net_equity = portfolio_value - margin.loan_amount;
    let required_margin = portfolio_value * margin.maintenance_margin;
    let margin_shortfall = required_margin - net_equity;

    Ok(MarginStatus {
        portfolio_value,
        net_equity,
        margin_shortfall,
        margin_call: margin_shortfall > 0.0,
    })
}

/// A client's margin status together with its evaluation time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub client_id: i64,
    pub status: MarginStatus,
    /// Evaluation time (epoch milliseconds).
    pub evaluated_at: i64,
}

/// Loads snapshots from the stores and evaluates them.
pub struct MarginService {
    positions: Arc<dyn PositionStore>,
    prices: Arc<dyn PriceStore>,
    margins: Arc<dyn MarginStore>,
    freshness: Duration,
}

impl MarginService {
    pub fn new(
        positions: Arc<dyn PositionStore>,
        prices: Arc<dyn PriceStore>,
        margins: Arc<dyn MarginStore>,
        freshness: Duration,
    ) -> Self {
        Self {
            positions,
            prices,
            margins,
            freshness,
        }
    }

    /// Price freshness window applied to valuation.
    pub fn freshness(&self) -> Duration {
        self.freshness
    }

    /// Evaluate a client as of now.
    pub fn status(&self, client_id: i64) -> Result<Evaluation> {
        self.status_at(client_id, chrono::Utc::now().timestamp_millis())
    }

    /// Evaluate a client as of `as_of` (epoch milliseconds).
    ///
    /// Positions, prices for exactly the client's symbols, and the margin
    /// record are each read once before evaluating.
    pub fn status_at(&self, client_id: i64, as_of: i64) -> Result<Evaluation> {
        let positions = self.positions.list_by_client(client_id)?;

        let symbols: Vec<String> = positions.iter().map(|p| p.symbol.clone()).collect();
        let prices = self
            .prices
            .current_prices(&symbols, freshness_cutoff(as_of, self.freshness))?;

        if prices.len() < symbols.len() {
            debug!(
                "Client {}: {} of {} symbols have fresh prices",
                client_id,
                prices.len(),
                symbols.len()
            );
        }

        let margin = self.margins.margin_for_client(client_id)?;
        let status = evaluate(client_id, &positions, &prices, margin.as_ref())?;

        Ok(Evaluation {
            client_id,
            status,
            evaluated_at: as_of,
        })
    }

    /// Validate and upsert a client's margin record.
    pub fn update_margin(&self, request: UpdateMarginRequest) -> Result<()> {
        request.validate().map_err(AppError::BadRequest)?;

        let record = MarginRecord {
            client_id: request.client_id,
            loan_amount: request.loan_amount,
            initial_margin: request.initial_margin,
            maintenance_margin: request.maintenance_margin,
            created_at: 0,
            updated_at: 0,
        };
        self.margins.upsert_margin(&record)?;

        info!(
            "Updated margin for client {} (loan {:.2}, maintenance {:.4})",
            record.client_id, record.loan_amount, record.maintenance_margin
        );
        Ok(())
    }
}

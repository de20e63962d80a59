//! Margin sweep.
//!
//! Each tick evaluates every client holding a position and emits an alert for
//! each margin call. One misconfigured client never stops the sweep.

use crate::error::Result;
use crate::services::alerts::AlertSink;
use crate::services::margin::{Evaluation, MarginService};
use crate::services::scheduler::{Job, TickReport};
use crate::services::stores::{blocking, PositionStore};
use crate::types::MarginAlert;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientOutcome {
    Healthy,
    MarginCall,
    Failed,
}

/// Periodically re-evaluates all clients and raises margin-call alerts.
pub struct MarginSweepJob {
    positions: Arc<dyn PositionStore>,
    margin: Arc<MarginService>,
    alerts: Arc<dyn AlertSink>,
    max_concurrent: usize,
}

impl MarginSweepJob {
    pub fn new(
        positions: Arc<dyn PositionStore>,
        margin: Arc<MarginService>,
        alerts: Arc<dyn AlertSink>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            positions,
            margin,
            alerts,
            max_concurrent: max_concurrent.max(1),
        }
    }

    async fn evaluate(&self, client_id: i64) -> Result<Evaluation> {
        let margin = self.margin.clone();
        blocking(move || margin.status(client_id)).await
    }

    async fn check_client(&self, client_id: i64) -> ClientOutcome {
        let Evaluation {
            status,
            evaluated_at,
            ..
        } = match self.evaluate(client_id).await {
            Ok(evaluation) => evaluation,
            Err(e) => {
                warn!(client_id, "Failed to calculate margin status: {}", e);
                return ClientOutcome::Failed;
            }
        };

        if !status.margin_call {
            debug!(
                client_id,
                "Margin healthy (equity {:.2}, shortfall {:.2})",
                status.net_equity,
                status.margin_shortfall
            );
            return ClientOutcome::Healthy;
        }

        let alert = MarginAlert::new(client_id, &status, evaluated_at);
        if let Err(e) = self.alerts.emit(&alert) {
            warn!(client_id, "Failed to emit margin call alert: {}", e);
        }
        ClientOutcome::MarginCall
    }

    /// One full sweep over every client with open positions.
    pub async fn sweep(&self) -> TickReport {
        let mut report = TickReport::begin(self.name());

        let positions = self.positions.clone();
        let clients = match blocking(move || Ok(positions.distinct_clients()?)).await {
            Ok(clients) => clients,
            Err(e) => {
                error!("Failed to discover clients with positions: {}", e);
                report.discovery_error = Some(e.to_string());
                return report.finish();
            }
        };
        report.attempted = clients.len();

        let outcomes: Vec<ClientOutcome> = stream::iter(clients)
            .map(|client_id| self.check_client(client_id))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                ClientOutcome::Healthy => report.succeeded += 1,
                ClientOutcome::MarginCall => {
                    report.succeeded += 1;
                    report.alerts += 1;
                }
                ClientOutcome::Failed => report.failed += 1,
            }
        }

        report.finish()
    }
}

#[async_trait]
impl Job for MarginSweepJob {
    fn name(&self) -> &'static str {
        "margin sweep"
    }

    async fn tick(&self) -> TickReport {
        self.sweep().await
    }
}

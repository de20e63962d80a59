//! Margin alert emission.
//!
//! Alerts are published on a broadcast channel; delivery to people is not
//! handled here. Emission is fire-and-forget for the sweep.

use crate::types::MarginAlert;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("no alert subscribers")]
    NoSubscribers,
    #[error("alert delivery failed: {0}")]
    Delivery(String),
}

/// Destination for margin alerts.
pub trait AlertSink: Send + Sync {
    fn emit(&self, alert: &MarginAlert) -> Result<(), AlertError>;
}

/// Broadcast-backed alert sink.
pub struct AlertBroadcaster {
    tx: broadcast::Sender<MarginAlert>,
}

impl AlertBroadcaster {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(capacity);
        Arc::new(Self { tx })
    }

    /// Subscribe to alerts.
    pub fn subscribe(&self) -> broadcast::Receiver<MarginAlert> {
        self.tx.subscribe()
    }

    /// Spawn a subscriber that writes every alert to the log.
    pub fn spawn_log_subscriber(&self) -> tokio::task::JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(alert) => log_alert(&alert),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Alert log subscriber lagged, {} alerts dropped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl AlertSink for AlertBroadcaster {
    fn emit(&self, alert: &MarginAlert) -> Result<(), AlertError> {
        self.tx
            .send(alert.clone())
            .map(|_| ())
            .map_err(|_| AlertError::NoSubscribers)
    }
}

fn log_alert(alert: &MarginAlert) {
    let at = chrono::DateTime::from_timestamp_millis(alert.at)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| alert.at.to_string());

    warn!(
        alert_id = %alert.id,
        client_id = alert.client_id,
        "MARGIN CALL: portfolio value {:.2}, net equity {:.2}, shortfall {:.2} at {}",
        alert.portfolio_value,
        alert.net_equity,
        alert.margin_shortfall,
        at
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarginStatus;

    fn alert(client_id: i64) -> MarginAlert {
        let status = MarginStatus {
            portfolio_value: 1500.0,
            net_equity: 100.0,
            margin_shortfall: 275.0,
            margin_call: true,
        };
        MarginAlert::new(client_id, &status, 1_700_000_000_000)
    }

    #[test]
    fn test_emit_without_subscribers_fails() {
        let broadcaster = AlertBroadcaster::new(16);
        assert!(matches!(broadcaster.emit(&alert(1)), Err(AlertError::NoSubscribers)));
    }

    #[tokio::test]
    async fn test_subscriber_receives_alert() {
        let broadcaster = AlertBroadcaster::new(16);
        let mut rx = broadcaster.subscribe();

        broadcaster.emit(&alert(3)).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.client_id, 3);
        assert_eq!(received.margin_shortfall, 275.0);
    }
}

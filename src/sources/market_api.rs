//! HTTP client for the upstream quote API.
//!
//! `GET {base_url}/quote/{symbol}?apikey={key}` returning `{"price": <number>}`.

use super::{QuoteError, QuoteSource};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure constructing a [`MarketDataClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid quote API base URL {url:?}: {message}")]
    BaseUrl { url: String, message: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Quote API response.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteResponse {
    pub price: f64,
}

/// Quote API client with a per-request timeout.
pub struct MarketDataClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl MarketDataClient {
    /// Create a new client. Every request is bounded by `timeout`.
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self, ClientError> {
        let invalid = |message: String| ClientError::BaseUrl {
            url: base_url.clone(),
            message,
        };
        let parsed = Url::parse(&base_url).map_err(|e| invalid(e.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(invalid("URL cannot carry a path".to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: parsed,
            api_key,
        })
    }

    /// `{base_url}/quote/{symbol}` with the symbol escaped as one path segment.
    fn quote_url(&self, symbol: &str) -> Result<Url, QuoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| QuoteError::Transport {
                symbol: symbol.to_string(),
                message: "base URL cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .push("quote")
            .push(symbol);
        Ok(url)
    }

    fn transport_error(symbol: &str, err: reqwest::Error) -> QuoteError {
        if err.is_timeout() {
            QuoteError::Timeout {
                symbol: symbol.to_string(),
            }
        } else {
            QuoteError::Transport {
                symbol: symbol.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl QuoteSource for MarketDataClient {
    async fn quote(&self, symbol: &str) -> Result<f64, QuoteError> {
        let response = self
            .client
            .get(self.quote_url(symbol)?)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| Self::transport_error(symbol, e))?;

        if !response.status().is_success() {
            return Err(QuoteError::Status {
                symbol: symbol.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| Self::transport_error(symbol, e))?;

        let quote: QuoteResponse =
            serde_json::from_str(&body).map_err(|e| QuoteError::Malformed {
                symbol: symbol.to_string(),
                message: e.to_string(),
            })?;

        if !quote.price.is_finite() || quote.price <= 0.0 {
            return Err(QuoteError::Malformed {
                symbol: symbol.to_string(),
                message: format!("non-positive price {}", quote.price),
            });
        }

        debug!("Fetched quote for {}: {}", symbol, quote.price);
        Ok(quote.price)
    }
}

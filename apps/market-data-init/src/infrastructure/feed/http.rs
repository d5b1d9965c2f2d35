//! 24h ticker price source.
//!
//! Polls a Binance-compatible `GET /api/v3/ticker/24hr?symbols=[...]`
//! endpoint. Decimal fields arrive as strings and are parsed without going
//! through floating point.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::ports::{PriceSource, PriceSourceError, PriceTable};
use crate::domain::snapshot::{PriceData, Symbol};

/// HTTP price source for a fixed symbol set.
#[derive(Debug)]
pub struct HttpPriceSource {
    client: reqwest::Client,
    url: String,
    symbols: HashSet<Symbol>,
    symbols_param: String,
}

impl HttpPriceSource {
    /// Create a source for `symbols` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        url: impl Into<String>,
        symbols: &[Symbol],
        timeout: Duration,
    ) -> Result<Self, PriceSourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PriceSourceError::Network {
                message: e.to_string(),
            })?;

        let symbols_param = serde_json::to_string(symbols).map_err(|e| PriceSourceError::Parse {
            message: e.to_string(),
        })?;

        Ok(Self {
            client,
            url: url.into(),
            symbols: symbols.iter().cloned().collect(),
            symbols_param,
        })
    }

    /// Symbols requested on every fetch.
    #[must_use]
    pub const fn symbols(&self) -> &HashSet<Symbol> {
        &self.symbols
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    async fn fetch_prices(&self) -> Result<PriceTable, PriceSourceError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("symbols", self.symbols_param.as_str())])
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PriceSourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await.map_err(transport_error)?;
        let tickers: Vec<Ticker24h> =
            serde_json::from_slice(&body).map_err(|e| PriceSourceError::Parse {
                message: e.to_string(),
            })?;

        let prices: PriceTable = tickers
            .into_iter()
            .filter(|t| self.symbols.contains(&t.symbol))
            .map(|t| (t.symbol.clone(), PriceData::from(t)))
            .collect();

        if prices.is_empty() {
            return Err(PriceSourceError::Empty);
        }
        Ok(prices)
    }
}

fn transport_error(e: reqwest::Error) -> PriceSourceError {
    if e.is_timeout() {
        PriceSourceError::Timeout
    } else {
        PriceSourceError::Network {
            message: e.to_string(),
        }
    }
}

// API response types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    last_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    price_change_percent: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    volume: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    high_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    low_price: Decimal,
}

impl From<Ticker24h> for PriceData {
    fn from(t: Ticker24h) -> Self {
        Self {
            symbol: t.symbol,
            price: t.last_price,
            change_percent_24h: t.price_change_percent,
            volume_24h: t.volume,
            high_24h: t.high_price,
            low_24h: t.low_price,
        }
    }
}

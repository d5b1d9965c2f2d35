//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use market_data_init::{
    FeedConfig, InitializerEvent, PollingMarketDataService, PriceData, PriceSource,
    PriceSourceError, PriceTable, RetryConfig,
};

/// Price source that replays a script, then keeps failing.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<PriceTable, PriceSourceError>>>,
    fetches: AtomicU32,
    latency: Duration,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<PriceTable, PriceSourceError>>) -> Arc<Self> {
        Self::with_latency(script, Duration::ZERO)
    }

    pub fn with_latency(
        script: Vec<Result<PriceTable, PriceSourceError>>,
        latency: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fetches: AtomicU32::new(0),
            latency,
        })
    }

    pub fn failing() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn push(&self, result: Result<PriceTable, PriceSourceError>) {
        self.script.lock().push_back(result);
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for ScriptedSource {
    async fn fetch_prices(&self) -> Result<PriceTable, PriceSourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.script.lock().pop_front().unwrap_or_else(|| {
            Err(PriceSourceError::Network {
                message: "connection refused".to_string(),
            })
        })
    }
}

pub fn prices(symbols: &[(&str, i64)]) -> PriceTable {
    symbols
        .iter()
        .map(|(s, p)| ((*s).to_string(), PriceData::new(*s, Decimal::new(*p, 0))))
        .collect()
}

pub fn ok_prices() -> Result<PriceTable, PriceSourceError> {
    Ok(prices(&[("BTCUSDT", 64_000), ("ETHUSDT", 3_200)]))
}

pub fn network_error() -> Result<PriceTable, PriceSourceError> {
    Err(PriceSourceError::Network {
        message: "connection reset".to_string(),
    })
}

pub fn service(source: Arc<ScriptedSource>) -> Arc<PollingMarketDataService> {
    Arc::new(PollingMarketDataService::new(source, FeedConfig::default()))
}

/// Linear 1s/2s/3s backoff within a 10s budget.
pub fn retry() -> RetryConfig {
    RetryConfig::default()
}

/// Everything currently queued on the channel.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<InitializerEvent>) -> Vec<InitializerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Next event, failing the test if none arrives within `within`.
pub async fn next_event(
    rx: &mut mpsc::UnboundedReceiver<InitializerEvent>,
    within: Duration,
) -> InitializerEvent {
    tokio::time::timeout(within, rx.recv())
        .await
        .expect("timed out waiting for initializer event")
        .expect("initializer event channel closed")
}

/// Let spawned tasks run and timers fire for `period` of (paused) time.
pub async fn settle(period: Duration) {
    tokio::time::sleep(period).await;
    tokio::task::yield_now().await;
}

//! Polling Market Data Service
//!
//! Holds the current [`MarketSnapshot`] and replaces it on every refresh.
//! Refreshes are serialized, so snapshot timestamps strictly increase in
//! publication order.
//!
//! On failure the last-good prices are kept and the error is appended to a
//! bounded history. A successful fetch clears the history.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{MarketDataPort, PriceSource, PriceSourceError};
use crate::domain::snapshot::{
    FeedErrorRecord, MarketSnapshot, SharedSnapshot, next_update_time,
};
use crate::infrastructure::metrics;

/// Shortest interval the poller will tick at.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for the polling service.
#[derive(Debug, Clone, Copy)]
pub struct FeedConfig {
    /// Interval between background refreshes.
    pub poll_interval: Duration,
    /// Maximum feed errors kept in a snapshot (0 = unbounded).
    pub max_error_history: usize,
    /// Capacity of the update channel.
    pub channel_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_error_history: 10,
            channel_capacity: 64,
        }
    }
}

/// Shared market-data cache backed by a polled [`PriceSource`].
pub struct PollingMarketDataService {
    source: Arc<dyn PriceSource>,
    config: FeedConfig,
    current: RwLock<SharedSnapshot>,
    updates: broadcast::Sender<SharedSnapshot>,
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for PollingMarketDataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingMarketDataService")
            .field("config", &self.config)
            .field("subscribers", &self.updates.receiver_count())
            .finish_non_exhaustive()
    }
}

impl PollingMarketDataService {
    /// Create a service whose snapshot starts out loading.
    #[must_use]
    pub fn new(source: Arc<dyn PriceSource>, config: FeedConfig) -> Self {
        let (updates, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            source,
            config,
            current: RwLock::new(Arc::new(MarketSnapshot::loading())),
            updates,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Number of live update subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.updates.receiver_count()
    }

    /// Poll the source every `poll_interval` until cancelled.
    ///
    /// The first poll happens one interval after start; the bootstrap
    /// sequence performs the initial fetch. A zero interval is raised to
    /// [`MIN_POLL_INTERVAL`].
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.config.poll_interval.max(MIN_POLL_INTERVAL);
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            poll_interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
            "Market data poller started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("Market data poller cancelled");
                    break;
                }
                _ = interval.tick() => {
                    self.refresh().await;
                }
            }
        }
    }

    fn failed(
        &self,
        previous: &MarketSnapshot,
        error: &PriceSourceError,
        at: chrono::DateTime<chrono::Utc>,
        elapsed: Duration,
    ) -> MarketSnapshot {
        metrics::record_fetch_failure(error.kind(), elapsed);
        tracing::warn!(
            kind = error.kind().as_str(),
            error = %error,
            kept_symbols = previous.symbol_count(),
            "Market data fetch failed"
        );
        previous.with_failure(
            FeedErrorRecord::new(error.kind(), error.to_string(), at),
            at,
            self.config.max_error_history,
        )
    }
}

#[async_trait]
impl MarketDataPort for PollingMarketDataService {
    fn snapshot(&self) -> SharedSnapshot {
        Arc::clone(&self.current.read())
    }

    async fn refresh(&self) -> SharedSnapshot {
        let _serialized = self.refresh_lock.lock().await;

        let started = Instant::now();
        let result = self.source.fetch_prices().await;
        let elapsed = started.elapsed();

        let previous = self.snapshot();
        let at = next_update_time(previous.last_update);
        let next = match result {
            Ok(prices) if !prices.is_empty() => {
                metrics::record_fetch_success(prices.len(), elapsed);
                tracing::debug!(symbols = prices.len(), "Market data fetched");
                MarketSnapshot::loaded(prices, at)
            }
            Ok(_) => self.failed(&previous, &PriceSourceError::Empty, at, elapsed),
            Err(e) => self.failed(&previous, &e, at, elapsed),
        };

        let next = Arc::new(next);
        *self.current.write() = Arc::clone(&next);
        // no subscribers is fine
        self.updates.send(Arc::clone(&next)).ok();
        next
    }

    fn subscribe(&self) -> broadcast::Receiver<SharedSnapshot> {
        self.updates.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::PriceTable;
    use crate::domain::snapshot::{FeedErrorKind, PriceData};

    struct ScriptedSource {
        script: parking_lot::Mutex<VecDeque<Result<PriceTable, PriceSourceError>>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<PriceTable, PriceSourceError>>) -> Arc<Self> {
            Arc::new(Self {
                script: parking_lot::Mutex::new(script.into()),
            })
        }
    }

    #[async_trait]
    impl PriceSource for ScriptedSource {
        async fn fetch_prices(&self) -> Result<PriceTable, PriceSourceError> {
            self.script
                .lock()
                .pop_front()
                .unwrap_or(Err(PriceSourceError::Timeout))
        }
    }

    fn table(symbols: &[&str]) -> PriceTable {
        symbols
            .iter()
            .map(|s| ((*s).to_string(), PriceData::new(*s, Decimal::ONE_HUNDRED)))
            .collect()
    }

    fn network(message: &str) -> PriceSourceError {
        PriceSourceError::Network {
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn starts_loading() {
        let service = PollingMarketDataService::new(ScriptedSource::new(vec![]), FeedConfig::default());
        let snapshot = service.snapshot();
        assert!(snapshot.is_loading);
        assert!(!snapshot.is_usable());
    }

    #[tokio::test]
    async fn success_replaces_snapshot() {
        let service = PollingMarketDataService::new(
            ScriptedSource::new(vec![Ok(table(&["BTCUSDT", "ETHUSDT"]))]),
            FeedConfig::default(),
        );

        let snapshot = service.refresh().await;
        assert!(snapshot.is_usable());
        assert_eq!(snapshot.symbol_count(), 2);
        assert!(Arc::ptr_eq(&snapshot, &service.snapshot()));
    }

    #[tokio::test]
    async fn failure_keeps_last_good_prices() {
        let service = PollingMarketDataService::new(
            ScriptedSource::new(vec![Ok(table(&["BTCUSDT"])), Err(network("reset"))]),
            FeedConfig::default(),
        );

        let first = service.refresh().await;
        let second = service.refresh().await;

        assert_eq!(second.symbol_count(), 1);
        assert_eq!(second.errors.len(), 1);
        assert_eq!(second.errors[0].kind, FeedErrorKind::Network);
        assert!(second.last_update > first.last_update);
        assert!(!second.is_usable());
    }

    #[tokio::test]
    async fn empty_table_is_an_error() {
        let service = PollingMarketDataService::new(
            ScriptedSource::new(vec![Ok(PriceTable::new())]),
            FeedConfig::default(),
        );

        let snapshot = service.refresh().await;
        assert!(!snapshot.is_loading);
        assert_eq!(
            snapshot.last_error().map(|e| e.kind),
            Some(FeedErrorKind::Empty)
        );
    }

    #[tokio::test]
    async fn error_history_is_bounded_and_cleared_on_success() {
        let mut script: Vec<_> = (0..5).map(|i| Err(network(&format!("failure {i}")))).collect();
        script.push(Ok(table(&["SOLUSDT"])));
        let service = PollingMarketDataService::new(
            ScriptedSource::new(script),
            FeedConfig {
                max_error_history: 3,
                ..FeedConfig::default()
            },
        );

        for _ in 0..5 {
            service.refresh().await;
        }
        let failing = service.snapshot();
        assert_eq!(failing.errors.len(), 3);
        assert!(failing.errors[2].message.contains("failure 4"));

        let recovered = service.refresh().await;
        assert!(recovered.errors.is_empty());
        assert!(recovered.is_usable());
    }

    #[tokio::test]
    async fn refresh_publishes_to_subscribers() {
        let service = PollingMarketDataService::new(
            ScriptedSource::new(vec![Ok(table(&["XRPUSDT"]))]),
            FeedConfig::default(),
        );
        let mut rx = service.subscribe();
        assert_eq!(service.subscriber_count(), 1);

        let published = service.refresh().await;
        let received = rx.recv().await.unwrap();
        assert!(Arc::ptr_eq(&published, &received));
    }

    #[tokio::test]
    async fn concurrent_refreshes_have_increasing_timestamps() {
        let service = Arc::new(PollingMarketDataService::new(
            ScriptedSource::new((0..8).map(|_| Ok(table(&["BTCUSDT"]))).collect()),
            FeedConfig::default(),
        ));
        let mut rx = service.subscribe();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.refresh().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let mut last = rx.recv().await.unwrap().last_update;
        for _ in 1..8 {
            let next = rx.recv().await.unwrap().last_update;
            assert!(next > last);
            last = next;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_polls_after_each_interval_until_cancelled() {
        let service = Arc::new(PollingMarketDataService::new(
            ScriptedSource::new(vec![Ok(table(&["BTCUSDT"])), Ok(table(&["ETHUSDT"]))]),
            FeedConfig {
                poll_interval: Duration::from_secs(5),
                ..FeedConfig::default()
            },
        ));
        let mut rx = service.subscribe();
        let cancel = CancellationToken::new();
        let poller = tokio::spawn(Arc::clone(&service).run(cancel.clone()));

        let first = rx.recv().await.unwrap();
        assert!(first.price("BTCUSDT").is_some());
        let second = rx.recv().await.unwrap();
        assert!(second.price("ETHUSDT").is_some());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), poller)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn run_survives_zero_interval() {
        let service = Arc::new(PollingMarketDataService::new(
            ScriptedSource::new(vec![Ok(table(&["BTCUSDT"]))]),
            FeedConfig {
                poll_interval: Duration::ZERO,
                ..FeedConfig::default()
            },
        ));
        let mut rx = service.subscribe();
        let cancel = CancellationToken::new();
        let poller = tokio::spawn(Arc::clone(&service).run(cancel.clone()));

        let first = rx.recv().await.unwrap();
        assert!(first.price("BTCUSDT").is_some());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), poller)
            .await
            .unwrap()
            .unwrap();
    }
}

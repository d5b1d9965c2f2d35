//! Market Data Initializer
//!
//! Drives the shared market-data service from "unready" to "ready" and then
//! forwards snapshot updates to the owning application.
//!
//! # Bootstrap
//!
//! Each attempt calls [`MarketDataPort::refresh`]. A usable snapshot ends the
//! sequence. A failed attempt is reported and retried after a backoff delay
//! until `max_attempts` is reached; after that, whatever data exists is
//! delivered and readiness is reported anyway (fail-open).
//!
//! # Teardown
//!
//! Every notification runs under a notification gate. [`MarketDataInitializer::cleanup`]
//! and [`MonitorHandle::cancel`] take the same gate, so no notification fires
//! after they return. The gate is re-entrant: an observer may tear the
//! initializer down from inside a notification.
//!
//! [`MarketDataPort::refresh`]: crate::application::ports::MarketDataPort::refresh

use std::cell::Cell;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::ports::{SharedMarketData, SharedObserver};
use crate::domain::lifecycle::{InitializationState, InitializerPhase, LifecycleError};
use crate::domain::retry::{RetryConfig, RetryPolicy};
use crate::domain::snapshot::{MarketSnapshot, SharedSnapshot};
use crate::infrastructure::metrics::{self, ReadyOutcome};

// =============================================================================
// Errors
// =============================================================================

/// Initializer usage errors.
///
/// Feed failures are never reported here; they travel inside snapshots.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitializerError {
    /// Invalid arguments or a transition the lifecycle does not allow.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Monitoring requested before readiness.
    #[error("market data is not ready")]
    NotReady,

    /// The initializer was cleaned up.
    #[error("initializer has been cleaned up")]
    Terminated,

    /// Called outside a tokio runtime.
    #[error("no tokio runtime available to schedule work")]
    NoRuntime,
}

// =============================================================================
// Outcome and Status
// =============================================================================

/// How a bootstrap sequence ended.
#[derive(Debug, Clone)]
pub enum BootstrapOutcome {
    /// A usable snapshot was delivered.
    Ready {
        /// Attempts made, including the successful one.
        attempts: u32,
        /// Delivered snapshot.
        snapshot: SharedSnapshot,
    },
    /// Attempts were exhausted; the last snapshot was delivered anyway.
    Degraded {
        /// Attempts made.
        attempts: u32,
        /// Delivered snapshot (may be empty and carry errors).
        snapshot: SharedSnapshot,
    },
    /// Cleanup happened before readiness was reported.
    Cancelled {
        /// Attempt in progress when cancelled.
        attempts: u32,
    },
}

impl BootstrapOutcome {
    /// Attempts made.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Ready { attempts, .. }
            | Self::Degraded { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }

    /// Delivered snapshot, if readiness was reported.
    #[must_use]
    pub const fn snapshot(&self) -> Option<&SharedSnapshot> {
        match self {
            Self::Ready { snapshot, .. } | Self::Degraded { snapshot, .. } => Some(snapshot),
            Self::Cancelled { .. } => None,
        }
    }

    /// Whether readiness was reported.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        !matches!(self, Self::Cancelled { .. })
    }
}

/// Point-in-time view of an initializer, for health reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitializerStatus {
    /// Instance id.
    pub id: Uuid,
    /// Lifecycle phase.
    pub phase: InitializerPhase,
    /// Current attempt.
    pub attempt: u32,
    /// Attempt ceiling (0 before bootstrap starts).
    pub max_attempts: u32,
    /// Whether readiness was reported.
    pub ready: bool,
    /// Whether readiness was fail-open.
    pub degraded: bool,
    /// Whether a monitoring subscription is active.
    pub monitoring: bool,
}

// =============================================================================
// Notification Gate
// =============================================================================

#[derive(Debug, Default)]
struct NotifyGate {
    closed: ReentrantMutex<Cell<bool>>,
}

impl NotifyGate {
    /// Run `notify` unless the gate is closed or `token` is cancelled.
    fn run_open(&self, token: &CancellationToken, notify: impl FnOnce()) -> bool {
        let closed = self.closed.lock();
        if closed.get() || token.is_cancelled() {
            return false;
        }
        notify();
        true
    }

    fn is_open(&self, token: &CancellationToken) -> bool {
        let closed = self.closed.lock();
        !closed.get() && !token.is_cancelled()
    }

    /// Close for good and cancel `token`. True on the first close.
    fn close(&self, token: &CancellationToken) -> bool {
        let closed = self.closed.lock();
        token.cancel();
        !closed.replace(true)
    }

    /// Cancel `token` while no notification is in flight. True if this call
    /// cancelled it.
    fn cancel(&self, token: &CancellationToken) -> bool {
        let _closed = self.closed.lock();
        let first = !token.is_cancelled();
        token.cancel();
        first
    }
}

// =============================================================================
// Monitor Handle
// =============================================================================

/// Teardown handle for a monitoring subscription.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    token: CancellationToken,
    gate: Arc<NotifyGate>,
}

impl MonitorHandle {
    /// Tear the subscription down. Idempotent; true on the call that
    /// actually tore it down.
    pub fn cancel(&self) -> bool {
        let first = self.gate.cancel(&self.token);
        if first {
            tracing::debug!("Market data monitor cancelled");
        }
        first
    }

    /// Whether the subscription is still live.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }
}

// =============================================================================
// Initializer
// =============================================================================

struct Inner {
    id: Uuid,
    market_data: SharedMarketData,
    observer: SharedObserver,
    retry: RetryConfig,
    state: Mutex<InitializationState>,
    gate: Arc<NotifyGate>,
    cancel: CancellationToken,
    bootstrap_task: Mutex<Option<JoinHandle<()>>>,
    monitor: Mutex<Option<MonitorHandle>>,
}

/// Bootstrap and monitoring sequence for one owner.
///
/// Construct one per mount of the owning component; dropping it performs
/// [`cleanup`](Self::cleanup).
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use market_data_init::application::ports::{PriceSource, SharedMarketData};
/// use market_data_init::application::services::MarketDataInitializer;
/// use market_data_init::domain::retry::RetryConfig;
/// use market_data_init::infrastructure::feed::{FeedConfig, PollingMarketDataService};
/// use market_data_init::infrastructure::observer::{ChannelObserver, InitializerEvent};
///
/// async fn example(source: Arc<dyn PriceSource>) {
///     let service: SharedMarketData =
///         Arc::new(PollingMarketDataService::new(source, FeedConfig::default()));
///     let (observer, mut events) = ChannelObserver::new();
///     let initializer =
///         MarketDataInitializer::new(service, Arc::new(observer), RetryConfig::default());
///
///     initializer.initialize_market_data(1, 3).unwrap();
///
///     while let Some(event) = events.recv().await {
///         if let InitializerEvent::ReadinessChanged(true) = event {
///             break;
///         }
///     }
///
///     initializer.cleanup();
/// }
/// ```
pub struct MarketDataInitializer {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MarketDataInitializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataInitializer")
            .field("id", &self.inner.id)
            .field("state", &*self.inner.state.lock())
            .finish_non_exhaustive()
    }
}

impl MarketDataInitializer {
    /// Create an initializer over a shared market-data service.
    #[must_use]
    pub fn new(market_data: SharedMarketData, observer: SharedObserver, retry: RetryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                market_data,
                observer,
                retry,
                state: Mutex::new(InitializationState::new()),
                gate: Arc::new(NotifyGate::default()),
                cancel: CancellationToken::new(),
                bootstrap_task: Mutex::new(None),
                monitor: Mutex::new(None),
            }),
        }
    }

    /// Instance id used in logs.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Start the bootstrap sequence at `attempt` on a background task.
    ///
    /// Returns once the sequence is scheduled; results arrive through the
    /// observer.
    ///
    /// # Errors
    ///
    /// Fails on zero arguments, when already started or cleaned up, or
    /// outside a tokio runtime.
    pub fn initialize_market_data(
        &self,
        attempt: u32,
        max_attempts: u32,
    ) -> Result<(), InitializerError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| InitializerError::NoRuntime)?;
        self.begin(attempt, max_attempts)?;

        let inner = Arc::clone(&self.inner);
        let task = runtime.spawn(async move {
            let outcome = inner.run_bootstrap().await;
            tracing::debug!(
                initializer_id = %inner.id,
                attempts = outcome.attempts(),
                ready = outcome.is_ready(),
                "Bootstrap task finished"
            );
        });
        *self.inner.bootstrap_task.lock() = Some(task);
        Ok(())
    }

    /// Run the bootstrap sequence inline and report how it ended.
    ///
    /// Notifications are identical to [`initialize_market_data`](Self::initialize_market_data).
    ///
    /// # Errors
    ///
    /// Fails on zero arguments or when already started or cleaned up.
    pub async fn bootstrap(
        &self,
        attempt: u32,
        max_attempts: u32,
    ) -> Result<BootstrapOutcome, InitializerError> {
        self.begin(attempt, max_attempts)?;
        Ok(self.inner.run_bootstrap().await)
    }

    /// Forward every snapshot newer than `current` to the observer.
    ///
    /// Supersedes any subscription started by an earlier call.
    ///
    /// # Errors
    ///
    /// Fails before readiness, after cleanup, or outside a tokio runtime.
    pub fn monitor_data_updates(
        &self,
        current: &MarketSnapshot,
    ) -> Result<MonitorHandle, InitializerError> {
        let inner = &self.inner;
        if !inner.gate.is_open(&inner.cancel) {
            return Err(InitializerError::Terminated);
        }
        if !inner.state.lock().is_ready() {
            return Err(InitializerError::NotReady);
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| InitializerError::NoRuntime)?;

        let handle = MonitorHandle {
            token: inner.cancel.child_token(),
            gate: Arc::clone(&inner.gate),
        };
        let previous = inner.monitor.lock().replace(handle.clone());
        if let Some(previous) = previous
            && previous.cancel()
        {
            tracing::debug!(
                initializer_id = %inner.id,
                "Superseded previous market data monitor"
            );
        }

        let receiver = inner.market_data.subscribe();
        let task_inner = Arc::clone(inner);
        let token = handle.token.clone();
        let baseline = current.last_update;
        runtime.spawn(async move {
            task_inner.run_monitor(token, receiver, baseline).await;
        });

        Ok(handle)
    }

    /// Cancel any pending retry and any active monitor. Idempotent.
    ///
    /// No notification fires after this returns.
    pub fn cleanup(&self) {
        let inner = &self.inner;
        let first = inner.gate.close(&inner.cancel);
        inner.state.lock().terminate();

        let task = inner.bootstrap_task.lock().take();
        if let Some(task) = task {
            task.abort();
        }
        let monitor = inner.monitor.lock().take();
        if let Some(monitor) = monitor {
            monitor.cancel();
        }

        if first {
            tracing::info!(initializer_id = %inner.id, "Market data initializer cleaned up");
        }
    }

    /// Whether readiness has been reported.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.state.lock().is_ready()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> InitializerStatus {
        let state = self.inner.state.lock().clone();
        let monitoring = self
            .inner
            .monitor
            .lock()
            .as_ref()
            .is_some_and(MonitorHandle::is_active);

        InitializerStatus {
            id: self.inner.id,
            phase: state.phase(),
            attempt: state.attempt(),
            max_attempts: state.max_attempts(),
            ready: state.is_ready(),
            degraded: state.is_degraded(),
            monitoring,
        }
    }

    fn begin(&self, attempt: u32, max_attempts: u32) -> Result<(), InitializerError> {
        let inner = &self.inner;
        if !inner.gate.is_open(&inner.cancel) {
            return Err(InitializerError::Terminated);
        }
        inner.state.lock().begin(attempt, max_attempts)?;

        tracing::info!(
            initializer_id = %inner.id,
            attempt,
            max_attempts,
            worst_case_backoff_ms = u64::try_from(
                inner.retry.worst_case_total(max_attempts).as_millis()
            )
            .unwrap_or(u64::MAX),
            "Market data bootstrap started"
        );
        Ok(())
    }
}

impl Drop for MarketDataInitializer {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl Inner {
    async fn run_bootstrap(&self) -> BootstrapOutcome {
        let mut policy = RetryPolicy::new(self.retry.clone());

        loop {
            let (attempt, final_attempt) = {
                let state = self.state.lock();
                (state.attempt(), state.is_final_attempt())
            };
            metrics::record_init_attempt();
            tracing::debug!(initializer_id = %self.id, attempt, "Fetching market data");

            let snapshot = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return self.cancelled(attempt),
                snapshot = self.market_data.refresh() => snapshot,
            };

            if snapshot.is_usable() {
                return self.finish(snapshot, attempt, false);
            }
            if final_attempt {
                return self.finish(snapshot, attempt, true);
            }

            let delay = policy.next_delay();
            metrics::record_init_retry();
            tracing::warn!(
                initializer_id = %self.id,
                attempt,
                retry = policy.retry_count(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                errors = snapshot.errors.len(),
                last_error = snapshot.last_error().map_or("none", |e| e.message.as_str()),
                "Market data not usable, scheduling retry"
            );
            if !self
                .gate
                .run_open(&self.cancel, || self.observer.set_initialization_attempts(attempt))
            {
                return self.cancelled(attempt);
            }

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return self.cancelled(attempt),
                () = tokio::time::sleep(delay) => {}
            }

            // the cancelled flag is re-checked under the gate when the timer fires
            let mut advanced = false;
            self.gate.run_open(&self.cancel, || {
                advanced = self.state.lock().advance().is_ok();
            });
            if !advanced {
                return self.cancelled(attempt);
            }
        }
    }

    fn finish(&self, snapshot: SharedSnapshot, attempts: u32, degraded: bool) -> BootstrapOutcome {
        let mut delivered = false;
        self.gate.run_open(&self.cancel, || {
            if self.state.lock().mark_ready(degraded).is_err() {
                return;
            }
            self.observer.update_market_data(Arc::clone(&snapshot));
            if self.gate.is_open(&self.cancel) {
                self.observer.set_market_data_ready(true);
                delivered = true;
            }
        });
        if !delivered {
            return self.cancelled(attempts);
        }

        if degraded {
            metrics::record_ready(ReadyOutcome::Degraded);
            tracing::warn!(
                initializer_id = %self.id,
                attempts,
                symbols = snapshot.symbol_count(),
                errors = snapshot.errors.len(),
                "Market data attempts exhausted, continuing with degraded data"
            );
            BootstrapOutcome::Degraded { attempts, snapshot }
        } else {
            metrics::record_ready(ReadyOutcome::Ready);
            tracing::info!(
                initializer_id = %self.id,
                attempts,
                symbols = snapshot.symbol_count(),
                "Market data ready"
            );
            BootstrapOutcome::Ready { attempts, snapshot }
        }
    }

    fn cancelled(&self, attempts: u32) -> BootstrapOutcome {
        tracing::debug!(initializer_id = %self.id, attempts, "Market data bootstrap cancelled");
        BootstrapOutcome::Cancelled { attempts }
    }

    async fn run_monitor(
        &self,
        token: CancellationToken,
        mut receiver: broadcast::Receiver<SharedSnapshot>,
        mut last_seen: DateTime<Utc>,
    ) {
        metrics::monitor_started();
        tracing::debug!(initializer_id = %self.id, "Market data monitor started");

        // catch up on a snapshot published before the subscription existed
        let latest = self.market_data.snapshot();
        let mut open = true;
        if latest.last_update > last_seen {
            last_seen = latest.last_update;
            open = self.deliver(&token, &latest);
        }

        while open {
            let snapshot = tokio::select! {
                biased;
                () = token.cancelled() => break,
                received = receiver.recv() => match received {
                    Ok(snapshot) => snapshot,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            initializer_id = %self.id,
                            skipped,
                            "Market data monitor lagged behind the feed"
                        );
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!(initializer_id = %self.id, "Market data feed closed");
                        break;
                    }
                },
            };

            if snapshot.last_update <= last_seen {
                continue;
            }
            last_seen = snapshot.last_update;
            open = self.deliver(&token, &snapshot);
        }

        metrics::monitor_stopped();
        tracing::debug!(initializer_id = %self.id, "Market data monitor stopped");
    }

    /// Forward one monitored snapshot. False once the monitor is torn down.
    fn deliver(&self, token: &CancellationToken, snapshot: &SharedSnapshot) -> bool {
        if !self
            .gate
            .run_open(token, || self.observer.update_market_data(Arc::clone(snapshot)))
        {
            return false;
        }
        metrics::record_update_delivered(snapshot.has_errors());

        if let Some(error) = snapshot.last_error() {
            tracing::warn!(
                initializer_id = %self.id,
                errors = snapshot.errors.len(),
                kind = error.kind.as_str(),
                error = %error.message,
                "Market data update carries feed errors"
            );
        }
        true
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{OnceLock, Weak};
    use std::time::Duration;

    use async_trait::async_trait;
    use mockall::predicate::eq;
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::{MarketDataObserver, MarketDataPort, MockMarketDataObserver};
    use crate::domain::snapshot::{FeedErrorKind, FeedErrorRecord, PriceData, next_update_time};

    /// Market data fake that replays a script of refresh results.
    struct ScriptedMarketData {
        script: Mutex<VecDeque<bool>>,
        current: Mutex<SharedSnapshot>,
        refreshes: AtomicU32,
        tx: broadcast::Sender<SharedSnapshot>,
    }

    impl ScriptedMarketData {
        fn new(script: &[bool]) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.iter().copied().collect()),
                current: Mutex::new(Arc::new(MarketSnapshot::loading())),
                refreshes: AtomicU32::new(0),
                tx: broadcast::channel(16).0,
            })
        }

        fn refreshes(&self) -> u32 {
            self.refreshes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MarketDataPort for ScriptedMarketData {
        fn snapshot(&self) -> SharedSnapshot {
            Arc::clone(&self.current.lock())
        }

        async fn refresh(&self) -> SharedSnapshot {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            let succeed = self.script.lock().pop_front().unwrap_or(false);
            let previous = self.snapshot();
            let at = next_update_time(previous.last_update);
            let next = if succeed {
                let prices = HashMap::from([(
                    "BTCUSDT".to_string(),
                    PriceData::new("BTCUSDT", Decimal::new(64_000, 0)),
                )]);
                MarketSnapshot::loaded(prices, at)
            } else {
                previous.with_failure(
                    FeedErrorRecord::new(FeedErrorKind::Network, "unreachable", at),
                    at,
                    10,
                )
            };
            let next = Arc::new(next);
            *self.current.lock() = Arc::clone(&next);
            let _ = self.tx.send(Arc::clone(&next));
            next
        }

        fn subscribe(&self) -> broadcast::Receiver<SharedSnapshot> {
            self.tx.subscribe()
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig::constant(Duration::from_millis(100), Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success_notifies_update_then_ready() {
        let market = ScriptedMarketData::new(&[true]);
        let mut observer = MockMarketDataObserver::new();
        let mut seq = mockall::Sequence::new();
        observer
            .expect_update_market_data()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|snapshot| snapshot.is_usable())
            .return_const(());
        observer
            .expect_set_market_data_ready()
            .with(eq(true))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        observer.expect_set_initialization_attempts().never();

        let initializer =
            MarketDataInitializer::new(market.clone(), Arc::new(observer), fast_retry());
        let outcome = initializer.bootstrap(1, 3).await.unwrap();

        assert!(matches!(outcome, BootstrapOutcome::Ready { attempts: 1, .. }));
        assert_eq!(market.refreshes(), 1);
        assert_eq!(initializer.status().phase, InitializerPhase::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_report_each_failure_but_the_last() {
        let market = ScriptedMarketData::new(&[false, false, false]);
        let mut observer = MockMarketDataObserver::new();
        observer
            .expect_set_initialization_attempts()
            .with(eq(1))
            .times(1)
            .return_const(());
        observer
            .expect_set_initialization_attempts()
            .with(eq(2))
            .times(1)
            .return_const(());
        observer
            .expect_update_market_data()
            .times(1)
            .withf(|snapshot| snapshot.has_errors() && snapshot.prices.is_empty())
            .return_const(());
        observer
            .expect_set_market_data_ready()
            .with(eq(true))
            .times(1)
            .return_const(());

        let initializer =
            MarketDataInitializer::new(market.clone(), Arc::new(observer), fast_retry());
        let outcome = initializer.bootstrap(1, 3).await.unwrap();

        assert!(matches!(outcome, BootstrapOutcome::Degraded { attempts: 3, .. }));
        assert_eq!(market.refreshes(), 3);
        assert!(initializer.status().degraded);
    }

    #[tokio::test]
    async fn rejects_invalid_arguments() {
        let market = ScriptedMarketData::new(&[]);
        let initializer = MarketDataInitializer::new(
            market.clone(),
            Arc::new(MockMarketDataObserver::new()),
            fast_retry(),
        );

        assert_eq!(
            initializer.bootstrap(1, 0).await.unwrap_err(),
            InitializerError::Lifecycle(LifecycleError::InvalidMaxAttempts)
        );
        assert_eq!(
            initializer.initialize_market_data(0, 3).unwrap_err(),
            InitializerError::Lifecycle(LifecycleError::InvalidAttempt)
        );
        assert_eq!(market.refreshes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cannot_start_twice() {
        let market = ScriptedMarketData::new(&[true]);
        let mut observer = MockMarketDataObserver::new();
        observer.expect_update_market_data().return_const(());
        observer.expect_set_market_data_ready().return_const(());

        let initializer = MarketDataInitializer::new(market, Arc::new(observer), fast_retry());
        initializer.bootstrap(1, 1).await.unwrap();

        assert!(matches!(
            initializer.initialize_market_data(1, 1),
            Err(InitializerError::Lifecycle(
                LifecycleError::InvalidTransition { .. }
            ))
        ));
    }

    #[test]
    fn initialize_outside_runtime_fails() {
        let initializer = MarketDataInitializer::new(
            ScriptedMarketData::new(&[]),
            Arc::new(MockMarketDataObserver::new()),
            fast_retry(),
        );
        assert_eq!(
            initializer.initialize_market_data(1, 3),
            Err(InitializerError::NoRuntime)
        );
        assert_eq!(initializer.status().phase, InitializerPhase::Uninitialized);
    }

    #[tokio::test]
    async fn monitor_requires_ready() {
        let initializer = MarketDataInitializer::new(
            ScriptedMarketData::new(&[]),
            Arc::new(MockMarketDataObserver::new()),
            fast_retry(),
        );
        let result = initializer.monitor_data_updates(&MarketSnapshot::loading());
        assert!(matches!(result, Err(InitializerError::NotReady)));
    }

    #[tokio::test]
    async fn cleanup_is_idempotent_and_blocks_restart() {
        let initializer = MarketDataInitializer::new(
            ScriptedMarketData::new(&[]),
            Arc::new(MockMarketDataObserver::new()),
            fast_retry(),
        );
        initializer.cleanup();
        initializer.cleanup();

        assert_eq!(initializer.status().phase, InitializerPhase::Terminated);
        assert_eq!(
            initializer.initialize_market_data(1, 3),
            Err(InitializerError::Terminated)
        );
        assert!(matches!(
            initializer.monitor_data_updates(&MarketSnapshot::loading()),
            Err(InitializerError::Terminated)
        ));
    }

    /// Observer that tears its initializer down from inside a notification.
    #[derive(Default)]
    struct SelfCleaningObserver {
        initializer: OnceLock<Weak<MarketDataInitializer>>,
        updates: AtomicU32,
        ready_calls: AtomicU32,
    }

    impl MarketDataObserver for SelfCleaningObserver {
        fn update_market_data(&self, _snapshot: SharedSnapshot) {
            self.updates.fetch_add(1, Ordering::SeqCst);
            if let Some(initializer) = self.initializer.get().and_then(Weak::upgrade) {
                initializer.cleanup();
            }
        }

        fn set_market_data_ready(&self, _ready: bool) {
            self.ready_calls.fetch_add(1, Ordering::SeqCst);
        }

        fn set_initialization_attempts(&self, _attempts: u32) {}
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_from_inside_a_notification_stops_further_notifications() {
        let observer = Arc::new(SelfCleaningObserver::default());
        let initializer = Arc::new(MarketDataInitializer::new(
            ScriptedMarketData::new(&[true]),
            observer.clone(),
            fast_retry(),
        ));
        observer
            .initializer
            .set(Arc::downgrade(&initializer))
            .unwrap();

        let outcome = initializer.bootstrap(1, 3).await.unwrap();

        assert!(matches!(outcome, BootstrapOutcome::Cancelled { .. }));
        assert_eq!(observer.updates.load(Ordering::SeqCst), 1);
        assert_eq!(observer.ready_calls.load(Ordering::SeqCst), 0);
        assert_eq!(initializer.status().phase, InitializerPhase::Terminated);
    }

    struct PanickingObserver;

    impl MarketDataObserver for PanickingObserver {
        fn update_market_data(&self, _snapshot: SharedSnapshot) {}

        fn set_market_data_ready(&self, _ready: bool) {}

        fn set_initialization_attempts(&self, _attempts: u32) {
            panic!("observer failure");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_observer_leaves_cleanup_reachable() {
        let market = ScriptedMarketData::new(&[false, false]);
        let initializer =
            MarketDataInitializer::new(market.clone(), Arc::new(PanickingObserver), fast_retry());

        initializer.initialize_market_data(1, 3).unwrap();
        let task = initializer.inner.bootstrap_task.lock().take().unwrap();
        let joined = task.await;
        assert!(joined.unwrap_err().is_panic());
        assert_eq!(market.refreshes(), 1);

        initializer.cleanup();
        assert_eq!(initializer.status().phase, InitializerPhase::Terminated);
    }

    #[test]
    fn outcome_accessors() {
        let snapshot = Arc::new(MarketSnapshot::loading());
        let degraded = BootstrapOutcome::Degraded {
            attempts: 3,
            snapshot: snapshot.clone(),
        };
        assert_eq!(degraded.attempts(), 3);
        assert!(degraded.is_ready());
        assert!(degraded.snapshot().is_some());

        let cancelled = BootstrapOutcome::Cancelled { attempts: 2 };
        assert!(!cancelled.is_ready());
        assert!(cancelled.snapshot().is_none());
    }
}

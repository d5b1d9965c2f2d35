//! Market Data Port (Driven Port)
//!
//! Contract of the process-wide market-data service. The service is shared
//! by every initializer; callers read and trigger it but never own it.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::snapshot::SharedSnapshot;

/// Port for the shared market-data cache.
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Last known snapshot, without triggering a fetch.
    fn snapshot(&self) -> SharedSnapshot;

    /// Run one fetch attempt and return the resulting snapshot.
    ///
    /// Failures are reported inside the snapshot's `errors`, never as a
    /// panic or an `Err`.
    async fn refresh(&self) -> SharedSnapshot;

    /// Receive every snapshot published after this call.
    fn subscribe(&self) -> broadcast::Receiver<SharedSnapshot>;
}

/// Shared market-data service handle.
pub type SharedMarketData = Arc<dyn MarketDataPort>;

//! Observer Port (Driver Port)
//!
//! Single result interface through which an initializer reports to the
//! application that owns it.

use std::sync::Arc;

use crate::domain::snapshot::SharedSnapshot;

/// Receives initializer notifications.
///
/// Notifications for one initializer arrive in event order. Implementations
/// may call back into the initializer (including `cleanup()`).
#[cfg_attr(test, mockall::automock)]
pub trait MarketDataObserver: Send + Sync {
    /// New market data to render.
    fn update_market_data(&self, snapshot: SharedSnapshot);

    /// Readiness flipped. The initializer only ever reports `true`.
    fn set_market_data_ready(&self, ready: bool);

    /// Bootstrap attempt `attempts` failed and a retry is scheduled.
    fn set_initialization_attempts(&self, attempts: u32);
}

/// Shared observer handle.
pub type SharedObserver = Arc<dyn MarketDataObserver>;

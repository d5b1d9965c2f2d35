//! Channel Observer
//!
//! Turns initializer notifications into [`InitializerEvent`]s on an mpsc
//! channel so the owning application can handle them on its own task.

use tokio::sync::mpsc;

use crate::application::ports::MarketDataObserver;
use crate::domain::snapshot::SharedSnapshot;

/// Notification forwarded by [`ChannelObserver`].
#[derive(Debug, Clone)]
pub enum InitializerEvent {
    /// New market data.
    MarketDataUpdated(SharedSnapshot),
    /// Readiness changed.
    ReadinessChanged(bool),
    /// A bootstrap attempt failed and a retry is scheduled.
    AttemptFailed(u32),
}

/// Observer that forwards notifications over an unbounded channel.
///
/// Sending never blocks, so notifications can be emitted while the
/// initializer holds its notification gate. Events sent after the receiver
/// is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<InitializerEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<InitializerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: InitializerEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Initializer event receiver dropped");
        }
    }
}

impl MarketDataObserver for ChannelObserver {
    fn update_market_data(&self, snapshot: SharedSnapshot) {
        self.send(InitializerEvent::MarketDataUpdated(snapshot));
    }

    fn set_market_data_ready(&self, ready: bool) {
        self.send(InitializerEvent::ReadinessChanged(ready));
    }

    fn set_initialization_attempts(&self, attempts: u32) {
        self.send(InitializerEvent::AttemptFailed(attempts));
    }
}

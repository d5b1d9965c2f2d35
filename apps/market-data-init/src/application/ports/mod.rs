//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `MarketDataPort`: Shared market-data cache with refresh and push updates
//! - `PriceSource`: Remote price endpoint a market-data service polls
//!
//! ## Driver Ports (Inbound)
//!
//! - `MarketDataObserver`: Notifications the initializer sends to its owner

mod market_data_port;
mod observer_port;
mod price_source_port;

pub use market_data_port::{MarketDataPort, SharedMarketData};
#[cfg(test)]
pub use observer_port::MockMarketDataObserver;
pub use observer_port::{MarketDataObserver, SharedObserver};
pub use price_source_port::{PriceSource, PriceSourceError, PriceTable};

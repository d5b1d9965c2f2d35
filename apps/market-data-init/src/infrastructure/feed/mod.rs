//! Market Data Feed Adapters
//!
//! - [`PollingMarketDataService`]: process-wide snapshot cache implementing
//!   [`MarketDataPort`](crate::application::ports::MarketDataPort)
//! - [`HttpPriceSource`]: 24h ticker endpoint implementing
//!   [`PriceSource`](crate::application::ports::PriceSource)

mod http;
mod service;

pub use http::HttpPriceSource;
pub use service::{FeedConfig, MIN_POLL_INTERVAL, PollingMarketDataService};

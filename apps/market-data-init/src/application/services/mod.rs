//! Application Services
//!
//! - `MarketDataInitializer`: Bootstrap retry sequence and update monitoring

mod initializer;

pub use initializer::{
    BootstrapOutcome, InitializerError, InitializerStatus, MarketDataInitializer, MonitorHandle,
};

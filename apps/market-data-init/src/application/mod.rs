//! Application Layer - Use cases and port definitions.
//!
//! The bootstrap/monitoring use case lives here together with the ports it
//! drives (market data, price source) and the port it reports through
//! (observer).

/// Port interfaces for external systems (market data, price source, observer).
pub mod ports;

/// Application services (market-data initializer).
pub mod services;

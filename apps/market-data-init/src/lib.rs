#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::redundant_clone
    )
)]

//! Market Data Init - Feed Bootstrap and Monitoring
//!
//! Brings the process-wide market-data feed from "unready" to "ready" for a
//! signals screen: a bounded sequence of fetch attempts with a fail-open
//! fallback, followed by a monitoring subscription that forwards every newer
//! snapshot to the screen until it is torn down.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Snapshot types and bootstrap rules
//!   - `snapshot`: Prices, feed errors, immutable snapshots
//!   - `lifecycle`: Initialization state machine
//!   - `retry`: Backoff between bootstrap attempts
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Market data service, price source, observer
//!   - `services`: The market-data initializer
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: Polling market-data service and HTTP price source
//!   - `observer`: Channel-backed observer
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!   - `metrics`, `telemetry`: Prometheus and tracing
//!
//! # Data Flow
//!
//! ```text
//!  HTTP ticker ──► PollingMarketDataService ──► broadcast ──┐
//!                        ▲                                  │
//!                        │ refresh (bootstrap)              ▼
//!                  MarketDataInitializer ──► MarketDataObserver ──► screen
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Snapshot types and lifecycle rules with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::lifecycle::{InitializationState, InitializerPhase, LifecycleError};
pub use domain::retry::{RetryConfig, RetryPolicy};
pub use domain::snapshot::{
    FeedErrorKind, FeedErrorRecord, MarketSnapshot, PriceData, SharedSnapshot, Symbol,
};

// Ports and services
pub use application::ports::{
    MarketDataObserver, MarketDataPort, PriceSource, PriceSourceError, PriceTable,
    SharedMarketData, SharedObserver,
};
pub use application::services::{
    BootstrapOutcome, InitializerError, InitializerStatus, MarketDataInitializer, MonitorHandle,
};

// Infrastructure config
pub use infrastructure::config::{
    AppConfig, ConfigError, FeedSettings, InitializerSettings, MAX_INIT_ATTEMPTS, ServerSettings,
};

// Feed adapters
pub use infrastructure::feed::{FeedConfig, HttpPriceSource, PollingMarketDataService};
pub use infrastructure::observer::{ChannelObserver, InitializerEvent};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};

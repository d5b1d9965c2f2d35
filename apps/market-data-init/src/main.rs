//! Market Data Init Binary
//!
//! Runs the market-data bootstrap and monitoring sequence against a 24h
//! ticker feed and logs every notification the screen would receive.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-data-init
//! ```
//!
//! # Environment Variables
//!
//! ## Optional
//! - `MAX_INIT_ATTEMPTS`: Bootstrap attempt ceiling (default: 3)
//! - `INIT_RETRY_DELAY_INITIAL_MS`: First retry delay (default: 1000)
//! - `INIT_RETRY_DELAY_STEP_MS`: Added per further retry (default: 1000)
//! - `INIT_RETRY_DELAY_MAX_MS`: Single delay cap (default: 3000)
//! - `INIT_RETRY_TOTAL_BUDGET_MS`: Cap on summed delays (default: 10000)
//! - `INIT_RETRY_JITTER`: Jitter fraction 0.0-1.0 (default: 0.0)
//! - `MARKET_FEED_URL`: 24h ticker endpoint (default: Binance public API)
//! - `MARKET_FEED_SYMBOLS`: Comma-separated symbols (default: BTCUSDT,ETHUSDT,BNBUSDT,SOLUSDT,XRPUSDT)
//! - `MARKET_FEED_POLL_INTERVAL_MS`: Background refresh interval (default: 10000)
//! - `MARKET_FEED_TIMEOUT_MS`: Request timeout (default: 5000)
//! - `MARKET_FEED_MAX_ERRORS`: Feed errors kept per snapshot (default: 10)
//! - `HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: signals-market-data-init)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use market_data_init::infrastructure::health::{HealthServer, HealthServerState};
use market_data_init::infrastructure::telemetry;
use market_data_init::{
    AppConfig, ChannelObserver, FeedConfig, HttpPriceSource, InitializerEvent,
    MarketDataInitializer, MonitorHandle, PollingMarketDataService,
    SharedMarketData, init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let telemetry_guard = telemetry::init();

    tracing::info!(
        otel_exporting = telemetry_guard.is_exporting(),
        "Starting market data initializer"
    );

    // Initialize Prometheus metrics
    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder unavailable, metrics disabled");
    }

    let config = AppConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Shared market-data service
    let source = HttpPriceSource::new(
        config.feed.url.clone(),
        &config.feed.symbols,
        config.feed.request_timeout,
    )?;
    tracing::debug!(symbols = source.symbols().len(), "Price source ready");
    let service = Arc::new(PollingMarketDataService::new(
        Arc::new(source),
        FeedConfig {
            poll_interval: config.feed.poll_interval,
            max_error_history: config.feed.max_error_history,
            ..FeedConfig::default()
        },
    ));
    let market_data: SharedMarketData = service.clone();

    tokio::spawn(Arc::clone(&service).run(shutdown_token.child_token()));

    // Initializer reporting through a channel
    let (observer, events) = ChannelObserver::new();
    let initializer = Arc::new(MarketDataInitializer::new(
        Arc::clone(&market_data),
        Arc::new(observer),
        config.initializer.retry_config(),
    ));

    // Initialize health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&initializer),
        Arc::clone(&market_data),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Spawn event handler
    let handler_initializer = Arc::clone(&initializer);
    let handler = tokio::spawn(async move {
        handle_initializer_events(events, handler_initializer).await;
    });

    initializer.initialize_market_data(1, config.initializer.max_attempts)?;

    await_shutdown(shutdown_token).await;

    initializer.cleanup();
    handler.abort();

    tracing::info!(
        subscribers = service.subscriber_count(),
        "Market data initializer stopped"
    );
    Ok(())
}

/// Handle notifications from the initializer.
async fn handle_initializer_events(
    mut rx: mpsc::UnboundedReceiver<InitializerEvent>,
    initializer: Arc<MarketDataInitializer>,
) {
    let mut monitor: Option<MonitorHandle> = None;
    let mut latest = None;

    while let Some(event) = rx.recv().await {
        match event {
            InitializerEvent::AttemptFailed(attempt) => {
                tracing::info!(attempt, "Market data attempt failed, retrying");
            }
            InitializerEvent::MarketDataUpdated(snapshot) => {
                tracing::info!(
                    symbols = snapshot.symbol_count(),
                    errors = snapshot.errors.len(),
                    last_update = %snapshot.last_update,
                    "Market data updated"
                );
                latest = Some(snapshot);
            }
            InitializerEvent::ReadinessChanged(true) => {
                let Some(current) = latest.as_ref() else {
                    continue;
                };
                match initializer.monitor_data_updates(current) {
                    Ok(handle) => {
                        tracing::info!("Market data ready, monitoring updates");
                        monitor = Some(handle);
                    }
                    Err(e) => tracing::warn!(error = %e, "Could not start market data monitor"),
                }
            }
            InitializerEvent::ReadinessChanged(false) => {}
        }
    }

    if let Some(handle) = monitor {
        handle.cancel();
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &AppConfig) {
    tracing::info!(
        max_attempts = config.initializer.max_attempts,
        feed_url = %config.feed.url,
        symbols = %config.feed.symbols.join(","),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        retry = ?config.initializer.retry_config(),
        poll_interval_ms = u64::try_from(config.feed.poll_interval.as_millis()).unwrap_or(u64::MAX),
        "Bootstrap and polling settings"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}

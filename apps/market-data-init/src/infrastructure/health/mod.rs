//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, bootstrap status reporting, and Prometheus metrics.
//! Used by container orchestrators, load balancers, and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (market data ready)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::ports::SharedMarketData;
use crate::application::services::{InitializerStatus, MarketDataInitializer};
use crate::domain::snapshot::MarketSnapshot;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Bootstrap status.
    pub initializer: InitializerStatus,
    /// Market data cache status.
    pub feed: FeedStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Ready with a clean snapshot.
    Healthy,
    /// Ready, but fail-open or the feed is reporting errors.
    Degraded,
    /// Not ready.
    Unhealthy,
}

/// Market data cache status.
#[derive(Debug, Clone, Serialize)]
pub struct FeedStatus {
    /// Symbols with a price.
    pub symbols: usize,
    /// Whether no fetch has completed yet.
    pub loading: bool,
    /// When the current snapshot was produced.
    pub last_update: DateTime<Utc>,
    /// Outstanding feed errors.
    pub error_count: usize,
    /// Most recent feed error.
    pub last_error: Option<String>,
}

impl From<&MarketSnapshot> for FeedStatus {
    fn from(snapshot: &MarketSnapshot) -> Self {
        Self {
            symbols: snapshot.symbol_count(),
            loading: snapshot.is_loading,
            last_update: snapshot.last_update,
            error_count: snapshot.errors.len(),
            last_error: snapshot.last_error().map(|e| e.message.clone()),
        }
    }
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    initializer: Arc<MarketDataInitializer>,
    market_data: SharedMarketData,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        initializer: Arc<MarketDataInitializer>,
        market_data: SharedMarketData,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            initializer,
            market_data,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Routes served by [`HealthServer`].
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.initializer.is_ready() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let initializer = state.initializer.status();
    let snapshot = state.market_data.snapshot();
    let feed = FeedStatus::from(snapshot.as_ref());

    HealthResponse {
        status: determine_health_status(&initializer, &feed),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        initializer,
        feed,
    }
}

const fn determine_health_status(initializer: &InitializerStatus, feed: &FeedStatus) -> HealthStatus {
    if !initializer.ready {
        HealthStatus::Unhealthy
    } else if initializer.degraded || feed.error_count > 0 || feed.symbols == 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;
    use uuid::Uuid;

    use super::*;
    use crate::domain::lifecycle::InitializerPhase;

    fn initializer_status(ready: bool, degraded: bool) -> InitializerStatus {
        InitializerStatus {
            id: Uuid::nil(),
            phase: if ready {
                InitializerPhase::Ready
            } else {
                InitializerPhase::Bootstrapping
            },
            attempt: 1,
            max_attempts: 3,
            ready,
            degraded,
            monitoring: false,
        }
    }

    fn feed_status(symbols: usize, error_count: usize) -> FeedStatus {
        FeedStatus {
            symbols,
            loading: false,
            last_update: Utc::now(),
            error_count,
            last_error: None,
        }
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test_case(false, false, 5, 0, HealthStatus::Unhealthy ; "not ready")]
    #[test_case(true, false, 5, 0, HealthStatus::Healthy ; "ready and clean")]
    #[test_case(true, true, 0, 3, HealthStatus::Degraded ; "fail open")]
    #[test_case(true, false, 5, 1, HealthStatus::Degraded ; "ready with feed errors")]
    fn determine_status(
        ready: bool,
        degraded: bool,
        symbols: usize,
        errors: usize,
        expected: HealthStatus,
    ) {
        let status = determine_health_status(
            &initializer_status(ready, degraded),
            &feed_status(symbols, errors),
        );
        assert_eq!(status, expected);
    }

    #[test]
    fn feed_status_from_loading_snapshot() {
        let status = FeedStatus::from(&MarketSnapshot::loading());
        assert!(status.loading);
        assert_eq!(status.symbols, 0);
        assert!(status.last_error.is_none());
    }
}

//! Health Check Server - Liveness and Readiness Probes
//!
//! Exposes /live and /ready endpoints via axum 0.7 for Docker
//! health checks and monitoring. Readiness depends on the market
//! stream and the last portfolio sync.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;
use tracing::{info, instrument};

use crate::usecases::stream_transport::{ConnectionState, TransportStatus};

/// Shared health state polled by readiness probes.
#[derive(Debug, Clone)]
pub struct HealthState {
    /// Whether the stream is open, or idle with nothing to stream.
    pub stream_healthy: Arc<AtomicBool>,
    /// Whether the last portfolio sync succeeded.
    pub sync_healthy: Arc<AtomicBool>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state.
    ///
    /// The stream starts unhealthy until the first status arrives.
    pub fn new() -> Self {
        Self {
            stream_healthy: Arc::new(AtomicBool::new(false)),
            sync_healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Derive stream health from a transport status.
    pub fn observe_stream(&self, status: &TransportStatus) {
        let healthy = status.connected || status.state == ConnectionState::Idle;
        self.stream_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Record the outcome of a portfolio sync.
    pub fn observe_sync(&self, ok: bool) {
        self.sync_healthy.store(ok, Ordering::Relaxed);
    }

    /// Check if the system is ready to serve traffic.
    pub fn is_ready(&self) -> bool {
        self.stream_healthy.load(Ordering::Relaxed) && self.sync_healthy.load(Ordering::Relaxed)
    }
}

/// Axum-based health check HTTP server.
pub struct HealthServer {
    /// Health state shared with all components.
    state: Arc<HealthState>,
    /// Bind port (default 8080 from config).
    port: u16,
}

impl HealthServer {
    /// Create a new health server.
    pub fn new(state: Arc<HealthState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Start the health check server.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(Arc::clone(&self.state));

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: 200 only while stream and sync are healthy.
    async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
        if state.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(state: ConnectionState) -> TransportStatus {
        TransportStatus {
            state,
            connected: state == ConnectionState::Open,
            ..TransportStatus::default()
        }
    }

    #[test]
    fn test_not_ready_before_first_status() {
        assert!(!HealthState::new().is_ready());
    }

    #[test]
    fn test_ready_follows_stream_state() {
        let health = HealthState::new();
        health.observe_stream(&status(ConnectionState::Open));
        assert!(health.is_ready());

        health.observe_stream(&status(ConnectionState::Reconnecting));
        assert!(!health.is_ready());

        health.observe_stream(&status(ConnectionState::Idle));
        assert!(health.is_ready());

        health.observe_stream(&status(ConnectionState::Failed));
        assert!(!health.is_ready());
    }

    #[test]
    fn test_failed_sync_blocks_readiness() {
        let health = HealthState::new();
        health.observe_stream(&status(ConnectionState::Open));
        health.observe_sync(false);
        assert!(!health.is_ready());
        health.observe_sync(true);
        assert!(health.is_ready());
    }
}

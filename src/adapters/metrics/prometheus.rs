//! Prometheus Metrics Registry - Tracker Observability
//!
//! Registers and exposes Prometheus metrics on :9090 for Grafana
//! dashboards. Covers stream health, subscription size, portfolio
//! valuation and snapshot sync latency.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::usecases::position_tracker::PortfolioSummary;
use crate::usecases::stream_transport::{StreamStatsSnapshot, TransportStatus};

/// Centralized Prometheus metrics for the position tracker.
///
/// All metrics follow the naming convention `position_tracker_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Frames received from the market stream.
    pub frames_total: IntCounter,
    /// Frames that decoded to nothing usable.
    pub decode_drops_total: IntCounter,
    /// Reconnect attempts scheduled.
    pub reconnects_total: IntCounter,
    /// Stream connection status (1 = open, 0 = otherwise).
    pub stream_connected: IntGauge,
    /// Markets in the active subscription.
    pub subscribed_markets: IntGauge,
    /// Current portfolio market value in USDC.
    pub market_value: Gauge,
    /// Current unrealized PnL gauge.
    pub unrealized_pnl: Gauge,
    /// Realized PnL from the trade ledger.
    pub realized_pnl: Gauge,
    /// Open positions counted in the last summary.
    pub open_positions: IntGauge,
    /// Snapshot sync duration (seconds).
    pub sync_duration_seconds: Histogram,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let frames_total = IntCounter::new(
            "position_tracker_stream_frames_total",
            "Frames received from the market stream",
        )?;
        let decode_drops_total = IntCounter::new(
            "position_tracker_stream_decode_drops_total",
            "Stream frames dropped as undecodable",
        )?;
        let reconnects_total = IntCounter::new(
            "position_tracker_stream_reconnects_total",
            "Stream reconnect attempts scheduled",
        )?;
        let stream_connected = IntGauge::new(
            "position_tracker_stream_connected",
            "Stream connection status (1=open, 0=not open)",
        )?;
        let subscribed_markets = IntGauge::new(
            "position_tracker_subscribed_markets",
            "Markets in the active stream subscription",
        )?;
        let market_value = Gauge::new(
            "position_tracker_market_value_usdc",
            "Current portfolio market value in USDC",
        )?;
        let unrealized_pnl = Gauge::new(
            "position_tracker_unrealized_pnl_usdc",
            "Current unrealized PnL in USDC",
        )?;
        let realized_pnl = Gauge::new(
            "position_tracker_realized_pnl_usdc",
            "Realized PnL from trade activity in USDC",
        )?;
        let open_positions = IntGauge::new(
            "position_tracker_open_positions",
            "Open positions in the latest snapshot",
        )?;
        let sync_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "position_tracker_sync_duration_seconds",
                "Portfolio snapshot sync duration in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(frames_total.clone()))?;
        registry.register(Box::new(decode_drops_total.clone()))?;
        registry.register(Box::new(reconnects_total.clone()))?;
        registry.register(Box::new(stream_connected.clone()))?;
        registry.register(Box::new(subscribed_markets.clone()))?;
        registry.register(Box::new(market_value.clone()))?;
        registry.register(Box::new(unrealized_pnl.clone()))?;
        registry.register(Box::new(realized_pnl.clone()))?;
        registry.register(Box::new(open_positions.clone()))?;
        registry.register(Box::new(sync_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            frames_total,
            decode_drops_total,
            reconnects_total,
            stream_connected,
            subscribed_markets,
            market_value,
            unrealized_pnl,
            realized_pnl,
            open_positions,
            sync_duration_seconds,
        })
    }

    /// Bring the stream counters up to a transport stats snapshot.
    ///
    /// Counters only move forward; a snapshot behind the counter is ignored.
    pub fn record_stream(&self, stats: StreamStatsSnapshot) {
        advance(&self.frames_total, stats.frames);
        advance(&self.decode_drops_total, stats.decode_drops);
        advance(&self.reconnects_total, stats.reconnects);
    }

    /// Mirror the transport status into gauges.
    pub fn record_status(&self, status: &TransportStatus) {
        self.stream_connected.set(i64::from(status.connected));
        self.subscribed_markets
            .set(i64::try_from(status.subscription.len()).unwrap_or(i64::MAX));
    }

    /// Mirror portfolio totals into gauges.
    pub fn record_summary(&self, summary: &PortfolioSummary) {
        self.market_value.set(to_f64(summary.unrealized.market_value));
        self.unrealized_pnl.set(to_f64(summary.unrealized.unrealized_pnl));
        self.realized_pnl.set(to_f64(summary.realized_pnl));
        self.open_positions
            .set(i64::try_from(summary.open_positions).unwrap_or(i64::MAX));
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move {
                    match metrics.render() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => {
                            warn!(error = %e, "Failed to encode metrics");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

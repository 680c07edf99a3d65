//! Polymarket Position Tracker - Entry Point
//!
//! Initializes configuration, logging, the market stream and the
//! portfolio sync. Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Load API credentials from env vars (POLY_API_KEY, POLY_API_SECRET, POLY_PASSPHRASE)
//! 4. Spawn the stream transport (WebSocket + reconnect actor)
//! 5. Open the watchlist subscription
//! 6. Spawn portfolio sync (paginated REST snapshot pull)
//! 7. Spawn config watcher (watchlist hot reload)
//! 8. Spawn health (/live, /ready) and Prometheus servers
//! 9. Spawn the valuation loop (live prices into P&L)
//! 10. Wait for SIGINT, then close the stream and stop every task

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use position_tracker::adapters::api::{ApiClient, ApiClientConfig, HmacAuth, RestPortfolio};
use position_tracker::adapters::feeds::WsConnector;
use position_tracker::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use position_tracker::config::{self, hot_reload::ConfigWatcher, AppConfig};
use position_tracker::domain::SeriesConfig;
use position_tracker::usecases::{
  MarketStore, PortfolioSync, PositionTracker, StreamHandle, StreamTransport, SubscriptionManager,
  TransportConfig,
};

const CONFIG_PATH: &str = "config.toml";

/// Valuation and metrics refresh period.
const VALUATION_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
  // ── 1. Load configuration from config.toml ──────────────
  let config = config::loader::load_config(CONFIG_PATH).context("Failed to load configuration")?;

  // ── 2. Initialize structured JSON logging ───────────────
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.tracker.log_level)),
    )
    .json()
    .init();

  info!(
    name = %config.tracker.name,
    version = env!("CARGO_PKG_VERSION"),
    watched = config.watchlist.markets.len(),
    "Starting Polymarket position tracker"
  );

  let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

  // ── 3. Load API credentials from env vars ───────────────
  let auth = Arc::new(HmacAuth::from_env().context("Failed to load API credentials from env")?);

  // ── 4. Stream transport ─────────────────────────────────
  let store = MarketStore::shared(SeriesConfig::from(&config.cache));
  let (transport, stream) = StreamTransport::new(
    TransportConfig::from(&config.stream),
    Arc::new(WsConnector::new(config.stream.ws_url.clone())),
    auth.clone(),
    Arc::clone(&store),
  );
  let transport_handle = tokio::spawn(transport.run(shutdown_tx.subscribe()));

  // ── 5. Initial subscription from the watchlist ──────────
  let subscriptions = Arc::new(Mutex::new(SubscriptionManager::new(
    stream.clone(),
    config.watchlist.as_set(),
  )));
  if let Err(e) = subscriptions.lock().await.reconcile().await {
    warn!(error = %e, "Initial subscription failed");
  }

  // ── 6. Portfolio sync ───────────────────────────────────
  let client = Arc::new(
    ApiClient::new(auth, ApiClientConfig::from(&config.api))
      .context("Failed to create API client")?,
  );
  let tracker = Arc::new(RwLock::new(PositionTracker::new()));
  let sync = Arc::new(PortfolioSync::new(
    Arc::new(RestPortfolio::new(client, &config.api)),
    Arc::clone(&tracker),
    Arc::clone(&subscriptions),
    Duration::from_secs(config.api.sync_interval_seconds),
  ));
  let sync_ref = Arc::clone(&sync);
  let sync_shutdown = shutdown_tx.subscribe();
  let sync_handle = tokio::spawn(async move {
    if let Err(e) = sync_ref.run(sync_shutdown).await {
      error!(error = %e, "Portfolio sync task failed");
    }
  });

  // ── 7. Config hot reload ────────────────────────────────
  let (mut watcher, config_rx) = ConfigWatcher::new(CONFIG_PATH, config.clone());
  let watcher_shutdown = shutdown_tx.subscribe();
  tokio::spawn(async move {
    if let Err(e) = watcher.run(watcher_shutdown).await {
      error!(error = %e, "Config watcher failed");
    }
  });
  tokio::spawn(apply_config_reloads(
    config_rx,
    Arc::clone(&subscriptions),
    shutdown_tx.subscribe(),
  ));

  // ── 8. Health and metrics servers ───────────────────────
  let health = Arc::new(HealthState::new());
  let metrics = Arc::new(MetricsRegistry::new().context("Failed to create metrics registry")?);

  let health_server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
  let health_shutdown = shutdown_tx.subscribe();
  tokio::spawn(async move {
    if let Err(e) = health_server.run(health_shutdown).await {
      error!(error = %e, "Health server failed");
    }
  });

  if config.metrics.enabled {
    let metrics_ref = Arc::clone(&metrics);
    let bind_address = config.metrics.bind_address.clone();
    let metrics_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
      if let Err(e) = metrics_ref.serve(bind_address, metrics_shutdown).await {
        error!(error = %e, "Metrics server failed");
      }
    });
  }

  // ── 9. Valuation loop ───────────────────────────────────
  let valuation_handle = tokio::spawn(run_valuation(
    stream.clone(),
    Arc::clone(&tracker),
    Arc::clone(&sync),
    Arc::clone(&health),
    Arc::clone(&metrics),
    shutdown_tx.subscribe(),
  ));

  info!("All tasks spawned, tracker is running");

  // ── 10. Wait for SIGINT ─────────────────────────────────
  signal::ctrl_c().await.context("Failed to listen for SIGINT")?;
  info!("SIGINT received, initiating graceful shutdown");

  if let Err(e) = stream.close().await {
    warn!(error = %e, "Failed to close stream");
  }
  let _ = shutdown_tx.send(());

  let _ = tokio::time::timeout(Duration::from_secs(5), transport_handle).await;
  let _ = tokio::time::timeout(Duration::from_secs(5), sync_handle).await;
  let _ = tokio::time::timeout(Duration::from_secs(5), valuation_handle).await;

  info!("Shutdown complete");
  Ok(())
}

/// Push watchlist edits from config reloads into the subscription.
async fn apply_config_reloads(
  mut config_rx: tokio::sync::watch::Receiver<AppConfig>,
  subscriptions: Arc<Mutex<SubscriptionManager>>,
  mut shutdown_rx: broadcast::Receiver<()>,
) {
  loop {
    tokio::select! {
      biased;
      _ = shutdown_rx.recv() => return,
      changed = config_rx.changed() => {
        if changed.is_err() {
          return;
        }
        let watched = config_rx.borrow_and_update().watchlist.as_set();
        let mut subscriptions = subscriptions.lock().await;
        subscriptions.set_watched(watched);
        if let Err(e) = subscriptions.reconcile().await {
          warn!(error = %e, "Reconcile after config reload failed");
        }
      }
    }
  }
}

/// Refresh valuations, health and metrics on a fixed period.
async fn run_valuation(
  stream: StreamHandle,
  tracker: Arc<RwLock<PositionTracker>>,
  sync: Arc<PortfolioSync<RestPortfolio>>,
  health: Arc<HealthState>,
  metrics: Arc<MetricsRegistry>,
  mut shutdown_rx: broadcast::Receiver<()>,
) {
  let mut status_rx = stream.watch_status();
  let mut sync_rx = sync.watch_status();
  let mut ticker = tokio::time::interval(VALUATION_INTERVAL);

  loop {
    tokio::select! {
      biased;
      _ = shutdown_rx.recv() => {
        info!("Valuation loop shutting down");
        return;
      }
      changed = status_rx.changed() => {
        if changed.is_err() {
          return;
        }
        let status = status_rx.borrow_and_update().clone();
        health.observe_stream(&status);
        metrics.record_status(&status);
        if let Some(e) = &status.error {
          error!(error = %e, state = ?status.state, "Stream needs attention");
        }
      }
      changed = sync_rx.changed() => {
        if changed.is_err() {
          continue;
        }
        let status = sync_rx.borrow_and_update().clone();
        health.observe_sync(status.last_ok);
        metrics.sync_duration_seconds.observe(status.last_duration.as_secs_f64());
      }
      _ = ticker.tick() => {
        let store = stream.store().read().await;
        let summary = {
          let mut tracker = tracker.write().await;
          tracker.observe_prices(&store);
          tracker.summary(&store)
        };
        drop(store);

        metrics.record_stream(stream.stats());
        metrics.record_summary(&summary);
        debug!(
          market_value = %summary.unrealized.market_value,
          unrealized_pnl = %summary.unrealized.unrealized_pnl,
          realized_pnl = %summary.realized_pnl,
          open_positions = summary.open_positions,
          "Portfolio valued"
        );
      }
    }
  }
}

//! Configuration Module - TOML-based Tracker Configuration
//!
//! Loads and validates configuration from `config.toml`. API secrets
//! never live here; they come from environment variables.
//! Every section is optional and falls back to the defaults below.

pub mod hot_reload;
pub mod loader;

use serde::Deserialize;

use crate::domain::subscription::{SubscriptionSet, MAX_SUBSCRIPTIONS};
use crate::domain::time_series::{
  SeriesConfig, DEFAULT_MAX_LEN, DEFAULT_MIN_SAMPLE_INTERVAL_MS, DEFAULT_MOMENTUM_WINDOW,
  DEFAULT_NOISE_THRESHOLD_PCT,
};

/// Top-level tracker configuration.
///
/// Loaded from `config.toml` at startup and validated before any task
/// is spawned.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AppConfig {
  /// Tracker identity and logging.
  #[serde(default)]
  pub tracker: TrackerConfig,
  /// Market stream connection.
  #[serde(default)]
  pub stream: StreamConfig,
  /// Price history cache.
  #[serde(default)]
  pub cache: CacheConfig,
  /// REST snapshot endpoints.
  #[serde(default)]
  pub api: ApiConfig,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
  /// Markets followed without holding a position.
  #[serde(default)]
  pub watchlist: WatchlistConfig,
}

/// Tracker identity configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackerConfig {
  /// Human-readable instance name.
  #[serde(default = "default_name")]
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

impl Default for TrackerConfig {
  fn default() -> Self {
    Self {
      name: default_name(),
      log_level: default_log_level(),
    }
  }
}

/// Market stream configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamConfig {
  /// WebSocket URL of the market stream.
  #[serde(default = "default_ws_url")]
  pub ws_url: String,
  /// Subscription type sent in the subscribe directive.
  #[serde(default = "default_subscription_type")]
  pub subscription_type: String,
  /// Upstream limit on markets per connection.
  #[serde(default = "default_max_subscriptions")]
  pub max_subscriptions: usize,
  /// Handshake deadline (milliseconds).
  #[serde(default = "default_connect_timeout_ms")]
  pub connect_timeout_ms: u64,
  /// Interval of the transport heartbeat (milliseconds).
  #[serde(default = "default_heartbeat_interval_ms")]
  pub heartbeat_interval_ms: u64,
  /// First reconnect delay (milliseconds).
  #[serde(default = "default_reconnect_base_ms")]
  pub reconnect_base_ms: u64,
  /// Reconnect delay cap (milliseconds).
  #[serde(default = "default_reconnect_max_ms")]
  pub reconnect_max_ms: u64,
  /// Automatic reconnects before giving up.
  #[serde(default = "default_max_reconnect_attempts")]
  pub max_reconnect_attempts: u32,
}

impl Default for StreamConfig {
  fn default() -> Self {
    Self {
      ws_url: default_ws_url(),
      subscription_type: default_subscription_type(),
      max_subscriptions: default_max_subscriptions(),
      connect_timeout_ms: default_connect_timeout_ms(),
      heartbeat_interval_ms: default_heartbeat_interval_ms(),
      reconnect_base_ms: default_reconnect_base_ms(),
      reconnect_max_ms: default_reconnect_max_ms(),
      max_reconnect_attempts: default_max_reconnect_attempts(),
    }
  }
}

/// Price history cache configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CacheConfig {
  /// Maximum points retained per series.
  #[serde(default = "default_max_len")]
  pub max_len: usize,
  /// Minimum spacing for repeated equal values (milliseconds).
  #[serde(default = "default_min_sample_interval_ms")]
  pub min_sample_interval_ms: i64,
  /// Points compared by the momentum indicator.
  #[serde(default = "default_momentum_window")]
  pub momentum_window: usize,
  /// Momentum below this percentage is noise.
  #[serde(default = "default_noise_threshold_pct")]
  pub noise_threshold_pct: f64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      max_len: default_max_len(),
      min_sample_interval_ms: default_min_sample_interval_ms(),
      momentum_window: default_momentum_window(),
      noise_threshold_pct: default_noise_threshold_pct(),
    }
  }
}

impl From<&CacheConfig> for SeriesConfig {
  fn from(config: &CacheConfig) -> Self {
    Self {
      max_len: config.max_len,
      min_sample_interval_ms: config.min_sample_interval_ms,
      momentum_window: config.momentum_window,
      noise_threshold_pct: config.noise_threshold_pct,
    }
  }
}

/// REST snapshot endpoint configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiConfig {
  /// REST API base URL.
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// Path of the positions listing.
  #[serde(default = "default_positions_path")]
  pub positions_path: String,
  /// Path of the activity listing.
  #[serde(default = "default_activity_path")]
  pub activity_path: String,
  /// Request timeout in seconds.
  #[serde(default = "default_timeout")]
  pub timeout_seconds: u64,
  /// Interval between snapshot pulls in seconds.
  #[serde(default = "default_sync_interval")]
  pub sync_interval_seconds: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      positions_path: default_positions_path(),
      activity_path: default_activity_path(),
      timeout_seconds: default_timeout(),
      sync_interval_seconds: default_sync_interval(),
    }
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

/// Watched markets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WatchlistConfig {
  /// Market slugs, in priority order.
  #[serde(default)]
  pub markets: Vec<String>,
}

impl WatchlistConfig {
  /// The watchlist as an ordered, de-duplicated set.
  pub fn as_set(&self) -> SubscriptionSet {
    self.markets.iter().map(String::as_str).collect()
  }
}

// Default value functions for serde

fn default_name() -> String {
  "position-tracker".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_ws_url() -> String {
  "wss://ws-live-data.polymarket.com".to_string()
}

fn default_subscription_type() -> String {
  "market_data_lite".to_string()
}

fn default_max_subscriptions() -> usize {
  MAX_SUBSCRIPTIONS
}

fn default_connect_timeout_ms() -> u64 {
  10_000
}

fn default_heartbeat_interval_ms() -> u64 {
  15_000
}

fn default_reconnect_base_ms() -> u64 {
  1_000
}

fn default_reconnect_max_ms() -> u64 {
  30_000
}

fn default_max_reconnect_attempts() -> u32 {
  5
}

fn default_max_len() -> usize {
  DEFAULT_MAX_LEN
}

fn default_min_sample_interval_ms() -> i64 {
  DEFAULT_MIN_SAMPLE_INTERVAL_MS
}

fn default_momentum_window() -> usize {
  DEFAULT_MOMENTUM_WINDOW
}

fn default_noise_threshold_pct() -> f64 {
  DEFAULT_NOISE_THRESHOLD_PCT
}

fn default_base_url() -> String {
  "https://data-api.polymarket.com".to_string()
}

fn default_positions_path() -> String {
  "/positions".to_string()
}

fn default_activity_path() -> String {
  "/activity".to_string()
}

fn default_timeout() -> u64 {
  30
}

fn default_sync_interval() -> u64 {
  30
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}

//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    name = %config.tracker.name,
    watched = config.watchlist.markets.len(),
    ws_url = %config.stream.ws_url,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content).context("Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Non-empty endpoints and paths
/// - Positive intervals and timeouts
/// - Subscription limit within the upstream maximum
/// - Sensible cache bounds
fn validate_config(config: &AppConfig) -> Result<()> {
  // Stream validation
  let stream = &config.stream;
  anyhow::ensure!(
    stream.ws_url.starts_with("ws://") || stream.ws_url.starts_with("wss://"),
    "Stream ws_url must be a ws:// or wss:// URL, got {}",
    stream.ws_url
  );
  anyhow::ensure!(
    !stream.subscription_type.is_empty(),
    "Stream subscription_type must not be empty"
  );
  anyhow::ensure!(
    stream.max_subscriptions > 0
      && stream.max_subscriptions <= crate::domain::MAX_SUBSCRIPTIONS,
    "max_subscriptions must be in (0, {}], got {}",
    crate::domain::MAX_SUBSCRIPTIONS,
    stream.max_subscriptions
  );
  anyhow::ensure!(stream.connect_timeout_ms > 0, "connect_timeout_ms must be positive");
  anyhow::ensure!(
    stream.heartbeat_interval_ms > 0,
    "heartbeat_interval_ms must be positive"
  );
  anyhow::ensure!(
    stream.reconnect_base_ms > 0 && stream.reconnect_base_ms <= stream.reconnect_max_ms,
    "reconnect_base_ms must be positive and <= reconnect_max_ms ({} > {})",
    stream.reconnect_base_ms,
    stream.reconnect_max_ms
  );

  // Cache validation
  let cache = &config.cache;
  anyhow::ensure!(cache.max_len >= 2, "cache max_len must be at least 2, got {}", cache.max_len);
  anyhow::ensure!(
    cache.min_sample_interval_ms >= 0,
    "min_sample_interval_ms must not be negative"
  );
  anyhow::ensure!(
    cache.momentum_window >= 2,
    "momentum_window must be at least 2, got {}",
    cache.momentum_window
  );
  anyhow::ensure!(
    cache.noise_threshold_pct.is_finite() && cache.noise_threshold_pct >= 0.0,
    "noise_threshold_pct must be a non-negative number"
  );

  // API validation
  let api = &config.api;
  anyhow::ensure!(!api.base_url.is_empty(), "API base_url must not be empty");
  anyhow::ensure!(
    api.positions_path.starts_with('/') && api.activity_path.starts_with('/'),
    "API paths must start with '/'"
  );
  anyhow::ensure!(api.timeout_seconds > 0, "API timeout_seconds must be positive");
  anyhow::ensure!(
    api.sync_interval_seconds > 0,
    "API sync_interval_seconds must be positive"
  );

  // Watchlist validation
  for (i, market) in config.watchlist.markets.iter().enumerate() {
    anyhow::ensure!(!market.trim().is_empty(), "Watchlist entry {i} is empty");
  }

  Ok(())
}

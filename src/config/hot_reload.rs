//! Config Hot-Reload: Poll config.toml for Changes Every 60s
//!
//! Periodically re-reads config.toml and compares it with the last
//! loaded content. On change, the new config is validated and broadcast
//! on a `tokio::sync::watch` channel. The binary uses this to pick up
//! watchlist edits without a restart.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

use super::AppConfig;

/// Default poll interval.
pub const RELOAD_INTERVAL: Duration = Duration::from_secs(60);

/// Watches config.toml for changes and broadcasts updates.
///
/// Polls instead of using a filesystem watcher, which behaves
/// differently across Linux/macOS/Docker volumes.
pub struct ConfigWatcher {
    /// Path to config.toml.
    config_path: String,
    /// Poll interval.
    interval: Duration,
    /// Watch channel sender for config updates.
    config_tx: watch::Sender<AppConfig>,
    /// Hash of the last loaded file content.
    last_hash: Option<u64>,
}

impl ConfigWatcher {
    /// Create a new config watcher.
    ///
    /// Returns the watcher and a receiver notified on every reload.
    pub fn new(config_path: &str, initial_config: AppConfig) -> (Self, watch::Receiver<AppConfig>) {
        Self::with_interval(config_path, initial_config, RELOAD_INTERVAL)
    }

    /// Same as [`Self::new`] with a custom poll interval.
    pub fn with_interval(
        config_path: &str,
        initial_config: AppConfig,
        interval: Duration,
    ) -> (Self, watch::Receiver<AppConfig>) {
        let (config_tx, config_rx) = watch::channel(initial_config);

        let watcher = Self {
            config_path: config_path.to_string(),
            interval,
            config_tx,
            last_hash: None,
        };

        (watcher, config_rx)
    }

    /// Run the poll loop until shutdown.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(
            path = %self.config_path,
            interval_s = self.interval.as_secs(),
            "Config watcher started"
        );

        self.last_hash = self.compute_hash().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Config watcher shutting down");
                    return Ok(());
                }
                () = tokio::time::sleep(self.interval) => {
                    self.check_and_reload().await;
                }
            }
        }
    }

    /// Reload if the file content changed.
    async fn check_and_reload(&mut self) {
        let new_hash = self.compute_hash().await;

        if new_hash == self.last_hash {
            debug!("Config unchanged");
            return;
        }

        info!("Config change detected, reloading");

        match super::loader::load_config(&self.config_path) {
            Ok(new_config) => {
                self.last_hash = new_hash;
                if self.config_tx.send(new_config).is_err() {
                    warn!("No config receivers, update dropped");
                } else {
                    info!("Config reloaded successfully");
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to reload config, keeping current");
            }
        }
    }

    /// Hash of the file contents, `None` if unreadable.
    async fn compute_hash(&self) -> Option<u64> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let content = tokio::fs::read_to_string(&self.config_path).await.ok()?;

        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        Some(hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("{name}-{}.toml", std::process::id()))
    }

    #[tokio::test]
    async fn test_reload_broadcasts_new_watchlist() {
        let path = temp_path("tracker-reload");
        std::fs::write(&path, "[watchlist]\nmarkets = [\"game-1\"]\n").unwrap();
        let path_str = path.to_string_lossy().to_string();

        let (mut watcher, mut rx) = ConfigWatcher::new(&path_str, AppConfig::default());
        watcher.last_hash = watcher.compute_hash().await;

        std::fs::write(&path, "[watchlist]\nmarkets = [\"game-1\", \"game-2\"]\n").unwrap();
        watcher.check_and_reload().await;

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().watchlist.markets.len(), 2);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_invalid_reload_keeps_current() {
        let path = temp_path("tracker-reload-bad");
        std::fs::write(&path, "").unwrap();
        let path_str = path.to_string_lossy().to_string();

        let (mut watcher, rx) = ConfigWatcher::new(&path_str, AppConfig::default());
        watcher.last_hash = watcher.compute_hash().await;

        std::fs::write(&path, "[stream]\nmax_subscriptions = 0\n").unwrap();
        watcher.check_and_reload().await;

        assert!(!rx.has_changed().unwrap());
        let _ = std::fs::remove_file(&path);
    }
}

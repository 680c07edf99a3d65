//! Portfolio Sync - Periodic Authoritative Snapshot Pull
//!
//! Pulls every page of positions and trade activity, hands them to the
//! position tracker, then reconciles stream subscriptions with the
//! markets now held.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, instrument, warn};

use crate::domain::ledger::{TradeFill, TradeLedger};
use crate::domain::valuation::Position;
use crate::ports::portfolio::{Page, PortfolioSource};

use super::position_tracker::PositionTracker;
use super::subscription_manager::{ReconcileAction, SubscriptionManager};

/// Upper bound on pages per listing.
const MAX_PAGES: usize = 1_000;

/// Outcome of one sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
  /// Positions received (closed ones included).
  pub positions: usize,
  /// Trade fills replayed into the ledger; `None` if activity failed.
  pub fills: Option<usize>,
  /// Subscription change requested.
  pub action: ReconcileAction,
}

/// Result of the latest pass, published for health and metrics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatus {
  /// Passes attempted.
  pub runs: u64,
  /// Whether the latest pass succeeded.
  pub last_ok: bool,
  /// Wall time of the latest pass.
  pub last_duration: Duration,
  /// Report of the latest successful pass.
  pub last_report: Option<SyncReport>,
}

/// Follow `next_cursor` until `eof`.
///
/// Stops early on a missing or repeated cursor, so a misbehaving server
/// cannot loop the client forever.
pub async fn collect_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>>
where
  F: FnMut(Option<String>) -> Fut,
  Fut: Future<Output = Result<Page<T>>>,
{
  let mut items = Vec::new();
  let mut seen = HashSet::new();
  let mut cursor = None;

  for _ in 0..MAX_PAGES {
    let page = fetch(cursor.take()).await?;
    items.extend(page.items);
    if page.eof {
      return Ok(items);
    }
    match page.next_cursor {
      Some(next) if seen.insert(next.clone()) => cursor = Some(next),
      Some(next) => {
        warn!(cursor = %next, "Repeated page cursor, stopping pagination");
        return Ok(items);
      }
      None => return Ok(items),
    }
  }

  warn!(pages = MAX_PAGES, "Page limit reached, stopping pagination");
  Ok(items)
}

/// Periodic snapshot pull.
pub struct PortfolioSync<S: PortfolioSource> {
  /// Snapshot source.
  source: Arc<S>,
  /// Where positions and the ledger land.
  tracker: Arc<RwLock<PositionTracker>>,
  /// Subscription inputs.
  subscriptions: Arc<Mutex<SubscriptionManager>>,
  /// Pull interval.
  interval: Duration,
  /// Latest pass outcome.
  status_tx: watch::Sender<SyncStatus>,
}

impl<S: PortfolioSource> PortfolioSync<S> {
  /// Create a sync loop.
  pub fn new(
    source: Arc<S>,
    tracker: Arc<RwLock<PositionTracker>>,
    subscriptions: Arc<Mutex<SubscriptionManager>>,
    interval: Duration,
  ) -> Self {
    let (status_tx, _) = watch::channel(SyncStatus::default());
    Self {
      source,
      tracker,
      subscriptions,
      interval,
      status_tx,
    }
  }

  /// Receiver notified after every pass.
  pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
    self.status_tx.subscribe()
  }

  /// All position pages.
  pub async fn fetch_all_positions(&self) -> Result<Vec<Position>> {
    let source = &self.source;
    collect_pages(move |cursor| source.positions_page(cursor)).await
  }

  /// All activity pages.
  pub async fn fetch_all_activity(&self) -> Result<Vec<TradeFill>> {
    let source = &self.source;
    collect_pages(move |cursor| source.activity_page(cursor)).await
  }

  /// One full pass: positions, activity, reconcile.
  ///
  /// A positions failure aborts the pass. An activity failure keeps the
  /// previous ledger and the pass continues.
  #[instrument(skip(self))]
  pub async fn sync_once(&self) -> Result<SyncReport> {
    let positions = self.fetch_all_positions().await?;
    let position_count = positions.len();

    let fills = match self.fetch_all_activity().await {
      Ok(fills) => Some(fills),
      Err(e) => {
        warn!(error = %e, "Activity fetch failed, keeping previous ledger");
        None
      }
    };
    let fill_count = fills.as_ref().map(Vec::len);

    let held = {
      let mut tracker = self.tracker.write().await;
      tracker.replace_positions(positions);
      if let Some(fills) = fills {
        tracker.replace_ledger(TradeLedger::from_fills(&fills));
      }
      tracker.open_markets()
    };
    let held_count = held.len();

    let action = {
      let mut subscriptions = self.subscriptions.lock().await;
      subscriptions.set_held(held);
      subscriptions.reconcile().await?
    };

    info!(
      positions = position_count,
      held = held_count,
      fills = ?fill_count,
      ?action,
      "Portfolio synced"
    );

    Ok(SyncReport {
      positions: position_count,
      fills: fill_count,
      action,
    })
  }

  /// Sync immediately, then on every interval until shutdown.
  #[instrument(skip(self, shutdown_rx), name = "portfolio_sync")]
  pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
    let mut ticker = tokio::time::interval(self.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
          info!("Portfolio sync shutting down");
          return Ok(());
        }
        _ = ticker.tick() => {
          let started = Instant::now();
          let result = self.sync_once().await;
          let elapsed = started.elapsed();
          if let Err(e) = &result {
            warn!(error = %e, "Portfolio sync failed");
          }
          self.status_tx.send_modify(|status| {
            status.runs += 1;
            status.last_ok = result.is_ok();
            status.last_duration = elapsed;
            if let Ok(report) = result {
              status.last_report = Some(report);
            }
          });
        }
      }
    }
  }
}

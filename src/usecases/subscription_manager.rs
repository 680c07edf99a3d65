//! Subscription Manager - What Should Be Streamed Right Now
//!
//! Holds the two inputs of the desired set (held markets and the
//! watchlist) and pushes the result to the transport. Repeated
//! reconciliation with an unchanged set never reopens the stream: the
//! transport's own set-equality check decides, and this module always
//! goes through it.

use tracing::{debug, info};

use crate::domain::market::MarketId;
use crate::domain::subscription::{compute_desired_set, SubscriptionSet};
use crate::error::StreamError;

pub use super::stream_transport::ReconcileAction;
use super::stream_transport::StreamHandle;

/// Push `desired` to the transport.
///
/// Not active and non-empty opens; active hands the set to
/// `update_subscription`, which reopens only when the set differs;
/// active and empty closes. The transport decides from its own state,
/// not from the last published status.
pub async fn reconcile(
  transport: &StreamHandle,
  desired: SubscriptionSet,
) -> Result<ReconcileAction, StreamError> {
  transport.reconcile(desired).await
}

/// Owner of the desired subscription inputs.
pub struct SubscriptionManager {
  transport: StreamHandle,
  held: Vec<MarketId>,
  watched: SubscriptionSet,
}

impl SubscriptionManager {
  /// Create a manager for `transport` with an initial watchlist.
  pub fn new(transport: StreamHandle, watched: SubscriptionSet) -> Self {
    Self {
      transport,
      held: Vec::new(),
      watched,
    }
  }

  /// Replace the markets with open positions.
  pub fn set_held(&mut self, markets: Vec<MarketId>) {
    self.held = markets;
  }

  /// Replace the watchlist.
  pub fn set_watched(&mut self, watched: SubscriptionSet) {
    if !watched.same_markets(&self.watched) {
      info!(markets = watched.len(), "Watchlist changed");
    }
    self.watched = watched;
  }

  /// Held markets first, then watched ones.
  pub fn desired(&self) -> SubscriptionSet {
    compute_desired_set(self.held.iter().cloned(), self.watched.iter().cloned())
  }

  /// Push the current desired set to the transport.
  pub async fn reconcile(&self) -> Result<ReconcileAction, StreamError> {
    let desired = self.desired();
    let markets = desired.len();
    let action = reconcile(&self.transport, desired).await?;
    debug!(markets, ?action, "Subscriptions reconciled");
    Ok(action)
  }
}

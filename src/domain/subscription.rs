//! Subscription sets.
//!
//! An ordered, de-duplicated list of market identifiers. Order matters:
//! when a set exceeds the upstream limit, the first entries by insertion
//! order are kept and the rest are dropped.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::market::MarketId;

/// Maximum number of markets a single stream connection may carry.
pub const MAX_SUBSCRIPTIONS: usize = 10;

/// Ordered set of market identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionSet {
    markets: Vec<MarketId>,
}

impl SubscriptionSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a market, returning `false` if it was already present.
    /// Empty identifiers are ignored.
    pub fn insert(&mut self, market_id: impl Into<MarketId>) -> bool {
        let market_id = market_id.into();
        if market_id.is_empty() || self.contains(&market_id) {
            return false;
        }
        self.markets.push(market_id);
        true
    }

    /// Whether the market is in the set.
    pub fn contains(&self, market_id: &str) -> bool {
        self.markets.iter().any(|m| m == market_id)
    }

    /// Number of markets.
    pub fn len(&self) -> usize {
        self.markets.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    /// Markets in insertion order.
    pub fn as_slice(&self) -> &[MarketId] {
        &self.markets
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &MarketId> {
        self.markets.iter()
    }

    /// Keep the first `limit` markets by insertion order.
    ///
    /// Returns the truncated set and the markets that were dropped.
    pub fn truncated(&self, limit: usize) -> (Self, Vec<MarketId>) {
        let keep = self.markets.len().min(limit);
        let kept = Self {
            markets: self.markets[..keep].to_vec(),
        };
        (kept, self.markets[keep..].to_vec())
    }

    /// Order-independent equality.
    pub fn same_markets(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let mine: HashSet<&str> = self.markets.iter().map(String::as_str).collect();
        other.markets.iter().all(|m| mine.contains(m.as_str()))
    }
}

impl<S: Into<MarketId>> FromIterator<S> for SubscriptionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for market in iter {
            set.insert(market);
        }
        set
    }
}

/// Union of held and watched markets, de-duplicated, first-seen order.
///
/// Open positions come first so that they survive truncation ahead of
/// markets that are only being watched.
pub fn compute_desired_set<A, B>(open_position_markets: A, watched_markets: B) -> SubscriptionSet
where
    A: IntoIterator,
    A::Item: Into<MarketId>,
    B: IntoIterator,
    B::Item: Into<MarketId>,
{
    let mut set = SubscriptionSet::new();
    for market in open_position_markets {
        set.insert(market);
    }
    for market in watched_markets {
        set.insert(market);
    }
    set
}

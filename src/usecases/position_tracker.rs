//! Position Tracker - Snapshot Positions Valued Against the Live Stream
//!
//! Keeps the latest authoritative positions and trade ledger, and
//! exposes the two valuation read paths:
//! - `live_valuations`: per position, always at the live price
//! - `summary`: portfolio totals, preferring fresh authoritative cash
//!   values over derived market values

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::ledger::TradeLedger;
use crate::domain::market::MarketId;
use crate::domain::valuation::{
  aggregate, effective_price, valuation, AggregateValuation, EffectivePrice, LiveValuation,
  Position, PriceSource,
};

use super::market_store::MarketStore;

/// One position with its live numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionView {
  /// The snapshot position.
  pub position: Position,
  /// Price used and where it came from.
  pub price: EffectivePrice,
  /// Value and unrealized P&L at that price.
  pub valuation: LiveValuation,
}

/// Portfolio totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
  /// Unrealized side.
  pub unrealized: AggregateValuation,
  /// Realized P&L from the trade ledger.
  pub realized_pnl: Decimal,
  /// Open positions counted.
  pub open_positions: usize,
}

/// Latest snapshot positions plus realized P&L.
#[derive(Debug, Default)]
pub struct PositionTracker {
  positions: Vec<Position>,
  ledger: TradeLedger,
}

impl PositionTracker {
  /// Empty tracker.
  pub fn new() -> Self {
    Self::default()
  }

  /// Replace positions with a fresh snapshot.
  ///
  /// A position that was already tracked keeps its stream-derived last
  /// known price when the new snapshot carries none.
  pub fn replace_positions(&mut self, mut positions: Vec<Position>) {
    for position in &mut positions {
      if position.last_known_price.is_some() {
        continue;
      }
      position.last_known_price = self
        .positions
        .iter()
        .find(|p| p.market_id == position.market_id && p.side.eq_ignore_ascii_case(&position.side))
        .and_then(|p| p.last_known_price);
    }
    self.positions = positions;
  }

  /// Replace the realized P&L ledger.
  pub fn replace_ledger(&mut self, ledger: TradeLedger) {
    self.ledger = ledger;
  }

  /// All snapshot positions, closed ones included.
  pub fn positions(&self) -> &[Position] {
    &self.positions
  }

  /// Trade ledger.
  pub fn ledger(&self) -> &TradeLedger {
    &self.ledger
  }

  /// Markets with a non-zero position, first-seen order, no duplicates.
  pub fn open_markets(&self) -> Vec<MarketId> {
    let mut markets: Vec<MarketId> = Vec::new();
    for position in self.positions.iter().filter(|p| p.is_open()) {
      if !markets.contains(&position.market_id) {
        markets.push(position.market_id.clone());
      }
    }
    markets
  }

  /// Per-tick path: every open position at its live effective price.
  pub fn live_valuations(&self, store: &MarketStore) -> Vec<PositionView> {
    self
      .positions
      .iter()
      .filter(|p| p.is_open())
      .map(|position| {
        let price = effective_price(position, store.price(&position.market_id));
        PositionView {
          position: position.clone(),
          valuation: valuation(position, price.price),
          price,
        }
      })
      .collect()
  }

  /// Remember live prices as the reference for side inference.
  ///
  /// Only prices the stream actually provided are kept; snapshot
  /// fallbacks leave the reference unchanged.
  pub fn observe_prices(&mut self, store: &MarketStore) {
    for position in self.positions.iter_mut().filter(|p| p.is_open()) {
      let price = effective_price(position, store.price(&position.market_id));
      if price.source != PriceSource::Snapshot {
        position.last_known_price = Some(price.price);
      }
    }
  }

  /// Aggregate path: portfolio totals.
  pub fn summary(&self, store: &MarketStore) -> PortfolioSummary {
    let unrealized = aggregate(&self.positions, |market_id| store.price(market_id));
    PortfolioSummary {
      unrealized,
      realized_pnl: self.ledger.total_realized(),
      open_positions: unrealized.from_snapshot + unrealized.from_stream,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::ledger::{TradeAction, TradeFill};
  use crate::domain::market::PriceUpdate;
  use crate::domain::normalizer::MarketUpdate;
  use crate::domain::time_series::SeriesConfig;
  use rust_decimal_macros::dec;

  fn position(market: &str, side: &str, qty: Decimal, last_known: Option<f64>) -> Position {
    Position {
      market_id: market.into(),
      side: side.into(),
      quantity: qty,
      cost_basis: dec!(25),
      authoritative_cash_value: None,
      last_known_price: last_known,
      snapshot_at_ms: 0,
    }
  }

  fn store_with_aggregate(market: &str, px: f64, at: i64) -> MarketStore {
    let mut store = MarketStore::new(SeriesConfig::default());
    let mut price = PriceUpdate::new(market);
    price.current_px = Some(px);
    store.apply(
      &MarketUpdate {
        market_id: market.into(),
        price: Some(price.with_inference()),
        event: None,
      },
      at,
    );
    store
  }

  #[test]
  fn test_open_markets_dedup_and_skip_closed() {
    let mut tracker = PositionTracker::new();
    tracker.replace_positions(vec![
      position("game-1", "Yes", dec!(10), None),
      position("game-2", "No", dec!(0), None),
      position("game-1", "No", dec!(5), None),
      position("game-3", "Yes", dec!(1), None),
    ]);
    assert_eq!(tracker.open_markets(), vec!["game-1", "game-3"]);
  }

  #[test]
  fn test_live_valuation_uses_inferred_opposite() {
    let mut tracker = PositionTracker::new();
    tracker.replace_positions(vec![position("game-1", "Underdog", dec!(100), Some(0.25))]);
    let store = store_with_aggregate("game-1", 0.72, 1_000);

    let views = tracker.live_valuations(&store);
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].price.source, PriceSource::InferredOpposite);
    assert!((views[0].price.price - 0.28).abs() < 1e-9);
    assert!((views[0].valuation.market_value - dec!(28)).abs() < dec!(0.000001));
    assert!((views[0].valuation.unrealized_pnl - dec!(3)).abs() < dec!(0.000001));
  }

  #[test]
  fn test_empty_store_falls_back_to_snapshot() {
    let mut tracker = PositionTracker::new();
    tracker.replace_positions(vec![position("game-1", "Yes", dec!(100), None)]);
    let store = MarketStore::new(SeriesConfig::default());

    let views = tracker.live_valuations(&store);
    assert_eq!(views[0].price.source, PriceSource::Snapshot);
    // Average cost 0.25.
    assert_eq!(views[0].valuation.market_value, dec!(25));
    assert_eq!(views[0].valuation.unrealized_pnl, Decimal::ZERO);
  }

  #[test]
  fn test_observe_prices_keeps_reference_across_snapshots() {
    let mut tracker = PositionTracker::new();
    tracker.replace_positions(vec![position("game-1", "Yes", dec!(10), None)]);
    let store = store_with_aggregate("game-1", 0.60, 1_000);
    tracker.observe_prices(&store);
    assert_eq!(tracker.positions()[0].last_known_price, Some(0.60));

    tracker.replace_positions(vec![position("game-1", "Yes", dec!(12), None)]);
    assert_eq!(tracker.positions()[0].last_known_price, Some(0.60));
  }

  #[test]
  fn test_summary_combines_realized_and_unrealized() {
    let mut tracker = PositionTracker::new();
    let mut fresh = position("game-1", "Yes", dec!(100), Some(0.5));
    fresh.authoritative_cash_value = Some(dec!(40));
    fresh.snapshot_at_ms = 5_000;
    tracker.replace_positions(vec![fresh]);
    tracker.replace_ledger(TradeLedger::from_fills(&[
      TradeFill {
        market_id: "game-2".into(),
        side: "Yes".into(),
        action: TradeAction::Buy,
        quantity: dec!(10),
        price: dec!(0.40),
        fee: Decimal::ZERO,
        timestamp_ms: 1,
      },
      TradeFill {
        market_id: "game-2".into(),
        side: "Yes".into(),
        action: TradeAction::Sell,
        quantity: dec!(10),
        price: dec!(0.50),
        fee: Decimal::ZERO,
        timestamp_ms: 2,
      },
    ]));

    // Tick older than the snapshot: cash value wins.
    let store = store_with_aggregate("game-1", 0.90, 1_000);
    let summary = tracker.summary(&store);
    assert_eq!(summary.unrealized.market_value, dec!(40));
    assert_eq!(summary.unrealized.from_snapshot, 1);
    assert_eq!(summary.realized_pnl, dec!(1));
    assert_eq!(summary.open_positions, 1);
  }
}

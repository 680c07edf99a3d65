//! Realized P&L from trade history.
//!
//! Fills are replayed in timestamp order per `(market, side)` using the
//! average-cost method: buys add quantity and cost, sells realize the
//! difference between sale proceeds and the average cost of the shares
//! sold. Fees always reduce realized P&L.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::market::{MarketId, SideName};

/// Direction of a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    /// Shares acquired.
    Buy,
    /// Shares disposed of.
    Sell,
}

/// One executed trade from the activity history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeFill {
    /// Market traded.
    pub market_id: MarketId,
    /// Outcome traded.
    pub side: SideName,
    /// Buy or sell.
    pub action: TradeAction,
    /// Shares.
    pub quantity: Decimal,
    /// Price per share.
    pub price: Decimal,
    /// Fee paid.
    #[serde(default)]
    pub fee: Decimal,
    /// Execution time (Unix ms).
    pub timestamp_ms: i64,
}

/// Running book for one `(market, side)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealizedPnl {
    /// Shares still held according to the history.
    pub open_quantity: Decimal,
    /// Cost of the shares still held.
    pub open_cost: Decimal,
    /// Profit or loss already locked in.
    pub realized: Decimal,
    /// Total fees paid.
    pub fees: Decimal,
}

impl RealizedPnl {
    /// Average cost per open share.
    pub fn average_cost(&self) -> Option<Decimal> {
        (self.open_quantity > Decimal::ZERO).then(|| self.open_cost / self.open_quantity)
    }

    fn apply(&mut self, fill: &TradeFill) {
        self.fees += fill.fee;
        self.realized -= fill.fee;
        match fill.action {
            TradeAction::Buy => {
                self.open_quantity += fill.quantity;
                self.open_cost += fill.quantity * fill.price;
            }
            TradeAction::Sell => {
                let sold = fill.quantity.min(self.open_quantity);
                if sold < fill.quantity {
                    warn!(
                        market = %fill.market_id,
                        side = %fill.side,
                        requested = %fill.quantity,
                        held = %self.open_quantity,
                        "Sell exceeds held quantity; realizing held shares only"
                    );
                }
                if sold > Decimal::ZERO {
                    let avg = self.open_cost / self.open_quantity;
                    let cost_out = avg * sold;
                    self.realized += sold * fill.price - cost_out;
                    self.open_quantity -= sold;
                    self.open_cost -= cost_out;
                }
                if self.open_quantity.is_zero() {
                    self.open_cost = Decimal::ZERO;
                }
            }
        }
    }
}

/// Realized P&L for every traded `(market, side)`.
#[derive(Debug, Clone, Default)]
pub struct TradeLedger {
    books: BTreeMap<(MarketId, SideName), RealizedPnl>,
}

impl TradeLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from an unordered history.
    pub fn from_fills(fills: &[TradeFill]) -> Self {
        let mut ordered: Vec<&TradeFill> = fills.iter().collect();
        ordered.sort_by_key(|f| f.timestamp_ms);
        let mut ledger = Self::new();
        for fill in ordered {
            ledger.record(fill);
        }
        ledger
    }

    /// Apply one fill. Fills must arrive in time order.
    pub fn record(&mut self, fill: &TradeFill) {
        self.books
            .entry((fill.market_id.clone(), fill.side.clone()))
            .or_default()
            .apply(fill);
    }

    /// Book for one market side.
    pub fn book(&self, market_id: &str, side: &str) -> Option<&RealizedPnl> {
        self.books
            .iter()
            .find(|((m, s), _)| m == market_id && s.eq_ignore_ascii_case(side))
            .map(|(_, book)| book)
    }

    /// Realized P&L summed over every side of a market.
    pub fn market_realized(&self, market_id: &str) -> Decimal {
        self.books
            .iter()
            .filter(|((m, _), _)| m == market_id)
            .map(|(_, book)| book.realized)
            .sum()
    }

    /// Realized P&L across the whole history.
    pub fn total_realized(&self) -> Decimal {
        self.books.values().map(|b| b.realized).sum()
    }

    /// Number of market sides with any history.
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Whether no fill was recorded.
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fill(action: TradeAction, qty: Decimal, price: Decimal, ts: i64) -> TradeFill {
        TradeFill {
            market_id: "game-1".into(),
            side: "Lakers".into(),
            action,
            quantity: qty,
            price,
            fee: Decimal::ZERO,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn test_average_cost_realization() {
        let ledger = TradeLedger::from_fills(&[
            fill(TradeAction::Buy, dec!(100), dec!(0.40), 1),
            fill(TradeAction::Buy, dec!(100), dec!(0.60), 2),
            fill(TradeAction::Sell, dec!(50), dec!(0.70), 3),
        ]);
        let book = ledger.book("game-1", "lakers").unwrap();
        assert_eq!(book.average_cost(), Some(dec!(0.50)));
        assert_eq!(book.open_quantity, dec!(150));
        assert_eq!(book.realized, dec!(10));
        assert_eq!(ledger.total_realized(), dec!(10));
    }

    #[test]
    fn test_history_is_sorted_before_replay() {
        let ledger = TradeLedger::from_fills(&[
            fill(TradeAction::Sell, dec!(10), dec!(0.90), 5),
            fill(TradeAction::Buy, dec!(10), dec!(0.50), 1),
        ]);
        assert_eq!(ledger.market_realized("game-1"), dec!(4));
        assert_eq!(ledger.book("game-1", "Lakers").unwrap().open_quantity, Decimal::ZERO);
    }

    #[test]
    fn test_oversell_realizes_only_held_and_fees_count() {
        let mut sell = fill(TradeAction::Sell, dec!(30), dec!(0.80), 2);
        sell.fee = dec!(0.25);
        let ledger = TradeLedger::from_fills(&[fill(TradeAction::Buy, dec!(20), dec!(0.50), 1), sell]);
        let book = ledger.book("game-1", "Lakers").unwrap();
        assert_eq!(book.realized, dec!(5.75));
        assert_eq!(book.fees, dec!(0.25));
        assert_eq!(book.open_quantity, Decimal::ZERO);
        assert_eq!(book.average_cost(), None);
    }
}

//! Live position valuation.
//!
//! Combines the authoritative snapshot of a position with the live
//! price stream. Two read paths exist and must stay separate:
//!
//! - per tick: [`effective_price`] + [`valuation`] always use the live
//!   price, for flashing/momentum display;
//! - aggregate: [`aggregate`] prefers the snapshot's authoritative cash
//!   value whenever that snapshot is fresher than the last tick.
//!
//! Money is `Decimal`, prices are `f64` probabilities. Every function
//! here is total: no panics, no NaN.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use super::market::{probability, MarketId, MarketPrices, SideName};

/// A held position as reported by the last snapshot sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Market the position is in.
    pub market_id: MarketId,
    /// Outcome held.
    pub side: SideName,
    /// Shares held.
    pub quantity: Decimal,
    /// Total cost paid for the shares.
    pub cost_basis: Decimal,
    /// Cash value reported by the exchange at snapshot time.
    pub authoritative_cash_value: Option<Decimal>,
    /// Side price implied by the snapshot.
    pub last_known_price: Option<f64>,
    /// When the snapshot was taken (Unix ms).
    pub snapshot_at_ms: i64,
}

impl Position {
    /// Whether any shares are still held.
    pub fn is_open(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    /// Best price the snapshot alone can offer.
    ///
    /// Last known price, else cash value per share, else average cost,
    /// else zero.
    pub fn snapshot_price(&self) -> f64 {
        if let Some(px) = self.last_known_price.and_then(probability) {
            return px;
        }
        if self.quantity > Decimal::ZERO {
            if let Some(cash) = self.authoritative_cash_value {
                if let Some(px) = (cash / self.quantity).to_f64().and_then(probability) {
                    return px;
                }
            }
            if let Some(px) = (self.cost_basis / self.quantity)
                .to_f64()
                .and_then(probability)
            {
                return px;
            }
        }
        0.0
    }
}

/// Where an effective price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceSource {
    /// Explicit per-side price from the stream.
    Side,
    /// Aggregate `currentPx` taken as this side's price.
    InferredAggregate,
    /// `1 - currentPx` taken as this side's price.
    InferredOpposite,
    /// No usable live price; snapshot fallback.
    Snapshot,
}

/// Price chosen for a position and its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectivePrice {
    /// Probability in `[0, 1]`.
    pub price: f64,
    /// Provenance.
    pub source: PriceSource,
}

/// Derived value of one position at one price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveValuation {
    /// Price used.
    pub effective_price: f64,
    /// `quantity * effective_price`.
    pub market_value: Decimal,
    /// `market_value - cost_basis`.
    pub unrealized_pnl: Decimal,
}

/// Pick the price a position should be valued at.
///
/// 1. the stream's price for the position's side;
/// 2. otherwise the aggregate `currentPx`, read as either this side or
///    the opposite one, picking the reading closer to the position's
///    last known price. This is a heuristic: a lone aggregate does not say
///    which outcome it quotes. Without a last known price the aggregate
///    is taken as-is;
/// 3. otherwise the snapshot price.
pub fn effective_price(position: &Position, latest: Option<&MarketPrices>) -> EffectivePrice {
    let prices = latest.map(|m| &m.prices);

    if let Some(px) = prices
        .and_then(|p| p.side_price(&position.side))
        .and_then(probability)
    {
        return EffectivePrice {
            price: px,
            source: PriceSource::Side,
        };
    }

    let aggregate = prices
        .filter(|p| p.side_prices.is_empty())
        .and_then(|p| p.inferred_side_price.or(p.current_px))
        .and_then(probability);

    if let Some(same) = aggregate {
        let opposite = 1.0 - same;
        let pick_opposite = position
            .last_known_price
            .and_then(probability)
            .is_some_and(|reference| (opposite - reference).abs() < (same - reference).abs());
        return if pick_opposite {
            EffectivePrice {
                price: opposite,
                source: PriceSource::InferredOpposite,
            }
        } else {
            EffectivePrice {
                price: same,
                source: PriceSource::InferredAggregate,
            }
        };
    }

    EffectivePrice {
        price: position.snapshot_price(),
        source: PriceSource::Snapshot,
    }
}

/// Value a position at a given price.
pub fn valuation(position: &Position, effective_price: f64) -> LiveValuation {
    let price = probability(effective_price).unwrap_or_else(|| position.snapshot_price());
    let market_value = position.quantity * Decimal::from_f64(price).unwrap_or_default();
    LiveValuation {
        effective_price: price,
        market_value,
        unrealized_pnl: market_value - position.cost_basis,
    }
}

/// Value a position against the latest stream state in one step.
pub fn live_valuation(position: &Position, latest: Option<&MarketPrices>) -> LiveValuation {
    valuation(position, effective_price(position, latest).price)
}

/// Portfolio-level totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateValuation {
    /// Sum of position values.
    pub market_value: Decimal,
    /// Sum of cost bases.
    pub cost_basis: Decimal,
    /// `market_value - cost_basis`.
    pub unrealized_pnl: Decimal,
    /// Positions valued from their authoritative cash value.
    pub from_snapshot: usize,
    /// Positions valued from the live stream.
    pub from_stream: usize,
}

/// Total unrealized P&L across positions.
///
/// A position whose snapshot carries an authoritative cash value and is
/// at least as recent as the last tick for its market contributes that
/// cash value; otherwise it contributes its live market value.
pub fn aggregate<'a, I, F>(positions: I, mut latest: F) -> AggregateValuation
where
    I: IntoIterator<Item = &'a Position>,
    F: FnMut(&str) -> Option<&'a MarketPrices>,
{
    let mut totals = AggregateValuation::default();
    for position in positions.into_iter().filter(|p| p.is_open()) {
        let prices = latest(&position.market_id);
        let tick_at = prices.map_or(i64::MIN, |p| p.updated_at_ms);
        let value = match position.authoritative_cash_value {
            Some(cash) if position.snapshot_at_ms >= tick_at => {
                totals.from_snapshot += 1;
                cash
            }
            _ => {
                totals.from_stream += 1;
                live_valuation(position, prices).market_value
            }
        };
        totals.market_value += value;
        totals.cost_basis += position.cost_basis;
    }
    totals.unrealized_pnl = totals.market_value - totals.cost_basis;
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::PriceUpdate;
    use rust_decimal_macros::dec;

    fn position(side: &str, last_known: Option<f64>) -> Position {
        Position {
            market_id: "game-1".into(),
            side: side.into(),
            quantity: dec!(100),
            cost_basis: dec!(30),
            authoritative_cash_value: None,
            last_known_price: last_known,
            snapshot_at_ms: 1_000,
        }
    }

    fn aggregate_only(px: f64, at: i64) -> MarketPrices {
        let mut prices = MarketPrices::default();
        let mut update = PriceUpdate::new("game-1");
        update.current_px = Some(px);
        prices.merge(&update, at);
        prices
    }

    #[test]
    fn test_side_price_wins() {
        let mut prices = MarketPrices::default();
        let mut update = PriceUpdate::new("game-1");
        update.side_prices.insert("Lakers".into(), 0.61);
        update.current_px = Some(0.39);
        prices.merge(&update, 2_000);

        let eff = effective_price(&position("lakers", Some(0.2)), Some(&prices));
        assert_eq!(eff.source, PriceSource::Side);
        assert!((eff.price - 0.61).abs() < 1e-12);
    }

    #[test]
    fn test_inference_picks_closer_side() {
        let prices = aggregate_only(0.72, 2_000);
        let eff = effective_price(&position("Celtics", Some(0.25)), Some(&prices));
        assert_eq!(eff.source, PriceSource::InferredOpposite);
        assert!((eff.price - 0.28).abs() < 1e-9);

        let eff = effective_price(&position("Lakers", Some(0.70)), Some(&prices));
        assert_eq!(eff.source, PriceSource::InferredAggregate);
        assert!((eff.price - 0.72).abs() < 1e-9);

        let eff = effective_price(&position("Lakers", None), Some(&prices));
        assert_eq!(eff.source, PriceSource::InferredAggregate);
    }

    #[test]
    fn test_snapshot_fallback_chain() {
        let mut p = position("Lakers", Some(0.4));
        assert_eq!(effective_price(&p, None).price, 0.4);

        p.last_known_price = None;
        p.authoritative_cash_value = Some(dec!(45));
        assert!((effective_price(&p, None).price - 0.45).abs() < 1e-12);

        p.authoritative_cash_value = None;
        assert!((effective_price(&p, None).price - 0.30).abs() < 1e-12);

        p.quantity = Decimal::ZERO;
        assert_eq!(effective_price(&p, None).price, 0.0);
    }

    #[test]
    fn test_valuation_math() {
        let p = position("Lakers", None);
        let v = valuation(&p, 0.45);
        assert_eq!(v.market_value, dec!(45));
        assert_eq!(v.unrealized_pnl, dec!(15));

        // Out-of-range price is missing, not clamped.
        let v = valuation(&p, 1.7);
        assert!((v.effective_price - 0.30).abs() < 1e-12);
    }

    #[test]
    fn test_aggregate_prefers_fresher_snapshot() {
        let mut fresh = position("Lakers", Some(0.58));
        fresh.authoritative_cash_value = Some(dec!(52));
        fresh.snapshot_at_ms = 5_000;

        let mut stale = position("Lakers", Some(0.58));
        stale.market_id = "game-2".into();
        stale.authoritative_cash_value = Some(dec!(10));
        stale.snapshot_at_ms = 1_000;

        let game1 = aggregate_only(0.60, 4_000);
        let mut game2 = aggregate_only(0.60, 4_000);
        game2.prices.market_id = "game-2".into();

        let totals = aggregate([&fresh, &stale], |id| match id {
            "game-1" => Some(&game1),
            "game-2" => Some(&game2),
            _ => None,
        });
        // fresh -> 52 (snapshot), stale -> 100 * 0.60 = 60 (stream)
        assert_eq!(totals.market_value, dec!(112));
        assert_eq!(totals.cost_basis, dec!(60));
        assert_eq!(totals.unrealized_pnl, dec!(52));
        assert_eq!(totals.from_snapshot, 1);
        assert_eq!(totals.from_stream, 1);
    }
}

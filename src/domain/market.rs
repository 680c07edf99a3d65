//! Core market data types.
//!
//! Canonical shapes produced by the normalizer and consumed by the
//! store, the time-series cache and position valuation. Every price is a
//! probability in `[0, 1]`; anything outside that range is treated as
//! missing, never clamped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Market identifier (the upstream market slug).
pub type MarketId = String;

/// Outcome name of a binary market (e.g. a team name).
pub type SideName = String;

/// Validate a parsed probability.
///
/// Returns `None` for non-finite values and for anything outside
/// `[0, 1]` so callers fall back to the previous known value.
pub fn probability(value: f64) -> Option<f64> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Some(value)
    } else {
        None
    }
}

/// Parse a probability from its textual wire form.
pub fn parse_probability(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().and_then(probability)
}

/// Price information for one market as carried by a single frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    /// Market the prices belong to.
    pub market_id: MarketId,
    /// Explicit per-outcome prices.
    pub side_prices: BTreeMap<SideName, f64>,
    /// Aggregate price of the canonical side.
    pub current_px: Option<f64>,
    /// Last traded price.
    pub last_trade_px: Option<f64>,
    /// Settlement price once the market resolves.
    pub settlement_px: Option<f64>,
    /// `currentPx` exposed as the canonical side's price when no
    /// per-side breakdown was sent.
    pub inferred_side_price: Option<f64>,
    /// `1 - currentPx` under the same condition.
    pub inferred_opposite_side_price: Option<f64>,
}

impl PriceUpdate {
    /// Create an empty update for a market.
    pub fn new(market_id: impl Into<MarketId>) -> Self {
        Self {
            market_id: market_id.into(),
            ..Self::default()
        }
    }

    /// Fill the inferred side prices from the aggregate price.
    ///
    /// Only applies when the frame carried no explicit per-side
    /// breakdown. Which real outcome the aggregate refers to is unknown;
    /// see [`crate::domain::valuation::effective_price`] for how the
    /// ambiguity is resolved.
    pub fn with_inference(mut self) -> Self {
        if self.side_prices.is_empty() {
            if let Some(px) = self.current_px {
                self.inferred_side_price = Some(px);
                self.inferred_opposite_side_price = probability(1.0 - px);
            }
        }
        self
    }

    /// True if the update carries no usable price at all.
    pub fn is_empty(&self) -> bool {
        self.side_prices.is_empty()
            && self.current_px.is_none()
            && self.last_trade_px.is_none()
            && self.settlement_px.is_none()
    }

    /// Look up a side price by outcome name, ignoring ASCII case.
    pub fn side_price(&self, side: &str) -> Option<f64> {
        self.side_prices
            .get(side)
            .or_else(|| {
                self.side_prices
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(side))
                    .map(|(_, px)| px)
            })
            .copied()
    }
}

/// Game/event state for one market.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventUpdate {
    /// Market the event state belongs to.
    pub market_id: MarketId,
    /// Score in `"H - A"` form.
    pub score: Option<String>,
    /// Current period (quarter, half, inning...).
    pub period: Option<String>,
    /// Elapsed game clock.
    pub elapsed: Option<String>,
    /// Whether the event is in progress.
    pub live: bool,
    /// Whether the event has finished.
    pub ended: bool,
}

impl EventUpdate {
    /// Split an `"H - A"` score into numeric home/away values.
    pub fn parsed_score(&self) -> Option<(f64, f64)> {
        let score = self.score.as_deref()?;
        let (home, away) = score.split_once('-')?;
        let home = home.trim().parse::<f64>().ok()?;
        let away = away.trim().parse::<f64>().ok()?;
        Some((home, away))
    }
}

/// Latest merged price snapshot for a market, as exposed to readers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketPrices {
    /// Merged price fields.
    #[serde(flatten)]
    pub prices: PriceUpdate,
    /// When the last frame for this market was applied (Unix ms).
    pub updated_at_ms: i64,
}

impl MarketPrices {
    /// Merge a new update into the snapshot.
    ///
    /// Present fields overwrite; absent fields keep their previous
    /// value. Side prices are merged per outcome. The inferred prices
    /// follow the aggregate and are cleared once an explicit breakdown
    /// is known.
    pub fn merge(&mut self, update: &PriceUpdate, now_ms: i64) {
        self.prices.market_id.clone_from(&update.market_id);
        for (side, px) in &update.side_prices {
            self.prices.side_prices.insert(side.clone(), *px);
        }
        if update.current_px.is_some() {
            self.prices.current_px = update.current_px;
        }
        if update.last_trade_px.is_some() {
            self.prices.last_trade_px = update.last_trade_px;
        }
        if update.settlement_px.is_some() {
            self.prices.settlement_px = update.settlement_px;
        }
        if self.prices.side_prices.is_empty() {
            self.prices.inferred_side_price = None;
            self.prices.inferred_opposite_side_price = None;
            self.prices = std::mem::take(&mut self.prices).with_inference();
        } else {
            self.prices.inferred_side_price = None;
            self.prices.inferred_opposite_side_price = None;
        }
        self.updated_at_ms = now_ms;
    }

    /// Market identifier.
    pub fn market_id(&self) -> &str {
        &self.prices.market_id
    }

    /// Aggregate price.
    pub fn current_px(&self) -> Option<f64> {
        self.prices.current_px
    }

    /// `1 - currentPx` when no side breakdown is known.
    pub fn inferred_opposite_side_price(&self) -> Option<f64> {
        self.prices.inferred_opposite_side_price
    }
}

/// Merge an event update into the latest event state.
///
/// Textual fields keep their previous value when absent; the live and
/// ended flags always reflect the most recent frame.
pub fn merge_event(current: &mut EventUpdate, update: &EventUpdate) {
    current.market_id.clone_from(&update.market_id);
    if update.score.is_some() {
        current.score.clone_from(&update.score);
    }
    if update.period.is_some() {
        current.period.clone_from(&update.period);
    }
    if update.elapsed.is_some() {
        current.elapsed.clone_from(&update.elapsed);
    }
    current.live = update.live;
    current.ended = update.ended;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probability_rejects_out_of_range() {
        assert_eq!(probability(0.5), Some(0.5));
        assert_eq!(probability(0.0), Some(0.0));
        assert_eq!(probability(1.0), Some(1.0));
        assert_eq!(probability(1.2), None);
        assert_eq!(probability(-0.01), None);
        assert_eq!(probability(f64::NAN), None);
        assert_eq!(parse_probability(" 0.42 "), Some(0.42));
        assert_eq!(parse_probability("42"), None);
        assert_eq!(parse_probability("abc"), None);
    }

    #[test]
    fn test_inference_only_without_breakdown() {
        let mut update = PriceUpdate::new("game-1");
        update.current_px = Some(0.6);
        let update = update.with_inference();
        assert_eq!(update.inferred_side_price, Some(0.6));
        let opposite = update.inferred_opposite_side_price.unwrap();
        assert!((opposite - 0.4).abs() < 1e-9);

        let mut with_sides = PriceUpdate::new("game-1");
        with_sides.current_px = Some(0.6);
        with_sides.side_prices.insert("Lakers".into(), 0.6);
        let with_sides = with_sides.with_inference();
        assert_eq!(with_sides.inferred_side_price, None);
        assert_eq!(with_sides.inferred_opposite_side_price, None);
    }

    #[test]
    fn test_merge_keeps_previous_fields() {
        let mut snapshot = MarketPrices::default();
        let mut first = PriceUpdate::new("game-1");
        first.current_px = Some(0.55);
        first.last_trade_px = Some(0.54);
        snapshot.merge(&first, 1_000);

        let mut second = PriceUpdate::new("game-1");
        second.current_px = Some(0.57);
        snapshot.merge(&second, 2_000);

        assert_eq!(snapshot.current_px(), Some(0.57));
        assert_eq!(snapshot.prices.last_trade_px, Some(0.54));
        assert_eq!(snapshot.updated_at_ms, 2_000);
        let opposite = snapshot.inferred_opposite_side_price().unwrap();
        assert!((opposite - 0.43).abs() < 1e-9);
    }

    #[test]
    fn test_side_price_case_insensitive() {
        let mut update = PriceUpdate::new("game-1");
        update.side_prices.insert("Lakers".into(), 0.61);
        assert_eq!(update.side_price("lakers"), Some(0.61));
        assert_eq!(update.side_price("Celtics"), None);
    }

    #[test]
    fn test_parsed_score() {
        let event = EventUpdate {
            market_id: "game-1".into(),
            score: Some("3 - 1".into()),
            ..EventUpdate::default()
        };
        assert_eq!(event.parsed_score(), Some((3.0, 1.0)));

        let bad = EventUpdate {
            score: Some("halftime".into()),
            ..EventUpdate::default()
        };
        assert_eq!(bad.parsed_score(), None);
    }
}

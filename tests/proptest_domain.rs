//! Property-Based Tests - Domain Layer Invariants
//!
//! Uses `proptest` to verify that domain components maintain their
//! invariants across random inputs.

use std::time::Duration;

use proptest::prelude::*;
use rust_decimal::Decimal;

use position_tracker::domain::backoff::ReconnectPolicy;
use position_tracker::domain::market::{MarketPrices, PriceUpdate};
use position_tracker::domain::subscription::{compute_desired_set, SubscriptionSet};
use position_tracker::domain::time_series::{SeriesConfig, TimeSeries, TimeSeriesPoint};
use position_tracker::domain::valuation::{effective_price, valuation, Position, PriceSource};

fn position(quantity: u32, cost_cents: u32, last_known: Option<f64>) -> Position {
    Position {
        market_id: "game-1".into(),
        side: "Yes".into(),
        quantity: Decimal::from(quantity),
        cost_basis: Decimal::new(i64::from(cost_cents), 2),
        authoritative_cash_value: None,
        last_known_price: last_known,
        snapshot_at_ms: 0,
    }
}

// ── Time Series Properties ──────────────────────────────────

proptest! {
    /// A series never holds more than `max_len` points and keeps the newest.
    #[test]
    fn series_bounded_and_keeps_latest(
        max_len in 2usize..64,
        values in prop::collection::vec(0.0f64..1.0, 1..300),
    ) {
        let config = SeriesConfig { max_len, ..SeriesConfig::default() };
        let mut series = TimeSeries::default();
        let mut stored = Vec::new();
        for (i, value) in values.iter().enumerate() {
            let time = i64::try_from(i).unwrap() * 5_000;
            if series.append(TimeSeriesPoint::new(time, *value), &config) {
                stored.push(*value);
            }
        }

        prop_assert!(series.len() <= max_len);
        let tail: Vec<f64> = stored[stored.len().saturating_sub(max_len)..].to_vec();
        let kept: Vec<f64> = series.points().map(|p| p.value).collect();
        prop_assert_eq!(kept, tail);
    }

    /// Stored times never go backwards.
    #[test]
    fn series_times_monotonic(
        points in prop::collection::vec((0i64..100_000, 0.0f64..1.0), 1..200),
    ) {
        let config = SeriesConfig::default();
        let mut series = TimeSeries::default();
        for (time, value) in points {
            series.append(TimeSeriesPoint::new(time, value), &config);
        }
        let times: Vec<i64> = series.points().map(|p| p.time).collect();
        prop_assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }

    /// An unchanged value inside the sampling interval never grows the series;
    /// a changed value always does.
    #[test]
    fn series_dedup_rule(
        value in 0.0f64..1.0,
        delta_ms in 0i64..1_000,
        bump in 0.001f64..0.5,
    ) {
        let config = SeriesConfig::default();
        let mut series = TimeSeries::default();
        prop_assert!(series.append(TimeSeriesPoint::new(10_000, value), &config));

        prop_assert!(!series.append(TimeSeriesPoint::new(10_000 + delta_ms, value), &config));
        prop_assert_eq!(series.len(), 1);

        prop_assert!(series.append(TimeSeriesPoint::new(10_000 + delta_ms, value + bump), &config));
        prop_assert_eq!(series.len(), 2);
    }
}

// ── Subscription Properties ─────────────────────────────────

proptest! {
    /// Truncation keeps the first `limit` markets in input order.
    #[test]
    fn truncation_keeps_prefix(
        count in 0usize..40,
        limit in 1usize..20,
    ) {
        let markets: Vec<String> = (0..count).map(|i| format!("m-{i}")).collect();
        let set: SubscriptionSet = markets.iter().cloned().collect();
        let (kept, dropped) = set.truncated(limit);

        let keep = count.min(limit);
        prop_assert_eq!(kept.as_slice(), &markets[..keep]);
        prop_assert_eq!(dropped.as_slice(), &markets[keep..]);
    }

    /// The desired set has no duplicates and puts held markets first.
    #[test]
    fn desired_set_dedups_held_first(
        held in prop::collection::vec(0u8..20, 0..15),
        watched in prop::collection::vec(0u8..20, 0..15),
    ) {
        let held: Vec<String> = held.iter().map(|i| format!("m-{i}")).collect();
        let watched: Vec<String> = watched.iter().map(|i| format!("m-{i}")).collect();
        let desired = compute_desired_set(held.iter().cloned(), watched.iter().cloned());

        let mut seen = std::collections::HashSet::new();
        prop_assert!(desired.iter().all(|m| seen.insert(m.clone())));

        let mut unique_held: Vec<String> = Vec::new();
        for market in &held {
            if !unique_held.contains(market) {
                unique_held.push(market.clone());
            }
        }
        prop_assert_eq!(&desired.as_slice()[..unique_held.len()], unique_held.as_slice());
        prop_assert!(watched.iter().all(|m| desired.contains(m)));
    }

    /// Order never matters for set equality.
    #[test]
    fn same_markets_ignores_order(
        markets in prop::collection::hash_set(0u8..50, 0..12),
    ) {
        let forward: SubscriptionSet = markets.iter().map(|i| format!("m-{i}")).collect();
        let backward: SubscriptionSet = forward.as_slice().iter().rev().cloned().collect();
        prop_assert!(forward.same_markets(&backward));
    }
}

// ── Backoff Properties ──────────────────────────────────────

proptest! {
    /// Nth retry waits `min(base * 2^(N-1), max)` and never exceeds `max`.
    #[test]
    fn backoff_doubles_and_caps(
        base_ms in 1u64..5_000,
        attempt in 0u32..64,
    ) {
        let policy = ReconnectPolicy {
            base: Duration::from_millis(base_ms),
            max: Duration::from_millis(30_000),
            max_attempts: 5,
        };
        let delay = policy.delay(attempt);
        prop_assert!(delay <= policy.max);

        let expected = 2u128
            .checked_pow(attempt)
            .map_or(30_000, |factor| (u128::from(base_ms) * factor).min(30_000));
        prop_assert_eq!(delay.as_millis(), expected);
    }

    /// No retry is offered once the attempt budget is spent.
    #[test]
    fn backoff_stops_after_budget(max_attempts in 0u32..10, attempt in 0u32..20) {
        let policy = ReconnectPolicy { max_attempts, ..ReconnectPolicy::default() };
        prop_assert_eq!(policy.next_delay(attempt).is_some(), attempt < max_attempts);
    }
}

// ── Valuation Properties ────────────────────────────────────

proptest! {
    /// Valuation with no live prices is always finite and uses the snapshot.
    #[test]
    fn valuation_total_without_prices(
        quantity in 0u32..10_000,
        cost_cents in 0u32..1_000_000,
        last_known in prop::option::of(-1.0f64..2.0),
    ) {
        let position = position(quantity, cost_cents, last_known);
        let price = effective_price(&position, None);
        prop_assert_eq!(price.source, PriceSource::Snapshot);
        prop_assert!(price.price.is_finite());
        prop_assert!((0.0..=1.0).contains(&price.price));

        let value = valuation(&position, price.price);
        prop_assert_eq!(value.unrealized_pnl, value.market_value - position.cost_basis);
    }

    /// An aggregate-only price resolves to whichever side is closer to the
    /// last known price.
    #[test]
    fn inference_picks_closer_side(
        current in 0.01f64..0.99,
        last_known in 0.01f64..0.99,
    ) {
        let mut update = PriceUpdate::new("game-1");
        update.current_px = Some(current);
        let mut latest = MarketPrices::default();
        latest.merge(&update.with_inference(), 1);

        let position = position(100, 2_500, Some(last_known));
        let price = effective_price(&position, Some(&latest));

        let opposite = 1.0 - current;
        let expected = if (current - last_known).abs() <= (opposite - last_known).abs() {
            current
        } else {
            opposite
        };
        prop_assert!((price.price - expected).abs() < 1e-9);
    }
}

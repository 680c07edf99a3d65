//! Stream Hot-Path Benchmarks
//!
//! Benchmarks the domain functions that run on every stream frame:
//! normalization, store merge with series appends, and chart assembly.
//!
//! Run with: cargo bench --bench series_bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use position_tracker::domain::normalizer::{MessageNormalizer, NormalizedUpdate};
use position_tracker::domain::time_series::{SeriesConfig, SeriesKey, TimeSeriesCache, TimeSeriesPoint};
use position_tracker::domain::valuation::{effective_price, Position};
use position_tracker::usecases::market_store::MarketStore;
use rust_decimal_macros::dec;

const FRAME: &str = r#"{"marketDataLite":{"marketSlug":"game-1","currentPx":{"value":"0.60"}}}"#;

/// Benchmark decoding one aggregate-price frame.
fn bench_normalize(c: &mut Criterion) {
    let normalizer = MessageNormalizer::new();

    c.bench_function("normalize_market_data_lite", |b| {
        b.iter(|| {
            let _update = normalizer.normalize(black_box(FRAME));
        });
    });
}

/// Benchmark a full series append at capacity (eviction path).
fn bench_series_append(c: &mut Criterion) {
    let mut cache = TimeSeriesCache::new(SeriesConfig::default());
    let key = SeriesKey::side("game-1", "Yes");
    for i in 0..500 {
        cache.append(key.clone(), TimeSeriesPoint::new(i * 2_000, 0.5));
    }
    let mut t = 1_000_000;

    c.bench_function("series_append_full", |b| {
        b.iter(|| {
            t += 2_000;
            let _stored = cache.append(key.clone(), black_box(TimeSeriesPoint::new(t, 0.51)));
        });
    });
}

/// Benchmark applying a decoded frame to the market store.
fn bench_store_apply(c: &mut Criterion) {
    let normalizer = MessageNormalizer::new();
    let Some(NormalizedUpdate::Market(update)) = normalizer.normalize(FRAME) else {
        panic!("benchmark frame must decode to a market update");
    };
    let mut store = MarketStore::new(SeriesConfig::default());
    let mut now = 0;

    c.bench_function("store_apply_frame", |b| {
        b.iter(|| {
            now += 1_500;
            let _applied = store.apply(black_box(&update), now);
        });
    });
}

/// Benchmark chart assembly for one market with full series.
fn bench_chart(c: &mut Criterion) {
    let mut cache = TimeSeriesCache::new(SeriesConfig::default());
    for side in ["Home", "Away"] {
        let key = SeriesKey::side("game-1", side);
        for i in 0..500_i32 {
            cache.append(key.clone(), TimeSeriesPoint::new(i64::from(i) * 2_000, f64::from(i % 100) / 100.0));
        }
    }

    c.bench_function("chart_series_two_sides", |b| {
        b.iter(|| {
            let _chart = cache.build_chart_series(black_box("game-1"));
        });
    });
}

/// Benchmark effective price resolution with aggregate inference.
fn bench_effective_price(c: &mut Criterion) {
    let mut store = MarketStore::new(SeriesConfig::default());
    let normalizer = MessageNormalizer::new();
    if let Some(NormalizedUpdate::Market(update)) = normalizer.normalize(FRAME) {
        store.apply(&update, 1_000);
    }
    let position = Position {
        market_id: "game-1".into(),
        side: "Underdog".into(),
        quantity: dec!(100),
        cost_basis: dec!(25),
        authoritative_cash_value: None,
        last_known_price: Some(0.25),
        snapshot_at_ms: 0,
    };

    c.bench_function("effective_price_inferred", |b| {
        b.iter(|| {
            let _price = effective_price(black_box(&position), store.price("game-1"));
        });
    });
}

criterion_group!(
    benches,
    bench_normalize,
    bench_series_append,
    bench_store_apply,
    bench_chart,
    bench_effective_price,
);
criterion_main!(benches);

//! Market Store - Latest Prices, Event State and Price History
//!
//! Single write path for everything the stream produces. The transport
//! actor is the only writer; readers (valuation, charts, the binary's
//! logging loop) take a read lock on the shared handle.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::market::{merge_event, probability, EventUpdate, MarketId, MarketPrices};
use crate::domain::normalizer::MarketUpdate;
use crate::domain::time_series::{
    ChartSeries, Momentum, SeriesConfig, SeriesKey, SeriesMetric, TimeSeriesCache, TimeSeriesPoint,
};

/// Store shared between the transport (writer) and readers.
pub type SharedMarketStore = Arc<RwLock<MarketStore>>;

/// What an applied update changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Applied {
    /// Prices were merged.
    pub price: bool,
    /// Event state was merged.
    pub event: bool,
    /// Number of series points stored.
    pub points: usize,
}

/// Latest merged state per market plus the history cache.
#[derive(Debug, Default)]
pub struct MarketStore {
    prices: HashMap<MarketId, MarketPrices>,
    events: HashMap<MarketId, EventUpdate>,
    series: TimeSeriesCache,
}

impl MarketStore {
    /// Create an empty store.
    pub fn new(config: SeriesConfig) -> Self {
        Self {
            prices: HashMap::new(),
            events: HashMap::new(),
            series: TimeSeriesCache::new(config),
        }
    }

    /// Wrap into the shared handle.
    pub fn shared(config: SeriesConfig) -> SharedMarketStore {
        Arc::new(RwLock::new(Self::new(config)))
    }

    /// Merge one normalized update received at `now_ms`.
    pub fn apply(&mut self, update: &MarketUpdate, now_ms: i64) -> Applied {
        let mut applied = Applied::default();
        let market_id = &update.market_id;

        if let Some(price) = update.price.as_ref().filter(|p| !p.is_empty()) {
            self.prices
                .entry(market_id.clone())
                .or_default()
                .merge(price, now_ms);
            applied.price = true;

            for (side, px) in &price.side_prices {
                if let Some(px) = probability(*px) {
                    applied.points += usize::from(self.series.append(
                        SeriesKey::side(market_id.as_str(), side.as_str()),
                        TimeSeriesPoint::new(now_ms, px),
                    ));
                }
            }
            if let Some(px) = price.current_px.and_then(probability) {
                applied.points += usize::from(self.series.append(
                    SeriesKey::new(market_id.as_str(), SeriesMetric::Aggregate),
                    TimeSeriesPoint::new(now_ms, px),
                ));
            }
        }

        if let Some(event) = &update.event {
            let current = self.events.entry(market_id.clone()).or_default();
            merge_event(current, event);
            applied.event = true;

            if let Some((home, away)) = event.parsed_score() {
                applied.points += usize::from(self.series.append(
                    SeriesKey::new(market_id.as_str(), SeriesMetric::HomeScore),
                    TimeSeriesPoint::new(now_ms, home),
                ));
                applied.points += usize::from(self.series.append(
                    SeriesKey::new(market_id.as_str(), SeriesMetric::AwayScore),
                    TimeSeriesPoint::new(now_ms, away),
                ));
            }
        }

        applied
    }

    /// Latest prices per market.
    pub fn prices(&self) -> &HashMap<MarketId, MarketPrices> {
        &self.prices
    }

    /// Latest prices for one market.
    pub fn price(&self, market_id: &str) -> Option<&MarketPrices> {
        self.prices.get(market_id)
    }

    /// Latest event state per market.
    pub fn events(&self) -> &HashMap<MarketId, EventUpdate> {
        &self.events
    }

    /// Latest event state for one market.
    pub fn event(&self, market_id: &str) -> Option<&EventUpdate> {
        self.events.get(market_id)
    }

    /// History cache.
    pub fn series(&self) -> &TimeSeriesCache {
        &self.series
    }

    /// All price series of a market on one axis.
    pub fn chart(&self, market_id: &str) -> ChartSeries {
        self.series.build_chart_series(market_id)
    }

    /// Momentum of one outcome's price, `None` when below the noise floor.
    pub fn momentum(&self, market_id: &str, side: &str) -> Option<Momentum> {
        self.series
            .significant_momentum(&SeriesKey::side(market_id, side))
    }

    /// Momentum of the aggregate price, `None` when below the noise floor.
    pub fn aggregate_momentum(&self, market_id: &str) -> Option<Momentum> {
        self.series
            .significant_momentum(&SeriesKey::new(market_id, SeriesMetric::Aggregate))
    }

    /// Forget a market entirely.
    pub fn remove_market(&mut self, market_id: &str) {
        self.prices.remove(market_id);
        self.events.remove(market_id);
        self.series.remove_market(market_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::PriceUpdate;

    fn aggregate(market: &str, px: f64) -> MarketUpdate {
        let mut price = PriceUpdate::new(market);
        price.current_px = Some(px);
        MarketUpdate {
            market_id: market.into(),
            price: Some(price.with_inference()),
            event: None,
        }
    }

    fn score(market: &str, score: &str) -> MarketUpdate {
        MarketUpdate {
            market_id: market.into(),
            price: None,
            event: Some(EventUpdate {
                market_id: market.into(),
                score: Some(score.into()),
                live: true,
                ..EventUpdate::default()
            }),
        }
    }

    #[test]
    fn test_apply_aggregate_price() {
        let mut store = MarketStore::new(SeriesConfig::default());
        let applied = store.apply(&aggregate("game-1", 0.60), 1_000);
        assert!(applied.price);
        assert_eq!(applied.points, 1);

        let prices = store.price("game-1").unwrap();
        assert_eq!(prices.current_px(), Some(0.60));
        assert!((prices.inferred_opposite_side_price().unwrap() - 0.40).abs() < 1e-9);
        assert_eq!(prices.updated_at_ms, 1_000);
    }

    #[test]
    fn test_missing_fields_keep_previous() {
        let mut store = MarketStore::new(SeriesConfig::default());
        store.apply(&aggregate("game-1", 0.60), 1_000);

        let mut price = PriceUpdate::new("game-1");
        price.last_trade_px = Some(0.61);
        store.apply(
            &MarketUpdate {
                market_id: "game-1".into(),
                price: Some(price),
                event: None,
            },
            2_000,
        );

        let prices = store.price("game-1").unwrap();
        assert_eq!(prices.current_px(), Some(0.60));
        assert_eq!(prices.prices.last_trade_px, Some(0.61));
    }

    #[test]
    fn test_scores_feed_series() {
        let mut store = MarketStore::new(SeriesConfig::default());
        let applied = store.apply(&score("game-1", "21 - 17"), 1_000);
        assert!(applied.event);
        assert_eq!(applied.points, 2);

        let home = store
            .series()
            .get(&SeriesKey::new("game-1", SeriesMetric::HomeScore))
            .unwrap();
        assert_eq!(home.last().unwrap().value, 21.0);
        assert!(store.event("game-1").unwrap().live);
        // Scores stay off the price chart.
        assert!(store.chart("game-1").columns.is_empty());
    }

    #[test]
    fn test_momentum_through_store() {
        let mut store = MarketStore::new(SeriesConfig::default());
        for (i, px) in [0.50, 0.52, 0.55].into_iter().enumerate() {
            store.apply(&aggregate("game-1", px), i as i64 * 2_000);
        }
        let m = store.aggregate_momentum("game-1").unwrap();
        assert!((m.change_pct - 10.0).abs() < 1e-9);
        assert!(store.momentum("game-1", "Yes").is_none());
    }

    #[test]
    fn test_remove_market() {
        let mut store = MarketStore::new(SeriesConfig::default());
        store.apply(&aggregate("game-1", 0.60), 1_000);
        store.apply(&score("game-1", "1 - 0"), 1_000);
        store.remove_market("game-1");
        assert!(store.prices().is_empty());
        assert!(store.events().is_empty());
        assert_eq!(store.series().series_count(), 0);
    }
}

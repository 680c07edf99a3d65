//! Bounded price/score history.
//!
//! One append-only series per `(market, metric)`. A point is appended
//! only if its value changed or enough time has passed since the last
//! point, which keeps flat stretches from bloating the series while
//! every real transition is preserved. Series are capped and evict the
//! oldest points first.

use std::collections::{BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use super::market::MarketId;

/// Default number of points retained per series.
pub const DEFAULT_MAX_LEN: usize = 500;

/// Default minimum spacing between two equal-valued points (ms).
pub const DEFAULT_MIN_SAMPLE_INTERVAL_MS: i64 = 1_000;

/// Default number of points the momentum window looks at.
pub const DEFAULT_MOMENTUM_WINDOW: usize = 5;

/// Momentum changes below this (in percent) are noise.
pub const DEFAULT_NOISE_THRESHOLD_PCT: f64 = 0.3;

/// One sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    /// Epoch milliseconds.
    pub time: i64,
    /// Sampled value.
    pub value: f64,
}

impl TimeSeriesPoint {
    /// Create a point.
    pub const fn new(time: i64, value: f64) -> Self {
        Self { time, value }
    }
}

/// What a series measures for its market.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SeriesMetric {
    /// Price of one named outcome.
    Side(String),
    /// Aggregate `currentPx` of the market.
    Aggregate,
    /// Home team score.
    HomeScore,
    /// Away team score.
    AwayScore,
}

impl SeriesMetric {
    /// Whether the series holds a price (as opposed to a score).
    pub const fn is_price(&self) -> bool {
        matches!(self, Self::Side(_) | Self::Aggregate)
    }

    /// Label used for chart columns.
    pub fn label(&self) -> &str {
        match self {
            Self::Side(name) => name,
            Self::Aggregate => "currentPx",
            Self::HomeScore => "home",
            Self::AwayScore => "away",
        }
    }
}

/// Key of one series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    /// Market the series belongs to.
    pub market_id: MarketId,
    /// Measured metric.
    pub metric: SeriesMetric,
}

impl SeriesKey {
    /// Key for an outcome price.
    pub fn side(market_id: impl Into<MarketId>, side: impl Into<String>) -> Self {
        Self {
            market_id: market_id.into(),
            metric: SeriesMetric::Side(side.into()),
        }
    }

    /// Key for an arbitrary metric.
    pub fn new(market_id: impl Into<MarketId>, metric: SeriesMetric) -> Self {
        Self {
            market_id: market_id.into(),
            metric,
        }
    }
}

/// Sampling and retention parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesConfig {
    /// Maximum retained points per series.
    pub max_len: usize,
    /// Minimum spacing for equal-valued points (ms).
    pub min_sample_interval_ms: i64,
    /// Momentum window size.
    pub momentum_window: usize,
    /// Momentum noise threshold (percent).
    pub noise_threshold_pct: f64,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_MAX_LEN,
            min_sample_interval_ms: DEFAULT_MIN_SAMPLE_INTERVAL_MS,
            momentum_window: DEFAULT_MOMENTUM_WINDOW,
            noise_threshold_pct: DEFAULT_NOISE_THRESHOLD_PCT,
        }
    }
}

/// Signed percentage change across the momentum window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Momentum {
    /// Change from the oldest to the newest point in the window, percent.
    pub change_pct: f64,
    /// Oldest value in the window.
    pub from: f64,
    /// Newest value in the window.
    pub to: f64,
}

impl Momentum {
    /// Whether the change is too small to display.
    pub fn is_noise(&self, threshold_pct: f64) -> bool {
        self.change_pct.abs() < threshold_pct
    }
}

/// One row of a merged chart: a timestamp and one value per column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartRow {
    /// Epoch milliseconds.
    pub time: i64,
    /// Last known value per column as of `time`; `None` before the
    /// column's first sample.
    pub values: Vec<Option<f64>>,
}

/// All price series of a market on one timestamp axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartSeries {
    /// Column labels, in the same order as `ChartRow::values`.
    pub columns: Vec<String>,
    /// Rows sorted by time.
    pub rows: Vec<ChartRow>,
}

/// A single capped series.
#[derive(Debug, Clone, Default)]
pub struct TimeSeries {
    points: VecDeque<TimeSeriesPoint>,
}

impl TimeSeries {
    /// Append under the sampling rule, then evict down to `max_len`.
    ///
    /// Returns `true` if the point was stored. Points older than the last
    /// stored point are rejected.
    pub fn append(&mut self, point: TimeSeriesPoint, config: &SeriesConfig) -> bool {
        if !point.value.is_finite() {
            return false;
        }
        if let Some(last) = self.points.back() {
            if point.time < last.time {
                return false;
            }
            let elapsed = (point.time - last.time).abs();
            #[allow(clippy::float_cmp)]
            let unchanged = point.value == last.value;
            if unchanged && elapsed <= config.min_sample_interval_ms {
                return false;
            }
        }
        self.points.push_back(point);
        while self.points.len() > config.max_len {
            self.points.pop_front();
        }
        true
    }

    /// Number of stored points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the series is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Most recent point.
    pub fn last(&self) -> Option<&TimeSeriesPoint> {
        self.points.back()
    }

    /// Points oldest first.
    pub fn points(&self) -> impl Iterator<Item = &TimeSeriesPoint> {
        self.points.iter()
    }

    /// Change across the last `window` points; `None` below two points
    /// or when the window starts at zero.
    pub fn momentum(&self, window: usize) -> Option<Momentum> {
        let window = window.min(self.points.len());
        if window < 2 {
            return None;
        }
        let from = self.points[self.points.len() - window].value;
        let to = self.points.back()?.value;
        if from == 0.0 {
            return None;
        }
        Some(Momentum {
            change_pct: (to - from) / from * 100.0,
            from,
            to,
        })
    }
}

/// Every series of every market.
#[derive(Debug, Clone, Default)]
pub struct TimeSeriesCache {
    config: SeriesConfig,
    series: HashMap<SeriesKey, TimeSeries>,
}

impl TimeSeriesCache {
    /// Empty cache with the given parameters.
    pub fn new(config: SeriesConfig) -> Self {
        Self {
            config,
            series: HashMap::new(),
        }
    }

    /// Sampling parameters in use.
    pub const fn config(&self) -> &SeriesConfig {
        &self.config
    }

    /// Append a point to a series, creating it on first use.
    pub fn append(&mut self, key: SeriesKey, point: TimeSeriesPoint) -> bool {
        let config = self.config;
        self.series.entry(key).or_default().append(point, &config)
    }

    /// Look up a series.
    pub fn get(&self, key: &SeriesKey) -> Option<&TimeSeries> {
        self.series.get(key)
    }

    /// Momentum over the configured window.
    pub fn momentum(&self, key: &SeriesKey) -> Option<Momentum> {
        self.momentum_with_window(key, self.config.momentum_window)
    }

    /// Momentum over an explicit window.
    pub fn momentum_with_window(&self, key: &SeriesKey, window: usize) -> Option<Momentum> {
        self.series.get(key)?.momentum(window)
    }

    /// Momentum only when it clears the noise threshold.
    pub fn significant_momentum(&self, key: &SeriesKey) -> Option<Momentum> {
        self.momentum(key)
            .filter(|m| !m.is_noise(self.config.noise_threshold_pct))
    }

    /// Drop every series of a market.
    pub fn remove_market(&mut self, market_id: &str) {
        self.series.retain(|key, _| key.market_id != market_id);
    }

    /// Number of series held.
    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    /// Merge every price series of a market onto a unified time axis.
    ///
    /// Each timestamp present in any series becomes a row; each column
    /// carries the most recent value known for that series at that time
    /// (step interpolation).
    pub fn build_chart_series(&self, market_id: &str) -> ChartSeries {
        let mut keyed: Vec<(&SeriesKey, &TimeSeries)> = self
            .series
            .iter()
            .filter(|(key, s)| key.market_id == market_id && key.metric.is_price() && !s.is_empty())
            .collect();
        keyed.sort_by(|a, b| a.0.metric.cmp(&b.0.metric));

        let axis: BTreeSet<i64> = keyed
            .iter()
            .flat_map(|(_, s)| s.points().map(|p| p.time))
            .collect();

        let columns = keyed
            .iter()
            .map(|(key, _)| key.metric.label().to_string())
            .collect();

        let mut cursors: Vec<_> = keyed
            .iter()
            .map(|(_, s)| s.points().peekable())
            .collect();
        let mut current: Vec<Option<f64>> = vec![None; keyed.len()];

        let rows = axis
            .into_iter()
            .map(|time| {
                for (slot, cursor) in current.iter_mut().zip(cursors.iter_mut()) {
                    while let Some(point) = cursor.next_if(|p| p.time <= time) {
                        *slot = Some(point.value);
                    }
                }
                ChartRow {
                    time,
                    values: current.clone(),
                }
            })
            .collect();

        ChartSeries { columns, rows }
    }
}

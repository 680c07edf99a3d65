//! Domain layer - Core tracking logic and models.
//!
//! Pure logic for the position tracker: market data shapes, wire
//! normalization, subscription sets, price history and valuation.
//! Nothing here performs I/O; every type is testable in isolation.

pub mod backoff;
pub mod ledger;
pub mod market;
pub mod normalizer;
pub mod subscription;
pub mod time_series;
pub mod valuation;

// Re-export core types for convenience
pub use backoff::ReconnectPolicy;
pub use ledger::{RealizedPnl, TradeAction, TradeFill, TradeLedger};
pub use market::{EventUpdate, MarketId, MarketPrices, PriceUpdate, SideName};
pub use normalizer::{ControlSignal, MarketUpdate, MessageNormalizer, NormalizedUpdate};
pub use subscription::{compute_desired_set, SubscriptionSet, MAX_SUBSCRIPTIONS};
pub use time_series::{
    ChartSeries, Momentum, SeriesConfig, SeriesKey, SeriesMetric, TimeSeriesCache,
    TimeSeriesPoint,
};
pub use valuation::{
    aggregate, effective_price, live_valuation, valuation, AggregateValuation, EffectivePrice,
    LiveValuation, Position, PriceSource,
};

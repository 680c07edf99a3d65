//! Use Cases Layer - Application Workflows
//!
//! Orchestrates domain logic with port interfaces. Each use case is a
//! self-contained operation of the tracker.
//!
//! Use cases:
//! - `StreamTransport`: Market stream session, reconnect and dispatch
//! - `MarketStore`: Latest prices, event state and price history
//! - `SubscriptionManager`: Desired set and transport reconciliation
//! - `PositionTracker`: Snapshot positions valued at live prices
//! - `PortfolioSync`: Periodic paginated snapshot pull

pub mod market_store;
pub mod portfolio_sync;
pub mod position_tracker;
pub mod stream_transport;
pub mod subscription_manager;

pub use market_store::{MarketStore, SharedMarketStore};
pub use portfolio_sync::{PortfolioSync, SyncReport, SyncStatus};
pub use position_tracker::{PortfolioSummary, PositionTracker, PositionView};
pub use stream_transport::{
  ConnectionState, StreamEvent, StreamHandle, StreamTransport, TransportConfig, TransportStatus,
};
pub use subscription_manager::{ReconcileAction, SubscriptionManager};

//! Portfolio Port - Authoritative Snapshot Source
//!
//! Positions and trade activity are pulled periodically from the REST
//! API. Both endpoints page with an opaque cursor; a page with
//! `eof = true` is the last one.

use async_trait::async_trait;

use crate::domain::ledger::TradeFill;
use crate::domain::valuation::Position;

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
  /// Items on this page.
  pub items: Vec<T>,
  /// Cursor for the next page.
  pub next_cursor: Option<String>,
  /// Whether this is the last page.
  pub eof: bool,
}

/// Source of position and activity snapshots.
#[async_trait]
pub trait PortfolioSource: Send + Sync + 'static {
  /// Fetch one page of positions.
  async fn positions_page(&self, cursor: Option<String>) -> anyhow::Result<Page<Position>>;

  /// Fetch one page of trade activity.
  async fn activity_page(&self, cursor: Option<String>) -> anyhow::Result<Page<TradeFill>>;
}

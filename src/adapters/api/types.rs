//! Portfolio API Request/Response Types
//!
//! Wire shapes of the position and activity snapshot endpoints, plus
//! their conversion into domain types. Decimal fields arrive either as
//! JSON numbers or as strings; both deserialize.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::ledger::{TradeAction, TradeFill};
use crate::domain::market::probability;
use crate::domain::valuation::Position;
use crate::ports::portfolio::Page;

/// Cursor-paginated envelope shared by both endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
  /// Items on this page.
  #[serde(default = "Vec::new")]
  pub data: Vec<T>,
  /// Opaque cursor for the next page.
  #[serde(default)]
  pub next_cursor: Option<String>,
  /// Whether this is the last page.
  #[serde(default)]
  pub eof: bool,
}

impl<T> PageResponse<T> {
  /// Convert items, dropping the ones that fail conversion.
  pub fn into_page<U>(self, convert: impl FnMut(T) -> Option<U>) -> Page<U> {
    Page {
      items: self.data.into_iter().filter_map(convert).collect(),
      next_cursor: self.next_cursor.filter(|c| !c.is_empty()),
      eof: self.eof,
    }
  }
}

/// One position as reported by the API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionDto {
  /// Market slug.
  #[serde(alias = "market", alias = "slug")]
  pub market_slug: String,
  /// Outcome name held.
  #[serde(alias = "side")]
  pub outcome: String,
  /// Contracts held.
  #[serde(alias = "quantity")]
  pub size: Decimal,
  /// Total cost paid.
  #[serde(alias = "initialValue")]
  pub cost_basis: Decimal,
  /// Authoritative cash value, when the API computed one.
  #[serde(default, alias = "currentValue")]
  pub cash_value: Option<Decimal>,
  /// Price the API valued the position at.
  #[serde(default, alias = "curPrice")]
  pub current_price: Option<f64>,
}

impl PositionDto {
  /// Convert into a domain position stamped with the pull time.
  pub fn into_position(self, snapshot_at_ms: i64) -> Option<Position> {
    if self.market_slug.is_empty() || self.outcome.is_empty() {
      return None;
    }
    Some(Position {
      market_id: self.market_slug,
      side: self.outcome,
      quantity: self.size,
      cost_basis: self.cost_basis,
      authoritative_cash_value: self.cash_value,
      last_known_price: self.current_price.and_then(probability),
      snapshot_at_ms,
    })
  }
}

/// One activity (trade) record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDto {
  /// Record type; only `TRADE` records feed the ledger.
  #[serde(default, rename = "type")]
  pub kind: Option<String>,
  /// Market slug.
  #[serde(alias = "market", alias = "slug")]
  pub market_slug: String,
  /// Outcome traded.
  pub outcome: String,
  /// BUY or SELL.
  pub side: TradeAction,
  /// Contracts traded.
  pub size: Decimal,
  /// Fill price.
  pub price: Decimal,
  /// Fee paid.
  #[serde(default)]
  pub fee: Option<Decimal>,
  /// Fill time (Unix seconds).
  pub timestamp: i64,
}

impl ActivityDto {
  /// Convert into a ledger fill; non-trade records are skipped.
  pub fn into_fill(self) -> Option<TradeFill> {
    if self.kind.as_deref().is_some_and(|k| !k.eq_ignore_ascii_case("TRADE")) {
      return None;
    }
    Some(TradeFill {
      market_id: self.market_slug,
      side: self.outcome,
      action: self.side,
      quantity: self.size,
      price: self.price,
      fee: self.fee.unwrap_or_default(),
      timestamp_ms: self.timestamp.saturating_mul(1_000),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal_macros::dec;

  #[test]
  fn test_position_page_parses() {
    let raw = r#"{
      "data": [
        {"marketSlug":"game-1","outcome":"Lakers","size":"100","initialValue":"45.5","currentValue":"60","curPrice":0.6},
        {"marketSlug":"","outcome":"X","size":1,"initialValue":1}
      ],
      "nextCursor": "abc",
      "eof": false
    }"#;
    let resp: PageResponse<PositionDto> = serde_json::from_str(raw).unwrap();
    let page = resp.into_page(|p| p.into_position(42));
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.next_cursor.as_deref(), Some("abc"));
    assert!(!page.eof);

    let pos = &page.items[0];
    assert_eq!(pos.market_id, "game-1");
    assert_eq!(pos.quantity, dec!(100));
    assert_eq!(pos.cost_basis, dec!(45.5));
    assert_eq!(pos.authoritative_cash_value, Some(dec!(60)));
    assert_eq!(pos.last_known_price, Some(0.6));
    assert_eq!(pos.snapshot_at_ms, 42);
  }

  #[test]
  fn test_decimal_fields_accept_numbers_and_strings() {
    let raw = r#"{"data":[
      {"marketSlug":"game-2","outcome":"Yes","size":25,"initialValue":"7.25","currentValue":8.5}
    ]}"#;
    let resp: PageResponse<PositionDto> = serde_json::from_str(raw).unwrap();
    let pos = &resp.into_page(|p| p.into_position(0)).items[0];
    assert_eq!(pos.quantity, dec!(25));
    assert_eq!(pos.cost_basis, dec!(7.25));
    assert_eq!(pos.authoritative_cash_value, Some(dec!(8.5)));

    // Amounts go out as strings.
    assert_eq!(serde_json::to_value(dec!(7.25)).unwrap(), serde_json::json!("7.25"));
  }

  #[test]
  fn test_activity_skips_non_trades() {
    let raw = r#"{
      "data": [
        {"type":"TRADE","marketSlug":"game-1","outcome":"Yes","side":"BUY","size":"10","price":"0.4","timestamp":1700000000},
        {"type":"REDEEM","marketSlug":"game-1","outcome":"Yes","side":"SELL","size":"10","price":"1","timestamp":1700000001}
      ],
      "eof": true
    }"#;
    let resp: PageResponse<ActivityDto> = serde_json::from_str(raw).unwrap();
    let page = resp.into_page(ActivityDto::into_fill);
    assert!(page.eof);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].action, TradeAction::Buy);
    assert_eq!(page.items[0].fee, Decimal::ZERO);
    assert_eq!(page.items[0].timestamp_ms, 1_700_000_000_000);
  }

  #[test]
  fn test_empty_cursor_treated_as_none() {
    let resp: PageResponse<ActivityDto> =
      serde_json::from_str(r#"{"data":[],"nextCursor":""}"#).unwrap();
    let page = resp.into_page(ActivityDto::into_fill);
    assert_eq!(page.next_cursor, None);
  }
}

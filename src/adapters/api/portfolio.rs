//! REST implementation of the `PortfolioSource` port.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use tracing::instrument;

use super::client::ApiClient;
use super::types::{ActivityDto, PageResponse, PositionDto};
use crate::config::ApiConfig;
use crate::domain::ledger::TradeFill;
use crate::domain::valuation::Position;
use crate::ports::portfolio::{Page, PortfolioSource};

/// Throwaway origin for building path-and-query strings.
const PATH_BASE: &str = "http://localhost";

/// Position and activity endpoints for one account.
pub struct RestPortfolio {
  client: Arc<ApiClient>,
  positions_path: String,
  activity_path: String,
}

impl RestPortfolio {
  /// Bind the client to the configured endpoint paths.
  pub fn new(client: Arc<ApiClient>, config: &ApiConfig) -> Self {
    Self {
      client,
      positions_path: config.positions_path.clone(),
      activity_path: config.activity_path.clone(),
    }
  }
}

/// Append the cursor as a percent-encoded query parameter.
///
/// The result is both the request path and the signed path.
fn with_cursor(path: &str, cursor: Option<&str>) -> Result<String> {
  let Some(cursor) = cursor else {
    return Ok(path.to_string());
  };

  let mut url = Url::parse(PATH_BASE)?
    .join(path)
    .with_context(|| format!("invalid endpoint path {path:?}"))?;
  url.query_pairs_mut().append_pair("cursor", cursor);

  Ok(match url.query() {
    Some(query) => format!("{}?{query}", url.path()),
    None => url.path().to_string(),
  })
}

#[async_trait]
impl PortfolioSource for RestPortfolio {
  #[instrument(skip(self))]
  async fn positions_page(&self, cursor: Option<String>) -> Result<Page<Position>> {
    let path = with_cursor(&self.positions_path, cursor.as_deref())?;
    let resp: PageResponse<PositionDto> = self.client.get_json(&path).await?;
    let now_ms = Utc::now().timestamp_millis();
    Ok(resp.into_page(|p| p.into_position(now_ms)))
  }

  #[instrument(skip(self))]
  async fn activity_page(&self, cursor: Option<String>) -> Result<Page<TradeFill>> {
    let path = with_cursor(&self.activity_path, cursor.as_deref())?;
    let resp: PageResponse<ActivityDto> = self.client.get_json(&path).await?;
    Ok(resp.into_page(ActivityDto::into_fill))
  }
}

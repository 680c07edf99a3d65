//! Stream Port - Long-lived Market Data Connection
//!
//! The transport only needs two things from the network: open a
//! connection for a subscription directive, and read text frames from it.
//! Transport-level keep-alives (ping/pong) never surface through
//! `FrameStream`.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::market::MarketId;
use crate::error::TransportError;

use super::credentials::Credential;

/// Subscribe directive sent right after the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeDirective {
  /// Upstream subscription type (e.g. market data lite).
  pub subscription_type: String,
  /// Markets, already truncated to the upstream limit.
  pub market_ids: Vec<MarketId>,
}

/// Everything needed to open one connection.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
  /// What to subscribe to.
  pub directive: SubscribeDirective,
  /// Handshake credential.
  pub credential: Credential,
}

/// An open connection yielding text frames.
#[async_trait]
pub trait FrameStream: Send {
  /// Next text frame; `None` once the server closed the stream.
  async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;

  /// Close the connection. Must be safe to call more than once.
  async fn close(&mut self);
}

/// Opens connections to the upstream stream.
#[async_trait]
pub trait StreamConnector: Send + Sync + 'static {
  /// Handshake, send the subscribe directive, return the frame stream.
  async fn connect(
    &self,
    request: ConnectRequest,
  ) -> Result<Box<dyn FrameStream>, TransportError>;
}

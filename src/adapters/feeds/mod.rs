//! Market Data Feed Adapters - Live Stream Connection
//!
//! WebSocket connector for the authenticated Polymarket live-data
//! stream. Session policy (reconnect, subscriptions) lives in
//! `usecases::stream_transport`; this layer only moves frames.

pub mod ws_connector;

pub use ws_connector::WsConnector;

//! Market Stream WebSocket Connector
//!
//! Implements the `StreamConnector` port over tokio-tungstenite. The
//! handshake carries the signed credential as headers; the subscribe
//! directive is sent as the first text frame. Ping/pong and binary noise
//! never reach the transport.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument};

use crate::adapters::api::auth::{
    HEADER_API_KEY, HEADER_PASSPHRASE, HEADER_SIGNATURE, HEADER_TIMESTAMP,
};
use crate::error::TransportError;
use crate::ports::stream::{ConnectRequest, FrameStream, StreamConnector};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to the upstream market stream.
pub struct WsConnector {
    /// WebSocket URL from config.
    ws_url: String,
}

impl WsConnector {
    /// Create a connector for `ws_url`.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
        }
    }
}

fn header(value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value).map_err(|e| TransportError::connect(format!("bad header: {e}")))
}

#[async_trait]
impl StreamConnector for WsConnector {
    #[instrument(skip(self, request), fields(markets = request.directive.market_ids.len()))]
    async fn connect(
        &self,
        request: ConnectRequest,
    ) -> Result<Box<dyn FrameStream>, TransportError> {
        let mut ws_request = self
            .ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::connect(e.to_string()))?;

        let cred = &request.credential;
        let headers = ws_request.headers_mut();
        headers.insert(HEADER_API_KEY, header(&cred.key_id)?);
        headers.insert(HEADER_TIMESTAMP, header(&cred.timestamp)?);
        headers.insert(HEADER_SIGNATURE, header(&cred.signature)?);
        if let Some(passphrase) = &cred.passphrase {
            headers.insert(HEADER_PASSPHRASE, header(passphrase)?);
        }

        let (mut ws, _) = connect_async(ws_request)
            .await
            .map_err(|e| TransportError::connect(e.to_string()))?;

        let directive = serde_json::to_string(&request.directive)
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;
        ws.send(Message::Text(directive.into()))
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        info!(url = %self.ws_url, "Market stream connected");
        Ok(Box::new(WsFrameStream { ws, closed: false }))
    }
}

/// Text-frame view of a live WebSocket.
struct WsFrameStream {
    ws: WsStream,
    closed: bool,
}

#[async_trait]
impl FrameStream for WsFrameStream {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        if self.closed {
            return None;
        }
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text.to_string())),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => debug!("Non-UTF8 binary frame ignored"),
                },
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = self.ws.send(Message::Pong(payload)).await {
                        return Some(Err(TransportError::stream(e.to_string())));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Market stream closed by server");
                    self.closed = true;
                    return None;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Some(Err(TransportError::stream(e.to_string()))),
                None => {
                    self.closed = true;
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.ws.close(None).await;
        }
    }
}

//! Error types for the streaming layer.
//!
//! Only two conditions ever reach the consumer: a credential failure and
//! exhausted reconnects. Everything else is recovered inside the
//! transport and only logged.

use std::time::Duration;

use thiserror::Error;

/// Failure of one connection attempt or of a live connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Handshake or socket setup failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The handshake did not complete in time.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// The subscribe directive could not be sent.
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// The live connection errored.
    #[error("stream error: {0}")]
    Stream(String),

    /// The server closed the connection.
    #[error("stream closed by server")]
    Closed,
}

impl TransportError {
    pub fn connect(msg: impl Into<String>) -> Self {
        Self::Connect(msg.into())
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }
}

/// User-actionable streaming failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The credential provider failed; needs manual retry.
    #[error("credential fetch failed: {0}")]
    Credential(String),

    /// Automatic reconnects gave up.
    #[error("reconnect failed after {attempts} attempts, retry manually: {last}")]
    ReconnectExhausted {
        /// Automatic attempts made.
        attempts: u32,
        /// Last transport error seen.
        last: TransportError,
    },

    /// The transport task is gone.
    #[error("stream transport is not running")]
    TransportStopped,
}

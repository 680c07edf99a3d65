//! Credential Port - Short-lived Request Credentials
//!
//! The stream handshake and every REST snapshot call carry a signed
//! timestamp. How the signature is produced is the provider's business.

use async_trait::async_trait;

/// Headers material for one signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
  /// Public key identifier.
  pub key_id: String,
  /// Passphrase bound to the key, if the scheme uses one.
  pub passphrase: Option<String>,
  /// Signing timestamp (Unix seconds, as sent on the wire).
  pub timestamp: String,
  /// Signature over timestamp + method + path.
  pub signature: String,
}

/// Produces fresh credentials for `(method, path)`.
///
/// Fetching may be asynchronous (a remote signer) and may fail; a failure
/// is fatal to the request or connection attempt that asked for it.
#[async_trait]
pub trait CredentialProvider: Send + Sync + 'static {
  /// Sign a request.
  async fn credential(&self, method: &str, path: &str) -> anyhow::Result<Credential>;
}

//! API Authentication: HMAC-SHA256 Request Signing
//!
//! Signs the stream handshake and every REST snapshot request.
//! Credentials come from environment variables
//! (POLY_API_KEY, POLY_API_SECRET, POLY_PASSPHRASE).

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use base64::Engine;

use crate::ports::credentials::{Credential, CredentialProvider};

/// Header names shared by the REST client and the stream handshake.
/// Lowercase, as `HeaderName::from_static` requires.
pub const HEADER_API_KEY: &str = "poly_api_key";
pub const HEADER_PASSPHRASE: &str = "poly_passphrase";
pub const HEADER_TIMESTAMP: &str = "poly_timestamp";
pub const HEADER_SIGNATURE: &str = "poly_signature";

/// Locally held API key pair.
///
/// The secret never leaves this struct; only signatures computed from it
/// are handed out.
pub struct HmacAuth {
    /// API key from POLY_API_KEY env var.
    api_key: String,
    /// API secret from POLY_API_SECRET env var (never sent in headers).
    api_secret: String,
    /// Passphrase from POLY_PASSPHRASE env var.
    passphrase: String,
}

impl std::fmt::Debug for HmacAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacAuth")
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

impl HmacAuth {
    /// Build from explicit values.
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Result<Self> {
        let auth = Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            passphrase: passphrase.into(),
        };
        ensure!(!auth.api_key.is_empty(), "API key must not be empty");
        ensure!(!auth.api_secret.is_empty(), "API secret must not be empty");
        Ok(auth)
    }

    /// Load credentials from environment variables.
    ///
    /// POLY_API_KEY and POLY_API_SECRET are required; POLY_PASSPHRASE is
    /// optional for key pairs issued without one.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("POLY_API_KEY").context("POLY_API_KEY not set")?;
        let api_secret = std::env::var("POLY_API_SECRET").context("POLY_API_SECRET not set")?;
        let passphrase = std::env::var("POLY_PASSPHRASE").unwrap_or_default();
        Self::new(api_key, api_secret, passphrase)
    }

    /// Current Unix timestamp in seconds.
    fn timestamp() -> String {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .to_string()
    }

    /// HMAC-SHA256(secret, timestamp + method + path), base64 encoded.
    pub fn sign(&self, timestamp: &str, method: &str, path: &str) -> String {
        let message = format!("{timestamp}{method}{path}");
        let mac = hmac_sha256::HMAC::mac(message.as_bytes(), self.api_secret.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac)
    }
}

#[async_trait]
impl CredentialProvider for HmacAuth {
    async fn credential(&self, method: &str, path: &str) -> Result<Credential> {
        let timestamp = Self::timestamp();
        let signature = self.sign(&timestamp, method, path);
        Ok(Credential {
            key_id: self.api_key.clone(),
            passphrase: (!self.passphrase.is_empty()).then(|| self.passphrase.clone()),
            timestamp,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_is_deterministic() {
        let auth = HmacAuth::new("key", "secret", "pass").unwrap();
        let a = auth.sign("1700000000", "GET", "/positions");
        let b = auth.sign("1700000000", "GET", "/positions");
        assert_eq!(a, b);
        assert_ne!(a, auth.sign("1700000001", "GET", "/positions"));
        assert_ne!(a, auth.sign("1700000000", "GET", "/activity"));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(HmacAuth::new("key", "", "pass").is_err());
        assert!(HmacAuth::new("", "secret", "pass").is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let auth = HmacAuth::new("key", "very-secret", "pass").unwrap();
        assert!(!format!("{auth:?}").contains("very-secret"));
    }

    #[tokio::test]
    async fn test_credential_carries_key_and_signature() {
        let auth = HmacAuth::new("key", "secret", "").unwrap();
        let cred = auth.credential("GET", "/stream").await.unwrap();
        assert_eq!(cred.key_id, "key");
        assert_eq!(cred.passphrase, None);
        assert_eq!(cred.signature, auth.sign(&cred.timestamp, "GET", "/stream"));
    }
}

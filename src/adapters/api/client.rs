//! Portfolio HTTP Client - Signed REST Client with Retries
//!
//! Wraps reqwest with concurrency limiting, retries, and request signing
//! for the position and activity snapshot endpoints.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::auth::{HEADER_API_KEY, HEADER_PASSPHRASE, HEADER_SIGNATURE, HEADER_TIMESTAMP};
use crate::config::ApiConfig;
use crate::ports::credentials::CredentialProvider;

/// Configuration for the portfolio HTTP client.
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
  /// Base URL for the REST API.
  pub base_url: String,
  /// Request timeout.
  pub timeout: Duration,
  /// Maximum concurrent requests.
  pub max_concurrent: usize,
  /// Maximum retries on transient errors.
  pub max_retries: u32,
  /// Base delay between retries (exponential backoff).
  pub retry_base_delay: Duration,
}

impl Default for ApiClientConfig {
  fn default() -> Self {
    Self {
      base_url: "https://data-api.polymarket.com".to_string(),
      timeout: Duration::from_secs(30),
      max_concurrent: 4,
      max_retries: 3,
      retry_base_delay: Duration::from_millis(200),
    }
  }
}

impl From<&ApiConfig> for ApiClientConfig {
  fn from(config: &ApiConfig) -> Self {
    Self {
      base_url: config.base_url.trim_end_matches('/').to_string(),
      timeout: Duration::from_secs(config.timeout_seconds),
      ..Self::default()
    }
  }
}

/// Signed, concurrency-limited HTTP client.
pub struct ApiClient {
  /// Underlying HTTP client.
  http: Client,
  /// Request signer.
  credentials: Arc<dyn CredentialProvider>,
  /// Client configuration.
  config: ApiClientConfig,
  /// Concurrency limiter.
  semaphore: Arc<Semaphore>,
}

impl ApiClient {
  /// Create a new client.
  pub fn new(credentials: Arc<dyn CredentialProvider>, config: ApiClientConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(config.timeout)
      .pool_max_idle_per_host(2)
      .build()
      .context("Failed to build HTTP client")?;

    let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));

    Ok(Self {
      http,
      credentials,
      config,
      semaphore,
    })
  }

  /// GET `path` and decode the JSON body.
  pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    let response = self.get(path).await?;
    response
      .json::<T>()
      .await
      .with_context(|| format!("Invalid JSON from {path}"))
  }

  /// Execute a signed GET with retries on 429, 5xx and network errors.
  pub async fn get(&self, path: &str) -> Result<Response> {
    let _permit = self
      .semaphore
      .acquire()
      .await
      .context("Semaphore closed")?;

    let url = format!("{}{}", self.config.base_url, path);
    let mut last_error = None;

    for attempt in 0..=self.config.max_retries {
      if attempt > 0 {
        let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1);
        debug!(attempt, delay_ms = delay.as_millis(), "Retrying request");
        sleep(delay).await;
      }

      // A signer failure is not transient; do not retry it.
      let cred = self
        .credentials
        .credential("GET", path)
        .await
        .context("Credential fetch failed")?;

      let mut req = self
        .http
        .get(&url)
        .header(HEADER_API_KEY, &cred.key_id)
        .header(HEADER_TIMESTAMP, &cred.timestamp)
        .header(HEADER_SIGNATURE, &cred.signature);
      if let Some(passphrase) = &cred.passphrase {
        req = req.header(HEADER_PASSPHRASE, passphrase);
      }

      match req.send().await {
        Ok(response) => match response.status() {
          status if status.is_success() => return Ok(response),
          StatusCode::TOO_MANY_REQUESTS => {
            warn!(path, "Rate limited by API, backing off");
            last_error = Some(anyhow::anyhow!("Rate limited"));
          }
          status if status.is_server_error() => {
            warn!(status = %status, path, "Server error, retrying");
            last_error = Some(anyhow::anyhow!("Server error: {status}"));
          }
          status => {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("API error {status}: {body}"));
          }
        },
        Err(e) => {
          warn!(error = %e, attempt, path, "Request failed");
          last_error = Some(e.into());
        }
      }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Max retries exceeded")))
  }
}

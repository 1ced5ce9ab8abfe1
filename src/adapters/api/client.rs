//! CLOB HTTP Client - Rate-limited REST API Client
//!
//! Wraps reqwest with a client-side rate limiter, a concurrency cap and
//! authentication. Reads (GET) retry transient failures with exponential
//! backoff. Writes (POST/DELETE) are sent exactly once: retrying an order
//! submission after an ambiguous failure risks a double fill, and cancel
//! retries are owned by the execution engine.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::auth::ClobAuth;
use crate::config::ApiConfig;

/// Retries for idempotent reads.
const MAX_READ_RETRIES: u32 = 3;
/// Base delay between read retries.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Rate-limited HTTP client for the CLOB API.
pub struct ClobHttp {
  /// Underlying HTTP client.
  http: Client,
  /// Credentials; unauthenticated when absent (public reads only).
  auth: Option<Arc<ClobAuth>>,
  /// API base URL, no trailing slash.
  base_url: String,
  /// Concurrency limiter.
  semaphore: Semaphore,
  /// Request-rate limiter.
  limiter: DefaultDirectRateLimiter,
}

impl ClobHttp {
  /// Build a client from API config.
  ///
  /// # Errors
  /// The HTTP client cannot be constructed.
  pub fn new(config: &ApiConfig, auth: Option<Arc<ClobAuth>>) -> Result<Self> {
    let http = Client::builder()
      .timeout(Duration::from_secs(config.timeout_seconds))
      .pool_max_idle_per_host(config.max_concurrent)
      .build()
      .context("Failed to build HTTP client")?;
    let rate = NonZeroU32::new(config.max_requests_per_second).unwrap_or(NonZeroU32::MIN);

    Ok(Self {
      http,
      auth,
      base_url: config.clob_url.trim_end_matches('/').to_string(),
      semaphore: Semaphore::new(config.max_concurrent.max(1)),
      limiter: RateLimiter::direct(Quota::per_second(rate)),
    })
  }

  /// GET and decode JSON, retrying transient failures.
  pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    let mut last_error = None;
    for attempt in 0..=MAX_READ_RETRIES {
      if attempt > 0 {
        let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
        debug!(path, attempt, delay_ms = delay.as_millis(), "Retrying read");
        sleep(delay).await;
      }
      match self.send(Method::GET, path, None).await {
        Ok(body) => {
          return serde_json::from_str(&body).with_context(|| format!("Failed to decode {path}"));
        }
        Err(RequestError::Transient(e)) => {
          warn!(path, attempt, error = %e, "Transient read failure");
          last_error = Some(e);
        }
        Err(RequestError::Fatal(e)) => return Err(e),
      }
    }
    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Max retries exceeded for {path}")))
  }

  /// POST a JSON body once and decode the reply.
  pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
    self.write_json(Method::POST, path, body).await
  }

  /// DELETE with a JSON body once and decode the reply.
  pub async fn delete_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
    self.write_json(Method::DELETE, path, body).await
  }

  async fn write_json<B: Serialize + ?Sized, T: DeserializeOwned>(
    &self,
    method: Method,
    path: &str,
    body: &B,
  ) -> Result<T> {
    let payload = serde_json::to_string(body).context("Failed to encode request body")?;
    let reply = self
      .send(method, path, Some(payload))
      .await
      .map_err(RequestError::into_inner)?;
    serde_json::from_str(&reply).with_context(|| format!("Failed to decode {path}"))
  }

  /// One request with auth, rate limiting and status classification.
  async fn send(&self, method: Method, path: &str, body: Option<String>) -> Result<String, RequestError> {
    let _permit = self
      .semaphore
      .acquire()
      .await
      .map_err(|e| RequestError::Fatal(e.into()))?;
    self.limiter.until_ready().await;

    let url = format!("{}{}", self.base_url, path);
    let mut request: RequestBuilder = self.http.request(method.clone(), &url);
    let body_text = body.unwrap_or_default();
    if let Some(auth) = &self.auth {
      let h = auth.headers(method.as_str(), path, &body_text);
      request = request
        .header("POLY_API_KEY", h.api_key)
        .header("POLY_PASSPHRASE", h.passphrase)
        .header("POLY_TIMESTAMP", h.timestamp)
        .header("POLY_SIGNATURE", h.signature);
    }
    if !body_text.is_empty() {
      request = request
        .header("Content-Type", "application/json")
        .body(body_text);
    }

    let response = request
      .send()
      .await
      .map_err(|e| RequestError::Transient(e.into()))?;
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match status {
      s if s.is_success() => Ok(text),
      StatusCode::TOO_MANY_REQUESTS => Err(RequestError::Transient(anyhow::anyhow!("Rate limited by CLOB API"))),
      s if s.is_server_error() => Err(RequestError::Transient(anyhow::anyhow!("Server error {s}: {text}"))),
      s => Err(RequestError::Fatal(anyhow::anyhow!("API error {s}: {text}"))),
    }
  }
}

/// Whether a failed request may be retried.
enum RequestError {
  Transient(anyhow::Error),
  Fatal(anyhow::Error),
}

impl RequestError {
  fn into_inner(self) -> anyhow::Error {
    match self {
      Self::Transient(e) | Self::Fatal(e) => e,
    }
  }
}

//! Request dispatcher: one logical remote call with timeout, retry with
//! exponential backoff, and response normalization.
//!
//! The remote store exposes a single URL. Side-effect-free reads go out as
//! `GET ?fn=...&payload=...`; mutations go out as a `POST` with a JSON body.
//! Both resolve to the same envelope shape, and reads may additionally wrap
//! the payload one level deeper under a `result` field, which is unwrapped
//! here so callers always see the innermost value.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::error::ApiError;

/// Identifies one logical remote call. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
  /// Name of the remote operation (e.g. `listMaterials`).
  pub function: String,
  /// Serialized argument structure, or None for argument-less calls.
  pub payload: Option<Value>,
  /// Freshness window for the cache layer; zero means "never cache".
  pub cache_ttl: Duration,
  /// Per-attempt timeout; an elapsed attempt counts as a failure.
  pub timeout: Duration,
  /// Additional attempts after the first.
  pub max_retries: u32,
  /// Base delay for exponential backoff between attempts.
  pub backoff_base: Duration,
}

impl RequestDescriptor {
  pub fn new(function: impl Into<String>, payload: Option<Value>) -> Self {
    Self {
      function: function.into(),
      payload,
      cache_ttl: Duration::ZERO,
      timeout: Duration::from_millis(12_000),
      max_retries: 2,
      backoff_base: Duration::from_millis(500),
    }
  }

  pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
    self.cache_ttl = ttl;
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn with_retries(mut self, max_retries: u32, backoff_base: Duration) -> Self {
    self.max_retries = max_retries;
    self.backoff_base = backoff_base;
    self
  }

  /// Deterministic cache key for this call.
  ///
  /// Payloads are built from typed structs, so their JSON field order is
  /// fixed and structurally equal payloads serialize identically.
  pub fn cache_key(&self) -> String {
    let payload = self
      .payload
      .as_ref()
      .map(Value::to_string)
      .unwrap_or_default();
    format!("cache:{}:{}", self.function, payload)
  }
}

/// Transport seam between the dispatcher and the wire.
///
/// Both calls return the raw response body; parsing and envelope handling
/// happen in the dispatcher so mock transports stay trivial.
pub trait Transport: Send + Sync {
  fn query(
    &self,
    function: &str,
    payload: Option<&Value>,
  ) -> impl Future<Output = Result<String, ApiError>> + Send;

  fn command(
    &self,
    function: &str,
    payload: &Value,
  ) -> impl Future<Output = Result<String, ApiError>> + Send;
}

/// HTTP transport against the remote function endpoint.
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpTransport {
  pub fn new(base_url: &str) -> Result<Self> {
    let base_url =
      Url::parse(base_url).map_err(|e| eyre!("Invalid endpoint URL {}: {}", base_url, e))?;
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, base_url })
  }
}

impl Transport for HttpTransport {
  async fn query(&self, function: &str, payload: Option<&Value>) -> Result<String, ApiError> {
    let mut url = self.base_url.clone();
    {
      let mut pairs = url.query_pairs_mut();
      pairs.append_pair("fn", function);
      if let Some(p) = payload {
        pairs.append_pair("payload", &p.to_string());
      }
    }

    let response = self
      .client
      .get(url)
      .send()
      .await
      .map_err(|e| ApiError::Transport(e.to_string()))?;

    response
      .text()
      .await
      .map_err(|e| ApiError::Transport(e.to_string()))
  }

  async fn command(&self, function: &str, payload: &Value) -> Result<String, ApiError> {
    let body = serde_json::json!({ "fn": function, "payload": payload });

    // text/plain avoids a CORS preflight against the remote store.
    let response = self
      .client
      .post(self.base_url.clone())
      .header("Content-Type", "text/plain;charset=utf-8")
      .body(body.to_string())
      .send()
      .await
      .map_err(|e| ApiError::Transport(e.to_string()))?;

    response
      .text()
      .await
      .map_err(|e| ApiError::Transport(e.to_string()))
  }
}

/// Issues logical calls to the remote endpoint.
///
/// Purely functional from the caller's point of view: no state beyond the
/// transport, no side effects beyond the network call itself.
pub struct Dispatcher<T: Transport> {
  transport: T,
}

impl<T: Transport> Dispatcher<T> {
  pub fn new(transport: T) -> Self {
    Self { transport }
  }

  #[cfg(test)]
  pub(crate) fn transport(&self) -> &T {
    &self.transport
  }

  /// Perform a read with timeout, retry, and backoff.
  ///
  /// Only timeout and transport failures are retried. A body that parses but
  /// reports a logical failure is returned as-is so the caller can decide;
  /// a non-parseable body fails with [`ApiError::Malformed`] immediately.
  pub async fn query(&self, desc: &RequestDescriptor) -> Result<Value, ApiError> {
    let mut attempt = 0u32;
    loop {
      let result = self
        .attempt(desc.timeout, self.transport.query(&desc.function, desc.payload.as_ref()))
        .await;

      match result {
        Ok(value) => return Ok(value),
        Err(e) if e.is_retryable() && attempt < desc.max_retries => {
          attempt += 1;
          let delay = desc.backoff_base * 2u32.pow(attempt - 1);
          warn!(
            function = %desc.function,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %e,
            "query attempt failed, backing off"
          );
          tokio::time::sleep(delay).await;
        }
        Err(e) => return Err(e),
      }
    }
  }

  /// Perform a mutation. Never retried, never cached.
  pub async fn command(
    &self,
    function: &str,
    payload: Value,
    timeout: Duration,
  ) -> Result<Value, ApiError> {
    debug!(function, "dispatching command");
    self
      .attempt(timeout, self.transport.command(function, &payload))
      .await
  }

  async fn attempt<F>(&self, timeout: Duration, call: F) -> Result<Value, ApiError>
  where
    F: Future<Output = Result<String, ApiError>>,
  {
    let body = tokio::time::timeout(timeout, call)
      .await
      .map_err(|_| ApiError::Timeout {
        timeout_ms: timeout.as_millis() as u64,
      })??;

    let value: Value =
      serde_json::from_str(&body).map_err(|e| ApiError::Malformed(e.to_string()))?;

    Ok(unwrap_envelope(value))
  }
}

/// Unwrap one level of `{"result": ...}` envelope if present.
fn unwrap_envelope(value: Value) -> Value {
  match value {
    Value::Object(mut map) if map.contains_key("result") => {
      map.remove("result").unwrap_or(Value::Null)
    }
    other => other,
  }
}

//! Cache layer that orchestrates TTL checks, fetching, and stale fallback.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::{ApiError, Dispatcher, RequestDescriptor, Transport};

use super::storage::{CacheEntry, CacheStorage};

/// Time-boxed cache over read dispatches.
///
/// This layer sits between the typed client and the dispatcher, returning
/// fresh cached values without a network round trip, refreshing on expiry,
/// and falling back to a stale value when a refresh fails.
#[derive(Clone)]
pub struct CacheLayer {
  storage: Arc<dyn CacheStorage>,
}

impl CacheLayer {
  pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
    Self { storage }
  }

  /// Read through the cache per the descriptor's TTL.
  ///
  /// 1. Fresh entry: return it, no dispatch.
  /// 2. Miss or expired: dispatch; on success overwrite the entry.
  /// 3. Dispatch failed after retries: return the stored value at any age
  ///    if one exists, otherwise propagate. Only timeout/transport failures
  ///    fall back; malformed and logical failures surface verbatim.
  ///
  /// A zero TTL bypasses the cache entirely in both directions.
  pub async fn read<T: Transport>(
    &self,
    dispatcher: &Dispatcher<T>,
    desc: &RequestDescriptor,
  ) -> Result<Value, ApiError> {
    if desc.cache_ttl.is_zero() {
      return dispatcher.query(desc).await;
    }

    let key = desc.cache_key();
    if let Some(entry) = self.lookup(&key) {
      let age = (Utc::now() - entry.stored_at).to_std().unwrap_or_default();
      if age <= desc.cache_ttl {
        debug!(key, "cache hit");
        return Ok(entry.value);
      }
      debug!(key, age_ms = age.as_millis() as u64, "cache entry expired");
    }

    match dispatcher.query(desc).await {
      Ok(value) => {
        if let Err(e) = self.storage.put(&key, &value, Utc::now()) {
          // A failed write degrades to an uncached read.
          warn!(key, error = %e, "failed to store cache entry");
        }
        Ok(value)
      }
      Err(e) if e.is_retryable() => match self.lookup(&key) {
        Some(entry) => {
          info!(key, error = %e, "serving stale cache entry after fetch failure");
          Ok(entry.value)
        }
        None => Err(ApiError::NoFallback {
          key,
          source: Box::new(e),
        }),
      },
      Err(e) => Err(e),
    }
  }

  /// Startup sweep: evict entries older than `max_age` from the backing
  /// store. Distinct from per-descriptor TTL freshness.
  pub fn sweep(&self, max_age: std::time::Duration) -> usize {
    let max_age = chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::MAX);
    match self.storage.sweep(max_age) {
      Ok(removed) => {
        if removed > 0 {
          info!(removed, "swept expired cache entries");
        }
        removed
      }
      Err(e) => {
        warn!(error = %e, "cache sweep failed");
        0
      }
    }
  }

  pub fn storage(&self) -> &Arc<dyn CacheStorage> {
    &self.storage
  }

  fn lookup(&self, key: &str) -> Option<CacheEntry> {
    match self.storage.get(key) {
      Ok(entry) => entry,
      Err(e) => {
        // A failed read degrades to a miss.
        warn!(key, error = %e, "failed to read cache entry");
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::testutil::{MockResponse, MockTransport};
  use crate::cache::storage::SqliteStorage;
  use std::time::Duration;

  fn layer() -> CacheLayer {
    CacheLayer::new(Arc::new(SqliteStorage::open_in_memory().unwrap()))
  }

  fn cached_descriptor() -> RequestDescriptor {
    RequestDescriptor::new("listMaterials", None)
      .with_cache_ttl(Duration::from_millis(60_000))
      .with_retries(2, Duration::from_millis(1))
  }

  #[tokio::test]
  async fn test_fresh_entry_skips_dispatch() {
    let layer = layer();
    let dispatcher = Dispatcher::new(
      MockTransport::new().on("listMaterials", MockResponse::Body(r#"["Cement"]"#.into())),
    );

    let desc = cached_descriptor();
    let first = layer.read(&dispatcher, &desc).await.unwrap();
    let second = layer.read(&dispatcher, &desc).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(dispatcher.transport().calls_for("listMaterials"), 1);
  }

  #[tokio::test]
  async fn test_zero_ttl_always_dispatches() {
    let layer = layer();
    let dispatcher = Dispatcher::new(
      MockTransport::new().on("getCurrentStock", MockResponse::Body(r#"{"ok":true}"#.into())),
    );

    let desc = RequestDescriptor::new("getCurrentStock", None);
    layer.read(&dispatcher, &desc).await.unwrap();
    layer.read(&dispatcher, &desc).await.unwrap();

    assert_eq!(dispatcher.transport().calls_for("getCurrentStock"), 2);
    // Nothing was written either.
    assert!(layer.storage().get(&desc.cache_key()).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_expired_entry_refreshes_and_overwrites() {
    let layer = layer();
    let desc = cached_descriptor();
    layer
      .storage()
      .put(
        &desc.cache_key(),
        &serde_json::json!(["Old"]),
        Utc::now() - chrono::Duration::minutes(10),
      )
      .unwrap();

    let dispatcher = Dispatcher::new(
      MockTransport::new().on("listMaterials", MockResponse::Body(r#"["Fresh"]"#.into())),
    );
    let value = layer.read(&dispatcher, &desc).await.unwrap();
    assert_eq!(value, serde_json::json!(["Fresh"]));

    // Second read is served from the refreshed entry.
    let again = layer.read(&dispatcher, &desc).await.unwrap();
    assert_eq!(again, serde_json::json!(["Fresh"]));
    assert_eq!(dispatcher.transport().calls_for("listMaterials"), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_fallback_after_exhausted_retries() {
    let layer = layer();
    let desc = cached_descriptor();
    layer
      .storage()
      .put(
        &desc.cache_key(),
        &serde_json::json!(["Stale"]),
        Utc::now() - chrono::Duration::minutes(10),
      )
      .unwrap();

    let dispatcher = Dispatcher::new(
      MockTransport::new().on("listMaterials", MockResponse::Fail("offline".into())),
    );
    let value = layer.read(&dispatcher, &desc).await.unwrap();
    assert_eq!(value, serde_json::json!(["Stale"]));
    assert_eq!(dispatcher.transport().calls_for("listMaterials"), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_first_ever_failure_propagates() {
    let layer = layer();
    let dispatcher = Dispatcher::new(
      MockTransport::new().on("listMaterials", MockResponse::Fail("offline".into())),
    );

    let err = layer
      .read(&dispatcher, &cached_descriptor())
      .await
      .unwrap_err();
    assert!(matches!(err, ApiError::NoFallback { .. }));
  }

  #[tokio::test]
  async fn test_malformed_refresh_does_not_fall_back() {
    let layer = layer();
    let desc = cached_descriptor();
    layer
      .storage()
      .put(
        &desc.cache_key(),
        &serde_json::json!(["Stale"]),
        Utc::now() - chrono::Duration::minutes(10),
      )
      .unwrap();

    let dispatcher = Dispatcher::new(
      MockTransport::new().on("listMaterials", MockResponse::Body("<!doctype html>".into())),
    );
    let err = layer.read(&dispatcher, &desc).await.unwrap_err();
    assert!(matches!(err, ApiError::Malformed(_)));
  }
}

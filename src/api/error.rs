//! Error taxonomy for remote calls.

use thiserror::Error;

/// Classified failure of a remote call.
#[derive(Debug, Error)]
pub enum ApiError {
  /// The attempt exceeded its timeout and was abandoned.
  #[error("request timed out after {timeout_ms}ms")]
  Timeout { timeout_ms: u64 },

  /// Network-level failure before a response was obtained.
  #[error("transport failure: {0}")]
  Transport(String),

  /// The response body could not be parsed as JSON.
  #[error("malformed response: {0}")]
  Malformed(String),

  /// Well-formed response that reports `ok: false`.
  #[error("remote call failed: {0}")]
  Logical(String),

  /// Refresh failed and no stale value was ever stored for the key.
  #[error("no cached fallback for {key}")]
  NoFallback {
    key: String,
    #[source]
    source: Box<ApiError>,
  },
}

impl ApiError {
  /// Timeout and transport failures are retried by the dispatcher and are
  /// eligible for stale-cache fallback. Malformed and logical failures are
  /// returned to the caller verbatim.
  pub fn is_retryable(&self) -> bool {
    matches!(self, ApiError::Timeout { .. } | ApiError::Transport(_))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_retryable_classes() {
    assert!(ApiError::Timeout { timeout_ms: 1000 }.is_retryable());
    assert!(ApiError::Transport("connection refused".into()).is_retryable());
    assert!(!ApiError::Malformed("bad json".into()).is_retryable());
    assert!(!ApiError::Logical("add at least one line".into()).is_retryable());
    let miss = ApiError::NoFallback {
      key: "cache:x:".into(),
      source: Box::new(ApiError::Transport("offline".into())),
    };
    assert!(!miss.is_retryable());
  }
}

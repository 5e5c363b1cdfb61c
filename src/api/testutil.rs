//! Scripted transport for dispatcher and client tests.

use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;

use super::dispatcher::Transport;
use super::error::ApiError;

/// One scripted outcome for a remote function.
pub(crate) enum MockResponse {
  /// Respond with this raw body.
  Body(String),
  /// Fail at the transport level with this message.
  Fail(String),
  /// Never respond; the in-flight attempt hangs until its timeout fires.
  Hang,
}

/// Transport that replays scripted responses per function name.
///
/// Responses queue up in `on` order; the last response for a function is
/// sticky so retry loops can keep failing without an exhaustive script.
pub(crate) struct MockTransport {
  responses: Mutex<HashMap<String, VecDeque<MockResponse>>>,
  calls: Mutex<Vec<(String, Instant)>>,
}

impl MockTransport {
  pub(crate) fn new() -> Self {
    Self {
      responses: Mutex::new(HashMap::new()),
      calls: Mutex::new(Vec::new()),
    }
  }

  pub(crate) fn on(self, function: &str, response: MockResponse) -> Self {
    self
      .responses
      .lock()
      .unwrap()
      .entry(function.to_string())
      .or_default()
      .push_back(response);
    self
  }

  pub(crate) fn calls_for(&self, function: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|(f, _)| f == function)
      .count()
  }

  pub(crate) fn call_times(&self, function: &str) -> Vec<Instant> {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|(f, _)| f == function)
      .map(|(_, t)| *t)
      .collect()
  }

  async fn respond(&self, function: &str) -> Result<String, ApiError> {
    self
      .calls
      .lock()
      .unwrap()
      .push((function.to_string(), Instant::now()));

    let next = {
      let mut responses = self.responses.lock().unwrap();
      let queue = responses.entry(function.to_string()).or_default();
      if queue.len() > 1 {
        queue.pop_front()
      } else {
        // Sticky last response: peek without consuming.
        match queue.front() {
          Some(MockResponse::Body(b)) => Some(MockResponse::Body(b.clone())),
          Some(MockResponse::Fail(m)) => Some(MockResponse::Fail(m.clone())),
          Some(MockResponse::Hang) => Some(MockResponse::Hang),
          None => None,
        }
      }
    };

    match next {
      Some(MockResponse::Body(body)) => Ok(body),
      Some(MockResponse::Fail(message)) => Err(ApiError::Transport(message)),
      Some(MockResponse::Hang) => futures::future::pending().await,
      None => Err(ApiError::Transport(format!("no script for {}", function))),
    }
  }
}

impl Transport for MockTransport {
  async fn query(&self, function: &str, _payload: Option<&Value>) -> Result<String, ApiError> {
    self.respond(function).await
  }

  async fn command(&self, function: &str, _payload: &Value) -> Result<String, ApiError> {
    self.respond(function).await
  }
}

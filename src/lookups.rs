//! Reference-list preloading with per-list failure tolerance.
//!
//! The pickers need four named lists (materials, projects, contractors,
//! requesters). All four are fetched concurrently through the cache layer;
//! a list that fails falls back to the last persisted snapshot so an
//! offline start still has something to show. The preload as a whole
//! never fails.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::warn;

use crate::api::{Dispatcher, RequestDescriptor, Transport};
use crate::cache::{CacheLayer, CacheStorage};

/// Freshness window for the reference lists.
const LOOKUP_TTL: Duration = Duration::from_secs(5 * 60);

/// The four named reference lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
  Materials,
  Projects,
  Contractors,
  Requesters,
}

impl LookupKind {
  pub const ALL: [LookupKind; 4] = [
    LookupKind::Materials,
    LookupKind::Projects,
    LookupKind::Contractors,
    LookupKind::Requesters,
  ];

  /// Remote function that lists this kind.
  fn function(self) -> &'static str {
    match self {
      LookupKind::Materials => "listMaterials",
      LookupKind::Projects => "listProjects",
      LookupKind::Contractors => "listContractors",
      LookupKind::Requesters => "listRequesters",
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      LookupKind::Materials => "materials",
      LookupKind::Projects => "projects",
      LookupKind::Contractors => "contractors",
      LookupKind::Requesters => "requesters",
    }
  }
}

/// The merged set of reference lists. Each list is deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupSet {
  #[serde(default)]
  pub materials: Vec<String>,
  #[serde(default)]
  pub projects: Vec<String>,
  #[serde(default)]
  pub contractors: Vec<String>,
  #[serde(default)]
  pub requesters: Vec<String>,
}

impl LookupSet {
  pub fn list(&self, kind: LookupKind) -> &[String] {
    match kind {
      LookupKind::Materials => &self.materials,
      LookupKind::Projects => &self.projects,
      LookupKind::Contractors => &self.contractors,
      LookupKind::Requesters => &self.requesters,
    }
  }

  fn list_mut(&mut self, kind: LookupKind) -> &mut Vec<String> {
    match kind {
      LookupKind::Materials => &mut self.materials,
      LookupKind::Projects => &mut self.projects,
      LookupKind::Contractors => &mut self.contractors,
      LookupKind::Requesters => &mut self.requesters,
    }
  }
}

/// Fetches and holds the reference lists, persisting a snapshot for
/// offline starts.
pub struct LookupAggregator {
  cache: CacheLayer,
  set: Mutex<LookupSet>,
}

impl LookupAggregator {
  pub fn new(cache: CacheLayer) -> Self {
    Self {
      cache,
      set: Mutex::new(LookupSet::default()),
    }
  }

  /// Fetch all lists concurrently and wait for every one to settle.
  ///
  /// Each list's outcome is independent: a failed list degrades to the
  /// snapshot value (or stays empty) without affecting the others.
  pub async fn preload<T: Transport>(&self, dispatcher: &Dispatcher<T>) -> LookupSet {
    let snapshot = self.load_snapshot();

    let fetches = LookupKind::ALL.map(|kind| {
      let cache = &self.cache;
      async move {
        let desc =
          RequestDescriptor::new(kind.function(), None).with_cache_ttl(LOOKUP_TTL);
        (kind, cache.read(dispatcher, &desc).await)
      }
    });
    let results = join_all(fetches).await;

    let mut set = LookupSet::default();
    for (kind, result) in results {
      let fetched = match result {
        Ok(value) => parse_string_list(&value),
        Err(e) => {
          warn!(list = kind.name(), error = %e, "lookup preload failed");
          None
        }
      };
      *set.list_mut(kind) = match fetched {
        Some(values) => dedup(values),
        None => snapshot.list(kind).to_vec(),
      };
    }

    *self.lock() = set.clone();
    self.persist(&set);
    set
  }

  /// Append one value to a named list, deduplicating, and persist the
  /// whole snapshot. Returns false if the value was already present.
  pub fn add_value(&self, kind: LookupKind, value: &str) -> bool {
    let snapshot = {
      let mut set = self.lock();
      let list = set.list_mut(kind);
      if list.iter().any(|v| v == value) {
        return false;
      }
      // Newest first, the way the picker surfaces fresh additions.
      list.insert(0, value.to_string());
      set.clone()
    };
    self.persist(&snapshot);
    true
  }

  /// Current in-memory set.
  pub fn current(&self) -> LookupSet {
    self.lock().clone()
  }

  fn load_snapshot(&self) -> LookupSet {
    match self.cache.storage().load_snapshot() {
      Ok(Some(value)) => serde_json::from_value(value).unwrap_or_default(),
      Ok(None) => LookupSet::default(),
      Err(e) => {
        warn!(error = %e, "failed to load lookup snapshot");
        LookupSet::default()
      }
    }
  }

  fn persist(&self, set: &LookupSet) {
    let value = match serde_json::to_value(set) {
      Ok(v) => v,
      Err(e) => {
        warn!(error = %e, "failed to serialize lookup snapshot");
        return;
      }
    };
    if let Err(e) = self.cache.storage().store_snapshot(&value) {
      warn!(error = %e, "failed to persist lookup snapshot");
    }
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, LookupSet> {
    self.set.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// A list response must be an array; strings are kept, anything else is
/// dropped. A non-array value is treated as a failed list.
fn parse_string_list(value: &Value) -> Option<Vec<String>> {
  value.as_array().map(|items| {
    items
      .iter()
      .filter_map(Value::as_str)
      .map(String::from)
      .collect()
  })
}

fn dedup(values: Vec<String>) -> Vec<String> {
  let mut seen = std::collections::HashSet::new();
  values.into_iter().filter(|v| seen.insert(v.clone())).collect()
}

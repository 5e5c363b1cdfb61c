//! Time-boxed caching layer for remote reads and offline support.
//!
//! This module provides the request-agnostic caching mechanism that:
//! - Keys entries by `cache:<function>:<payload>` in a persistent store
//! - Returns fresh values without a network round trip
//! - Serves the stale value when a refresh fails after retries
//! - Evicts aged-out and unparseable entries in a startup sweep

mod layer;
pub mod storage;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, NoopStorage, SqliteStorage};

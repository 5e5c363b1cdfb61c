//! Typed inventory client over the dispatcher and cache layer.
//!
//! Every remote function gets a typed method here; response validation
//! happens at this boundary so the rest of the program never touches raw
//! JSON. Reads go through the cache layer with per-function TTLs; commands
//! go straight to the dispatcher and are never cached.

use color_eyre::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheLayer, CacheStorage};
use crate::config::ApiConfig;
use crate::grouping::{group_by_document, DocumentSummary, HistoryRows, TransactionRecord};
use crate::lookups::{LookupAggregator, LookupKind, LookupSet};

use super::dispatcher::{Dispatcher, HttpTransport, RequestDescriptor, Transport};
use super::error::ApiError;
use super::types::{
  check_ok, from_value, Ack, DocLine, LowStockRow, MovementSubmission, OutDocResponse,
  OutDocument, PurchaseKpis, PurchaseSubmission, PurchaseSummary, ReportFilters, Rows,
  StockLevel,
};

// Freshness windows per function, carried over from the view code that
// issued these calls.
const TTL_HISTORY: Duration = Duration::from_secs(20);
const TTL_DOC: Duration = Duration::from_secs(10);
const TTL_LOW_STOCK: Duration = Duration::from_secs(30);
const TTL_RECENT: Duration = Duration::from_secs(20);
const TTL_PUR_SUMMARY: Duration = Duration::from_secs(15);

/// Inventory client with transparent caching support.
pub struct InventoryClient<T: Transport> {
  dispatcher: Dispatcher<T>,
  cache: CacheLayer,
  lookups: LookupAggregator,
  api: ApiConfig,
}

impl InventoryClient<HttpTransport> {
  /// Create a client against the configured endpoint.
  pub fn new(api: ApiConfig, storage: Arc<dyn CacheStorage>) -> Result<Self> {
    let transport = HttpTransport::new(&api.url)?;
    Ok(Self::with_transport(transport, api, storage))
  }
}

impl<T: Transport> InventoryClient<T> {
  pub fn with_transport(transport: T, api: ApiConfig, storage: Arc<dyn CacheStorage>) -> Self {
    let cache = CacheLayer::new(storage);
    let lookups = LookupAggregator::new(cache.clone());
    Self {
      dispatcher: Dispatcher::new(transport),
      cache,
      lookups,
      api,
    }
  }

  pub fn cache(&self) -> &CacheLayer {
    &self.cache
  }

  // ==========================================================================
  // Lookups
  // ==========================================================================

  /// Preload all reference lists; never fails, individual lists degrade.
  pub async fn preload_lookups(&self) -> LookupSet {
    self.lookups.preload(&self.dispatcher).await
  }

  pub fn lookups(&self) -> LookupSet {
    self.lookups.current()
  }

  /// Register a contractor remotely, then fold it into the lookup set.
  pub async fn add_contractor(&self, name: &str) -> Result<(), ApiError> {
    self
      .command("addContractor", json!({ "name": name }))
      .await?;
    self.lookups.add_value(LookupKind::Contractors, name);
    Ok(())
  }

  pub async fn add_requester(&self, name: &str) -> Result<(), ApiError> {
    self
      .command("addRequester", json!({ "name": name }))
      .await?;
    self.lookups.add_value(LookupKind::Requesters, name);
    Ok(())
  }

  // ==========================================================================
  // Stock movements
  // ==========================================================================

  /// Live stock level for one material. Never cached.
  pub async fn current_stock(&self, material: &str) -> Result<StockLevel, ApiError> {
    let value = self
      .read("getCurrentStock", Some(json!({ "material": material })), Duration::ZERO)
      .await?;
    from_value(value)
  }

  /// Submit a batch movement (IN / OUT / ADJUST).
  pub async fn submit_movement(&self, submission: &MovementSubmission) -> Result<Ack, ApiError> {
    let payload = to_payload(submission)?;
    from_value(self.command("submitMovementBulk", payload).await?)
  }

  /// Grouped OUT history, most recent document first.
  pub async fn out_history(&self, limit: u32) -> Result<Vec<DocumentSummary>, ApiError> {
    let value = self
      .read("out_SearchHistory", Some(json!({ "limit": limit })), TTL_HISTORY)
      .await?;
    let rows: Rows<DocumentSummary> = from_value(value)?;
    Ok(group_by_document(HistoryRows::Grouped(rows.rows), None))
  }

  /// One OUT document with its lines.
  pub async fn out_doc(&self, doc_no: &str) -> Result<OutDocument, ApiError> {
    let value = self
      .read("out_GetDoc", Some(json!({ "docNo": doc_no })), TTL_DOC)
      .await?;
    let response: OutDocResponse = from_value(value)?;
    Ok(response.doc)
  }

  /// Replace the lines of an existing OUT document.
  pub async fn update_out_doc(&self, doc_no: &str, lines: &[DocLine]) -> Result<Ack, ApiError> {
    from_value(
      self
        .command("out_UpdateDoc", json!({ "docNo": doc_no, "lines": lines }))
        .await?,
    )
  }

  /// Flat movement rows for a date range, regrouped per document.
  pub async fn movement_documents(
    &self,
    filters: &ReportFilters,
  ) -> Result<Vec<DocumentSummary>, ApiError> {
    let payload = to_payload(filters)?;
    let value = self
      .read("getMovementReport", Some(payload), Duration::ZERO)
      .await?;
    let rows: Rows<TransactionRecord> = from_value(value)?;

    let filter_type =
      (!filters.movement_type.is_empty()).then_some(filters.movement_type.as_str());
    Ok(group_by_document(HistoryRows::Flat(rows.rows), filter_type))
  }

  // ==========================================================================
  // Purchasing
  // ==========================================================================

  pub async fn submit_purchase(&self, submission: &PurchaseSubmission) -> Result<Ack, ApiError> {
    let payload = to_payload(submission)?;
    from_value(self.command("submitPurchaseRequest", payload).await?)
  }

  pub async fn purchase_history(&self) -> Result<Vec<PurchaseSummary>, ApiError> {
    let value = self.read("pur_History", None, TTL_HISTORY).await?;
    from_value(value)
  }

  pub async fn purchase_doc_lines(&self, doc_no: &str) -> Result<Vec<DocLine>, ApiError> {
    let value = self
      .read("pur_DocLines", Some(json!({ "docNo": doc_no })), TTL_DOC)
      .await?;
    from_value(value)
  }

  pub async fn update_purchase_status(
    &self,
    doc_no: &str,
    status: &str,
  ) -> Result<Ack, ApiError> {
    from_value(
      self
        .command("pur_UpdateStatus", json!({ "docNo": doc_no, "status": status }))
        .await?,
    )
  }

  pub async fn purchase_summary(&self) -> Result<PurchaseKpis, ApiError> {
    let value = self.read("pur_Summary", None, TTL_PUR_SUMMARY).await?;
    from_value(value)
  }

  // ==========================================================================
  // Dashboard
  // ==========================================================================

  pub async fn low_stock(&self) -> Result<Vec<LowStockRow>, ApiError> {
    let value = self.read("dash_LowStock", None, TTL_LOW_STOCK).await?;
    from_value(value)
  }

  pub async fn recent_moves(&self) -> Result<Vec<TransactionRecord>, ApiError> {
    let value = self.read("dash_Recent", None, TTL_RECENT).await?;
    from_value(value)
  }

  // ==========================================================================
  // Plumbing
  // ==========================================================================

  async fn read(
    &self,
    function: &str,
    payload: Option<Value>,
    ttl: Duration,
  ) -> Result<Value, ApiError> {
    let desc = RequestDescriptor::new(function, payload)
      .with_cache_ttl(ttl)
      .with_timeout(self.api.timeout())
      .with_retries(self.api.max_retries, self.api.backoff_base());
    let value = self.cache.read(&self.dispatcher, &desc).await?;
    check_ok(value)
  }

  async fn command(&self, function: &str, payload: Value) -> Result<Value, ApiError> {
    let value = self
      .dispatcher
      .command(function, payload, self.api.command_timeout())
      .await?;
    check_ok(value)
  }
}

fn to_payload<S: serde::Serialize>(value: &S) -> Result<Value, ApiError> {
  serde_json::to_value(value).map_err(|e| ApiError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::testutil::{MockResponse, MockTransport};
  use crate::cache::SqliteStorage;

  fn client(transport: MockTransport) -> InventoryClient<MockTransport> {
    let api = ApiConfig {
      url: "https://example.com/exec".to_string(),
      timeout_ms: 12_000,
      command_timeout_ms: 15_000,
      max_retries: 2,
      backoff_base_ms: 1,
    };
    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
    InventoryClient::with_transport(transport, api, storage)
  }

  #[tokio::test]
  async fn test_current_stock_parses_envelope() {
    let client = client(MockTransport::new().on(
      "getCurrentStock",
      MockResponse::Body(r#"{"ok": true, "stock": 18, "min": 5}"#.into()),
    ));

    let level = client.current_stock("Cement").await.unwrap();
    assert_eq!(level.stock, 18.0);
    assert_eq!(level.min_level, 5.0);
  }

  #[tokio::test]
  async fn test_logical_failure_surfaces_message() {
    let client = client(MockTransport::new().on(
      "out_UpdateDoc",
      MockResponse::Body(r#"{"ok": false, "message": "add at least one line"}"#.into()),
    ));

    let err = client.update_out_doc("OUT-001", &[]).await.unwrap_err();
    match err {
      ApiError::Logical(message) => assert_eq!(message, "add at least one line"),
      other => panic!("expected logical failure, got {other}"),
    }
  }

  #[tokio::test]
  async fn test_out_history_orders_documents() {
    let client = client(MockTransport::new().on(
      "out_SearchHistory",
      MockResponse::Body(
        r#"{"rows": [
          {"doc": "OUT-001", "ts": "2026-08-01 09:00", "totalQty": 2, "lineCount": 1, "itemSummary": "a"},
          {"doc": "OUT-002", "ts": "2026-08-02 09:00", "totalQty": 3, "lineCount": 1, "itemSummary": "b"}
        ]}"#
          .into(),
      ),
    ));

    let docs = client.out_history(50).await.unwrap();
    assert_eq!(docs[0].document_id, "OUT-002");
    assert_eq!(docs[1].document_id, "OUT-001");
  }

  #[tokio::test]
  async fn test_movement_documents_group_and_filter() {
    let client = client(MockTransport::new().on(
      "getMovementReport",
      MockResponse::Body(
        r#"{"ok": true, "rows": [
          {"doc": "OUT-001", "ts": "2026-08-01 09:00", "type": "OUT", "item": "Cement", "qty": 5},
          {"doc": "OUT-001", "ts": "2026-08-01 09:00", "type": "OUT", "item": "Sand", "qty": 3},
          {"doc": "IN-001", "ts": "2026-08-01 10:00", "type": "IN", "item": "Cement", "qty": 20}
        ]}"#
          .into(),
      ),
    ));

    let filters = ReportFilters {
      start: "2026-08-01".to_string(),
      end: "2026-08-31".to_string(),
      movement_type: "OUT".to_string(),
      ..ReportFilters::default()
    };
    let docs = client.movement_documents(&filters).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].document_id, "OUT-001");
    assert_eq!(docs[0].total_quantity, 8.0);
    assert_eq!(docs[0].item_summary, "Cement, Sand");
  }

  #[tokio::test]
  async fn test_add_contractor_updates_lookups() {
    let client = client(
      MockTransport::new().on("addContractor", MockResponse::Body(r#"{"ok": true}"#.into())),
    );

    client.add_contractor("New Crew").await.unwrap();
    assert_eq!(client.lookups().contractors, vec!["New Crew"]);
  }

  #[tokio::test]
  async fn test_submit_movement_returns_doc_no() {
    let client = client(MockTransport::new().on(
      "submitMovementBulk",
      MockResponse::Body(r#"{"ok": true, "docNo": "OUT-042"}"#.into()),
    ));

    let submission = MovementSubmission {
      movement_type: "OUT".to_string(),
      date: "2026-08-30".to_string(),
      project: "Site A".to_string(),
      contractor: "ACME".to_string(),
      requester: "Somchai".to_string(),
      note: String::new(),
      lines: vec![DocLine {
        item: "Cement".to_string(),
        qty: 5.0,
      }],
    };
    let ack = client.submit_movement(&submission).await.unwrap();
    assert_eq!(ack.doc_no.as_deref(), Some("OUT-042"));
  }

  #[tokio::test]
  async fn test_purchase_history_is_cached() {
    let client = client(MockTransport::new().on(
      "pur_History",
      MockResponse::Body(r#"[{"docNo": "PR-001", "totalQty": 3, "lines": 2}]"#.into()),
    ));

    client.purchase_history().await.unwrap();
    let rows = client.purchase_history().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].doc_no, "PR-001");
    assert_eq!(
      client.dispatcher.transport().calls_for("pur_History"),
      1,
      "second read should be served from cache"
    );
  }
}

//! Wire types for the remote function endpoint.
//!
//! The remote protocol is a set of named functions behind one URL; every
//! function here gets an explicit payload/result schema validated at the
//! client boundary. Responses that fail validation surface as
//! [`ApiError::Malformed`](super::error::ApiError::Malformed).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ApiError;
use crate::grouping::lenient_quantity;

/// Check the `{ ok: boolean, ... }` envelope; `ok: false` becomes a logical
/// failure carrying the remote message. Values without an `ok` field (bare
/// lists) pass through.
pub fn check_ok(value: Value) -> Result<Value, ApiError> {
  if let Some(false) = value.get("ok").and_then(Value::as_bool) {
    let message = value
      .get("message")
      .and_then(Value::as_str)
      .unwrap_or("remote call reported failure")
      .to_string();
    return Err(ApiError::Logical(message));
  }
  Ok(value)
}

/// Deserialize a normalized response value into its typed shape.
pub fn from_value<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ApiError> {
  serde_json::from_value(value).map_err(|e| ApiError::Malformed(e.to_string()))
}

/// Acknowledgement returned by commands.
#[derive(Debug, Clone, Deserialize)]
pub struct Ack {
  #[serde(rename = "docNo", default)]
  pub doc_no: Option<String>,
}

/// Current stock level for one material.
#[derive(Debug, Clone, Deserialize)]
pub struct StockLevel {
  #[serde(default, deserialize_with = "lenient_quantity")]
  pub stock: f64,
  #[serde(rename = "min", default, deserialize_with = "lenient_quantity")]
  pub min_level: f64,
}

/// One item line inside a document, both on reads and submissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocLine {
  pub item: String,
  #[serde(rename = "qty", default, deserialize_with = "lenient_quantity")]
  pub qty: f64,
}

/// Full stock-movement document as returned by `out_GetDoc`.
#[derive(Debug, Clone, Deserialize)]
pub struct OutDocument {
  #[serde(rename = "doc", default)]
  pub doc_no: String,
  #[serde(default)]
  pub ts: String,
  #[serde(default)]
  pub project: String,
  #[serde(default)]
  pub contractor: String,
  #[serde(default)]
  pub requester: String,
  #[serde(default)]
  pub lines: Vec<DocLine>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutDocResponse {
  pub doc: OutDocument,
}

/// Rows wrapper used by the history and report endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Rows<T> {
  #[serde(default = "Vec::new")]
  pub rows: Vec<T>,
}

/// Payload for `submitMovementBulk`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementSubmission {
  #[serde(rename = "type")]
  pub movement_type: String,
  pub date: String,
  pub project: String,
  pub contractor: String,
  pub requester: String,
  pub note: String,
  pub lines: Vec<DocLine>,
}

/// Payload for `submitPurchaseRequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseSubmission {
  pub project: String,
  #[serde(rename = "needBy")]
  pub need_by: String,
  pub contractor: String,
  pub requester: String,
  pub priority: String,
  pub note: String,
  pub lines: Vec<DocLine>,
}

/// One purchase request as returned by `pur_History`. Aggregates are
/// computed server-side; this row never passes through the grouping engine.
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseSummary {
  #[serde(rename = "docNo", default)]
  pub doc_no: String,
  #[serde(default)]
  pub ts: String,
  #[serde(default)]
  pub project: String,
  #[serde(default)]
  pub contractor: String,
  #[serde(default)]
  pub requester: String,
  #[serde(rename = "needBy", default)]
  pub need_by: String,
  #[serde(default)]
  pub status: String,
  #[serde(default)]
  pub priority: String,
  #[serde(rename = "lines", default)]
  pub line_count: usize,
  #[serde(rename = "totalQty", default, deserialize_with = "lenient_quantity")]
  pub total_quantity: f64,
}

/// Purchase KPIs from `pur_Summary`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PurchaseKpis {
  #[serde(default)]
  pub requests: u64,
  #[serde(default)]
  pub lines: u64,
  #[serde(default)]
  pub urgent: u64,
}

/// One low-stock row from `dash_LowStock`.
#[derive(Debug, Clone, Deserialize)]
pub struct LowStockRow {
  #[serde(default)]
  pub name: String,
  #[serde(default, deserialize_with = "lenient_quantity")]
  pub stock: f64,
  #[serde(rename = "min", default, deserialize_with = "lenient_quantity")]
  pub min_level: f64,
}

/// Filters for `getMovementReport`. Empty strings mean "all".
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportFilters {
  pub start: String,
  pub end: String,
  #[serde(default)]
  pub material: String,
  #[serde(default)]
  pub project: String,
  #[serde(rename = "type")]
  pub movement_type: String,
}

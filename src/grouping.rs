//! Reconstructing per-document summaries from flat movement rows.
//!
//! History views receive either flat per-line rows or rows the remote store
//! has already aggregated per document. Both shapes funnel through
//! [`group_by_document`] so every view shares one aggregation contract.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Distinct item names shown before the summary truncates to "+N more".
const ITEM_SUMMARY_LIMIT: usize = 3;

/// One movement line as the remote store returns it. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
  #[serde(rename = "doc")]
  pub document_id: String,
  #[serde(rename = "ts", default)]
  pub timestamp: String,
  #[serde(rename = "type", default)]
  pub movement_type: String,
  #[serde(default)]
  pub project: String,
  #[serde(default)]
  pub contractor: String,
  #[serde(default)]
  pub requester: String,
  #[serde(rename = "item", default)]
  pub item_name: String,
  #[serde(rename = "qty", default, deserialize_with = "lenient_quantity")]
  pub quantity: f64,
  #[serde(default)]
  pub note: String,
}

/// Derived per-document aggregate. Recomputed on every grouping pass,
/// never cached independently of its source rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
  #[serde(rename = "doc")]
  pub document_id: String,
  #[serde(rename = "ts", default)]
  pub timestamp: String,
  #[serde(default)]
  pub project: String,
  #[serde(default)]
  pub contractor: String,
  #[serde(default)]
  pub requester: String,
  #[serde(default)]
  pub note: String,
  /// Distinct item names for this document, in first-line order.
  #[serde(rename = "items", default)]
  pub items: Vec<String>,
  /// Truncated display list of item names.
  #[serde(rename = "itemSummary", default)]
  pub item_summary: String,
  #[serde(rename = "totalQty", default, deserialize_with = "lenient_quantity")]
  pub total_quantity: f64,
  #[serde(rename = "lineCount", default)]
  pub line_count: usize,
}

/// Input shape for a grouping pass.
pub enum HistoryRows {
  /// The remote call already returned per-document aggregates.
  Grouped(Vec<DocumentSummary>),
  /// Flat per-line rows that still need grouping.
  Flat(Vec<TransactionRecord>),
}

/// Group movement rows into per-document summaries, ordered by timestamp
/// descending with ties broken by document id descending.
///
/// Pre-grouped input passes through unchanged except that `item_summary` is
/// re-derived from the item list when absent. Flat rows are optionally
/// filtered to one movement type, then aggregated per document.
pub fn group_by_document(rows: HistoryRows, filter_type: Option<&str>) -> Vec<DocumentSummary> {
  let mut summaries = match rows {
    HistoryRows::Grouped(docs) => docs
      .into_iter()
      .map(|mut doc| {
        if doc.item_summary.is_empty() {
          doc.item_summary = summarize_items(&doc.items);
        }
        doc
      })
      .collect(),
    HistoryRows::Flat(records) => group_flat(records, filter_type),
  };

  summaries.sort_by(|a, b| {
    b.timestamp
      .cmp(&a.timestamp)
      .then_with(|| b.document_id.cmp(&a.document_id))
  });
  summaries
}

fn group_flat(records: Vec<TransactionRecord>, filter_type: Option<&str>) -> Vec<DocumentSummary> {
  let mut docs: Vec<DocumentSummary> = Vec::new();
  let mut index: HashMap<String, usize> = HashMap::new();

  for record in records {
    if let Some(wanted) = filter_type {
      if !record.movement_type.eq_ignore_ascii_case(wanted) {
        continue;
      }
    }

    let idx = match index.get(&record.document_id) {
      Some(idx) => *idx,
      None => {
        docs.push(DocumentSummary {
          document_id: record.document_id.clone(),
          timestamp: String::new(),
          project: String::new(),
          contractor: String::new(),
          requester: String::new(),
          note: String::new(),
          items: Vec::new(),
          item_summary: String::new(),
          total_quantity: 0.0,
          line_count: 0,
        });
        index.insert(record.document_id.clone(), docs.len() - 1);
        docs.len() - 1
      }
    };

    let doc = &mut docs[idx];
    doc.total_quantity += record.quantity;
    doc.line_count += 1;

    // First non-empty value wins; later rows never overwrite.
    fill_if_empty(&mut doc.timestamp, &record.timestamp);
    fill_if_empty(&mut doc.project, &record.project);
    fill_if_empty(&mut doc.contractor, &record.contractor);
    fill_if_empty(&mut doc.requester, &record.requester);
    fill_if_empty(&mut doc.note, &record.note);

    if !record.item_name.is_empty() && !doc.items.contains(&record.item_name) {
      doc.items.push(record.item_name);
    }
  }

  for doc in &mut docs {
    doc.item_summary = summarize_items(&doc.items);
  }
  docs
}

fn fill_if_empty(slot: &mut String, value: &str) {
  if slot.is_empty() && !value.is_empty() {
    *slot = value.to_string();
  }
}

/// First three distinct names joined by ", ", with "+N more" appended when
/// more distinct names exist. No names yields an empty string.
fn summarize_items(items: &[String]) -> String {
  let mut summary = items
    .iter()
    .take(ITEM_SUMMARY_LIMIT)
    .cloned()
    .collect::<Vec<_>>()
    .join(", ");
  if items.len() > ITEM_SUMMARY_LIMIT {
    summary.push_str(&format!(" +{} more", items.len() - ITEM_SUMMARY_LIMIT));
  }
  summary
}

/// Deserialize a quantity that may be a number, a numeric string, or
/// missing/garbage. Anything non-numeric contributes 0 instead of aborting
/// the whole aggregation.
pub(crate) fn lenient_quantity<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Value::deserialize(deserializer)?;
  Ok(match value {
    Value::Number(n) => n.as_f64().unwrap_or(0.0),
    Value::String(s) => s.trim().parse().unwrap_or(0.0),
    _ => 0.0,
  })
}

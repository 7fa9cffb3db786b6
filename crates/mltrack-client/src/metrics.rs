//! Metric row validation and batching.
//!
//! Rows are validated all-or-nothing, deduplicated per `(step, key)` with
//! last-write-wins, and grouped into ascending-step batches before anything
//! touches the network.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::{TrackerError, TrackerResult};

/// One canonical metric row prior to batching.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub key: String,
    pub step: u64,
    pub value: f64,
    pub recorded_at: Option<String>,
}

/// One transmitted step group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepMetrics {
    pub step: u64,
    pub metrics: BTreeMap<String, f64>,
}

/// Validates decoded rows. Any row missing `key`, `step`, or `value` rejects
/// the whole batch so nothing is transmitted partially.
pub fn validate_rows(rows: &[Value]) -> TrackerResult<Vec<MetricRow>> {
    rows.iter().map(validate_row).collect()
}

fn validate_row(row: &Value) -> TrackerResult<MetricRow> {
    let map = row.as_object().ok_or_else(|| invalid(row))?;
    let key = map.get("key").and_then(Value::as_str).ok_or_else(|| invalid(row))?;
    let step = map.get("step").and_then(Value::as_u64).ok_or_else(|| invalid(row))?;
    let value = map.get("value").and_then(Value::as_f64).ok_or_else(|| invalid(row))?;
    let recorded_at = map.get("recordedAt").and_then(Value::as_str).map(str::to_string);
    Ok(MetricRow { key: key.to_string(), step, value, recorded_at })
}

fn invalid(row: &Value) -> TrackerError {
    TrackerError::Validation(format!("invalid metric row (needs key/step/value): {row}"))
}

/// Groups rows by step with last-write-wins per key.
///
/// Path separators in keys are normalized to `.` to match the server's
/// metric namespacing; batches come out in ascending step order.
pub fn build_batches(rows: Vec<MetricRow>) -> Vec<StepMetrics> {
    let mut grouped: BTreeMap<u64, BTreeMap<String, f64>> = BTreeMap::new();
    for row in rows {
        let key = row.key.replace('/', ".");
        grouped.entry(row.step).or_default().insert(key, row.value);
    }
    grouped
        .into_iter()
        .map(|(step, metrics)| StepMetrics { step, metrics })
        .collect()
}

//! Response envelope normalization.
//!
//! The tracking service answers either with a raw payload or with a
//! `{success, data, error}` wrapper depending on the endpoint and server
//! build. Every consumer applies [`unwrap_envelope`] before interpreting
//! fields so the rest of the client never branches on response shape.

use serde_json::Value;

use crate::error::{TrackerError, TrackerResult};

/// Field names conventionally holding a collection inside a listing payload,
/// in lookup order.
const LIST_KEYS: [&str; 7] = ["content", "items", "results", "list", "projects", "records", "data"];

/// Identifier aliases accepted on resource payloads, in lookup order.
const ID_KEYS: [&str; 4] = ["id", "runId", "projectId", "experimentId"];

/// Strips the `{success, data, error}` wrapper when present.
///
/// A mapping counts as an envelope only if it carries `data` together with
/// `success` or `error`; anything else is returned unchanged.
pub fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map)
            if map.contains_key("data")
                && (map.contains_key("success") || map.contains_key("error")) =>
        {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Borrowing variant of [`unwrap_envelope`] used by the recursive scans.
fn unwrap_ref(node: &Value) -> &Value {
    match node {
        Value::Object(map)
            if map.contains_key("data")
                && (map.contains_key("success") || map.contains_key("error")) =>
        {
            map.get("data").unwrap_or(&Value::Null)
        }
        other => other,
    }
}

/// Extracts the item sequence from a listing payload.
///
/// Sequences are returned as-is; mappings yield the first [`LIST_KEYS`] field
/// holding a sequence; everything else yields an empty list.
pub fn extract_list(body: Value) -> Vec<Value> {
    match unwrap_envelope(body) {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            for key in LIST_KEYS {
                if matches!(map.get(key), Some(Value::Array(_))) {
                    if let Some(Value::Array(items)) = map.remove(key) {
                        return items;
                    }
                }
            }
            Vec::new()
        }
        _ => Vec::new(),
    }
}

/// Pulls the identifier out of a resource payload.
///
/// Absence is a contract violation on the server payload, not a transport
/// problem, and is reported as [`TrackerError::MissingId`].
pub fn pick_id(payload: &Value) -> TrackerResult<String> {
    if let Value::Object(map) = payload {
        for key in ID_KEYS {
            match map.get(key) {
                Some(Value::String(s)) if !s.is_empty() => return Ok(s.clone()),
                Some(Value::Number(n)) => return Ok(n.to_string()),
                _ => {}
            }
        }
    }
    Err(TrackerError::MissingId(payload.to_string()))
}

/// Recursively scans a payload for a mapping whose name field matches `name`
/// case-insensitively.
///
/// Envelopes are stripped at every level; mappings are checked against
/// `name_keys` in order before their values are descended into, and the
/// first structural match wins.
pub fn find_by_name(payload: &Value, name_keys: &[&str], name: &str) -> Option<Value> {
    let target = name.to_lowercase();
    scan(payload, name_keys, &target)
}

fn scan(node: &Value, name_keys: &[&str], target: &str) -> Option<Value> {
    let node = unwrap_ref(node);
    match node {
        Value::Object(map) => {
            for key in name_keys {
                if let Some(Value::String(s)) = map.get(*key) {
                    if s.to_lowercase() == *target {
                        return Some(node.clone());
                    }
                }
            }
            map.values().find_map(|value| scan(value, name_keys, target))
        }
        Value::Array(items) => items.iter().find_map(|value| scan(value, name_keys, target)),
        _ => None,
    }
}

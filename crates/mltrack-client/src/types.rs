//! Core data types shared across the write path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TrackerError, TrackerResult};

/// Lifecycle states a run can be in.
///
/// Terminal states (SUCCEEDED/FAILED/CANCELED) are only reachable through
/// [`crate::session::RunSession::finish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl RunStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "SUCCEEDED" => Some(Self::Succeeded),
            "FAILED" => Some(Self::Failed),
            "CANCELED" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Start-time normalization: anything unrecognized becomes RUNNING.
    pub fn normalize_for_start(raw: &str) -> Self {
        Self::parse(raw).unwrap_or(Self::Running)
    }

    /// Finish-time normalization through the alias table; unrecognized
    /// values are rejected before any network call.
    pub fn parse_finish(raw: &str) -> TrackerResult<Self> {
        let upper = raw.trim().to_uppercase();
        let canonical = match upper.as_str() {
            "FINISHED" | "SUCCESS" | "OK" | "DONE" => "SUCCEEDED",
            "ABORTED" | "CANCELLED" => "CANCELED",
            other => other,
        };
        Self::parse(canonical).ok_or_else(|| {
            TrackerError::Validation(format!(
                "invalid status '{raw}' (allowed: PENDING, RUNNING, SUCCEEDED, FAILED, CANCELED)"
            ))
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value types the service distinguishes for hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HParamType {
    Bool,
    Number,
    Json,
    String,
}

impl HParamType {
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => Self::Bool,
            Value::Number(_) => Self::Number,
            Value::Array(_) | Value::Object(_) => Self::Json,
            _ => Self::String,
        }
    }
}

/// One hyperparameter as transmitted: the value is always stringified, with
/// its original type recorded alongside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HParam {
    pub key: String,
    pub value_type: HParamType,
    pub value: String,
    pub source: String,
}

impl HParam {
    pub fn from_value(key: impl Into<String>, value: &Value, source: &str) -> Self {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self {
            key: key.into(),
            value_type: HParamType::infer(value),
            value: rendered,
            source: source.to_string(),
        }
    }
}

/// Host environment snapshot posted alongside a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub libraries: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_vars: Option<BTreeMap<String, String>>,
}

impl EnvSnapshot {
    /// Captures the facts available without extra tooling: the OS family and
    /// a whitelist of environment variables. Everything else is left for the
    /// caller to fill in.
    pub fn capture(env_whitelist: &[&str]) -> Self {
        let mut env_vars = BTreeMap::new();
        for key in env_whitelist {
            if let Ok(value) = std::env::var(key) {
                env_vars.insert((*key).to_string(), value);
            }
        }
        Self {
            os_name: Some(std::env::consts::OS.to_string()),
            env_vars: (!env_vars.is_empty()).then_some(env_vars),
            ..Self::default()
        }
    }
}

/// Reference to a dataset consumed by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_parse_trims_and_uppercases() {
        assert_eq!(RunStatus::parse(" running "), Some(RunStatus::Running));
        assert_eq!(RunStatus::parse("bogus"), None);
    }

    #[test]
    fn start_normalization_defaults_to_running() {
        assert_eq!(RunStatus::normalize_for_start("FAILED"), RunStatus::Failed);
        assert_eq!(RunStatus::normalize_for_start("warming-up"), RunStatus::Running);
    }

    #[test]
    fn finish_normalization_applies_aliases() {
        assert_eq!(RunStatus::parse_finish("ok").unwrap(), RunStatus::Succeeded);
        assert_eq!(RunStatus::parse_finish("finished").unwrap(), RunStatus::Succeeded);
        assert_eq!(RunStatus::parse_finish("cancelled").unwrap(), RunStatus::Canceled);
        assert_eq!(RunStatus::parse_finish("aborted").unwrap(), RunStatus::Canceled);
        assert_eq!(RunStatus::parse_finish("FAILED").unwrap(), RunStatus::Failed);
    }

    #[test]
    fn finish_normalization_rejects_unknown_statuses() {
        let err = RunStatus::parse_finish("bogus").unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));
    }

    #[test]
    fn status_serializes_screaming() {
        assert_eq!(serde_json::to_value(RunStatus::Succeeded).unwrap(), json!("SUCCEEDED"));
    }

    #[test]
    fn hparam_type_inference() {
        assert_eq!(HParamType::infer(&json!(true)), HParamType::Bool);
        assert_eq!(HParamType::infer(&json!(3.5)), HParamType::Number);
        assert_eq!(HParamType::infer(&json!({ "a": 1 })), HParamType::Json);
        assert_eq!(HParamType::infer(&json!([1])), HParamType::Json);
        assert_eq!(HParamType::infer(&json!("x")), HParamType::String);
    }

    #[test]
    fn hparam_stringifies_values() {
        let param = HParam::from_value("lr", &json!(0.01), "CLI");
        assert_eq!(param.value, "0.01");
        assert_eq!(param.value_type, HParamType::Number);
        let param = HParam::from_value("note", &json!("plain"), "CLI");
        assert_eq!(param.value, "plain");
    }

    #[test]
    fn env_snapshot_omits_empty_fields() {
        let body = serde_json::to_value(EnvSnapshot::default()).unwrap();
        assert_eq!(body, json!({}));
    }

    #[test]
    fn env_snapshot_capture_sets_os() {
        let snapshot = EnvSnapshot::capture(&[]);
        assert!(snapshot.os_name.is_some());
        assert!(snapshot.env_vars.is_none());
    }
}

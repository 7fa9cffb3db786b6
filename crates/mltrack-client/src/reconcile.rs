//! Create-or-discover reconciliation for named resources.
//!
//! Creation is attempted first; a conflict means another caller got there
//! earlier, so the resource is discovered through an ordered list of query
//! strategies. The discovery policy is data-driven: each strategy is one GET
//! path, tried in sequence with first-match short-circuit.

use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::debug;

use crate::api::ApiClient;
use crate::envelope;
use crate::error::{TrackerError, TrackerResult};

/// Name fields checked when scanning discovery payloads, per resource.
const PROJECT_NAME_KEYS: [&str; 2] = ["projectName", "name"];
const EXPERIMENT_NAME_KEYS: [&str; 2] = ["experimentName", "name"];

/// Ordered discovery strategies: exact name filter, free-text search under
/// the conventional parameter names, paginated listing, unpaginated listing.
fn discovery_paths(resource: &str, name: &str) -> [String; 6] {
    [
        format!("/{resource}?name={name}"),
        format!("/{resource}?q={name}"),
        format!("/{resource}?keyword={name}"),
        format!("/{resource}?search={name}"),
        format!("/{resource}?page=0&size=1000"),
        format!("/{resource}"),
    ]
}

/// Ensures a project named `name` exists and returns its payload.
pub async fn ensure_project(client: &ApiClient, name: &str) -> TrackerResult<Value> {
    let body = json!({ "projectName": name, "description": "Auto-created by mltrack" });
    let (status, payload) = client.post_json("/projects", &body).await?;
    if status.is_success() {
        return Ok(envelope::unwrap_envelope(payload));
    }
    if status == StatusCode::CONFLICT {
        debug!(name, "project already exists; discovering");
        return discover(client, "projects", &PROJECT_NAME_KEYS, name).await;
    }
    Err(TrackerError::Transport {
        context: "project create failed".to_string(),
        status: status.as_u16(),
        body: payload.to_string(),
    })
}

/// Ensures an experiment named `name` exists under `project_id`.
///
/// On conflict, project-scoped listings are consulted before the generic
/// discovery strategies.
pub async fn ensure_experiment(
    client: &ApiClient,
    name: &str,
    project_id: &str,
) -> TrackerResult<Value> {
    let body = json!({ "experimentName": name, "projectId": project_id });
    let (status, payload) = client.post_json("/experiments", &body).await?;
    if status.is_success() {
        return Ok(envelope::unwrap_envelope(payload));
    }
    if status == StatusCode::CONFLICT {
        debug!(name, project_id, "experiment already exists; discovering");
        let scoped = [
            format!("/experiments?projectId={project_id}&size=1000"),
            format!("/experiments?projectId={project_id}"),
        ];
        let target = name.to_lowercase();
        for path in scoped {
            let (status, payload) = client.get_json(&path).await?;
            if !status.is_success() {
                continue;
            }
            for item in envelope::extract_list(payload) {
                let matched = EXPERIMENT_NAME_KEYS
                    .iter()
                    .filter_map(|key| item.get(*key).and_then(Value::as_str))
                    .any(|candidate| candidate.to_lowercase() == target);
                if matched {
                    return Ok(item);
                }
            }
        }
        return discover(client, "experiments", &EXPERIMENT_NAME_KEYS, name).await;
    }
    Err(TrackerError::Transport {
        context: "experiment create failed".to_string(),
        status: status.as_u16(),
        body: payload.to_string(),
    })
}

/// Walks the discovery strategies in order; the first payload containing a
/// case-insensitive exact name match wins.
async fn discover(
    client: &ApiClient,
    resource: &'static str,
    name_keys: &[&str],
    name: &str,
) -> TrackerResult<Value> {
    for path in discovery_paths(resource, name) {
        let (status, payload) = client.get_json(&path).await?;
        if !status.is_success() {
            continue;
        }
        if let Some(found) = envelope::find_by_name(&payload, name_keys, name) {
            debug!(resource, name, path, "discovered existing resource");
            return Ok(found);
        }
    }
    Err(TrackerError::ConflictUnresolved { resource, name: name.to_string() })
}

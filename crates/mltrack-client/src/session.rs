//! Run lifecycle session: create-or-attach, status transitions, and logging.
//!
//! A [`RunSession`] is an explicit per-run context value: it is created by
//! [`RunSession::start`] (or [`RunSession::start_by_ids`]) and threaded
//! through every subsequent call, so there is no hidden "current run" state
//! on the client. One session owns exactly one active run.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::multipart::{Form, Part};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::api::ApiClient;
use crate::envelope;
use crate::error::{TrackerError, TrackerResult};
use crate::metrics::{self, MetricRow};
use crate::reconcile;
use crate::types::{DatasetRef, EnvSnapshot, HParam, RunStatus};

/// Options for establishing a run.
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Display name for a freshly created run.
    pub run_name: Option<String>,
    /// Attach to this run instead of creating one. No existence check is
    /// made; the caller vouches for the id.
    pub run_id: Option<String>,
    /// Extra fields merged into the run-creation body. Reserved fields
    /// (projectId, experimentId, runName) always win.
    pub meta: Option<Map<String, Value>>,
    /// Drive the run to RUNNING right after it is established.
    pub mark_started: bool,
    /// Status used by the initial transition when `mark_started` is set.
    pub status_when_start: Option<String>,
    /// Hyperparameters to push right after start.
    pub hparams: Option<Map<String, Value>>,
    /// Environment snapshot to push after the hyperparameters.
    pub env: Option<EnvSnapshot>,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            run_name: None,
            run_id: None,
            meta: None,
            mark_started: true,
            status_when_start: None,
            hparams: None,
            env: None,
        }
    }
}

/// Options for finishing a run.
#[derive(Debug, Clone)]
pub struct FinishOptions {
    /// Raw status; normalized through the alias table before anything else.
    pub status: String,
    /// Defaults to now.
    pub finished_at: Option<String>,
    pub notes: Option<String>,
    /// When absent, backfilled best-effort from the run's `startedAt`.
    pub elapsed_ms: Option<i64>,
}

impl Default for FinishOptions {
    fn default() -> Self {
        Self { status: "SUCCEEDED".to_string(), finished_at: None, notes: None, elapsed_ms: None }
    }
}

/// Options for a multipart artifact upload.
#[derive(Debug, Clone)]
pub struct ArtifactUpload {
    pub artifact_type: String,
    /// Multipart field carrying the file.
    pub field_name: String,
    pub extra_fields: BTreeMap<String, String>,
}

impl Default for ArtifactUpload {
    fn default() -> Self {
        Self {
            artifact_type: "OTHER".to_string(),
            field_name: "file".to_string(),
            extra_fields: BTreeMap::new(),
        }
    }
}

/// Attempts run creation.
///
/// Client-error statuses that indicate the endpoint is absent or refuses the
/// request (400/403/404/405) yield `Ok(None)` so the caller can fall back to
/// attach mode; any other failure is a hard error.
pub async fn try_create_run(
    client: &ApiClient,
    project_id: &str,
    experiment_id: &str,
    run_name: Option<&str>,
    meta: Option<&Map<String, Value>>,
) -> TrackerResult<Option<Value>> {
    let mut body = Map::new();
    body.insert("projectId".to_string(), Value::String(project_id.to_string()));
    body.insert("experimentId".to_string(), Value::String(experiment_id.to_string()));
    if let Some(name) = run_name {
        body.insert("runName".to_string(), Value::String(name.to_string()));
    }
    if let Some(meta) = meta {
        for (key, value) in meta {
            body.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    let (status, payload) = client.post_json("/runs", &Value::Object(body)).await?;
    if status.is_success() {
        return Ok(Some(envelope::unwrap_envelope(payload)));
    }
    match status.as_u16() {
        400 | 403 | 404 | 405 => {
            debug!(status = status.as_u16(), "run creation unsupported");
            Ok(None)
        }
        _ => Err(TrackerError::Transport {
            context: "run create failed".to_string(),
            status: status.as_u16(),
            body: payload.to_string(),
        }),
    }
}

/// An active run bound to one client.
#[derive(Debug)]
pub struct RunSession {
    client: ApiClient,
    run_id: String,
    project: Option<Value>,
    experiment: Option<Value>,
    run: Option<Value>,
}

impl RunSession {
    /// Ensures the project/experiment exist, then creates (or attaches) a
    /// run and applies the start options in order: status transition,
    /// hyperparameters, environment snapshot.
    pub async fn start(
        client: &ApiClient,
        project_name: &str,
        experiment_name: &str,
        options: StartOptions,
    ) -> TrackerResult<Self> {
        let project = reconcile::ensure_project(client, project_name).await?;
        let project_id = envelope::pick_id(&project)?;
        let experiment = reconcile::ensure_experiment(client, experiment_name, &project_id).await?;
        let experiment_id = envelope::pick_id(&experiment)?;
        let mut session = Self::establish(client, &project_id, &experiment_id, &options).await?;
        session.project = Some(project);
        session.experiment = Some(experiment);
        session.apply_start_options(options).await?;
        Ok(session)
    }

    /// Like [`Self::start`], for callers that already hold resource ids and
    /// want to skip reconciliation.
    pub async fn start_by_ids(
        client: &ApiClient,
        project_id: &str,
        experiment_id: &str,
        options: StartOptions,
    ) -> TrackerResult<Self> {
        let mut session = Self::establish(client, project_id, experiment_id, &options).await?;
        session.apply_start_options(options).await?;
        Ok(session)
    }

    async fn establish(
        client: &ApiClient,
        project_id: &str,
        experiment_id: &str,
        options: &StartOptions,
    ) -> TrackerResult<Self> {
        if let Some(run_id) = &options.run_id {
            return Ok(Self {
                client: client.clone(),
                run_id: run_id.clone(),
                project: None,
                experiment: None,
                run: Some(json!({
                    "id": run_id,
                    "projectId": project_id,
                    "experimentId": experiment_id,
                })),
            });
        }
        let run = try_create_run(
            client,
            project_id,
            experiment_id,
            options.run_name.as_deref(),
            options.meta.as_ref(),
        )
        .await?
        .ok_or(TrackerError::RunCreationUnsupported)?;
        let run_id = envelope::pick_id(&run)?;
        Ok(Self { client: client.clone(), run_id, project: None, experiment: None, run: Some(run) })
    }

    async fn apply_start_options(&mut self, options: StartOptions) -> TrackerResult<()> {
        if options.mark_started {
            let status = options.status_when_start.as_deref().unwrap_or("RUNNING");
            self.mark_started(status, None, None).await?;
        }
        if let Some(hparams) = options.hparams {
            self.log_hparams(&hparams, "CLI").await?;
        }
        if let Some(env) = options.env {
            self.log_env_snapshot(&env).await?;
        }
        Ok(())
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Project payload, when the session was started by name.
    pub fn project(&self) -> Option<&Value> {
        self.project.as_ref()
    }

    /// Experiment payload, when the session was started by name.
    pub fn experiment(&self) -> Option<&Value> {
        self.experiment.as_ref()
    }

    /// Locally cached run snapshot.
    pub fn run(&self) -> Option<&Value> {
        self.run.as_ref()
    }

    /// Marks the run as started. Unrecognized statuses fall back to RUNNING.
    ///
    /// The transition is idempotent and carries no precondition on the
    /// current state, so callers may invoke it again freely.
    pub async fn mark_started(
        &mut self,
        status: &str,
        started_at: Option<String>,
        notes: Option<&str>,
    ) -> TrackerResult<()> {
        let status = RunStatus::normalize_for_start(status);
        let mut body = json!({
            "status": status,
            "startedAt": started_at.unwrap_or_else(iso_now),
        });
        if let Some(notes) = notes {
            body["notes"] = Value::String(notes.to_string());
        }
        let path = format!("/runs/{}", self.run_id);
        let (http_status, payload) = self.client.patch_json(&path, &body).await?;
        ApiClient::ensure_success("mark_started failed", http_status, &payload)?;
        self.recache_run(payload);
        Ok(())
    }

    /// Finishes the run and consumes the session.
    ///
    /// Taking the session by value makes a second finish on the same run
    /// unrepresentable without deliberately re-attaching by run id; the
    /// server's behavior under a double finish is left unspecified, so the
    /// type system rules it out instead. Returns the final cached run
    /// snapshot when the server provided one.
    pub async fn finish(mut self, options: FinishOptions) -> TrackerResult<Option<Value>> {
        let status = RunStatus::parse_finish(&options.status)?;
        let finished_at = options.finished_at.unwrap_or_else(iso_now);
        let elapsed_ms = match options.elapsed_ms {
            Some(ms) => Some(ms),
            None => self.backfill_elapsed_ms(&finished_at).await,
        };
        let mut body = json!({ "status": status, "finishedAt": finished_at });
        if let Some(ms) = elapsed_ms {
            body["elapsedMs"] = json!(ms);
        }
        if let Some(notes) = &options.notes {
            body["notes"] = json!(notes);
        }
        let path = format!("/runs/{}", self.run_id);
        let (http_status, payload) = self.client.patch_json(&path, &body).await?;
        ApiClient::ensure_success("finish failed", http_status, &payload)?;
        self.recache_run(payload);
        Ok(self.run)
    }

    /// Fetches the current server-side representation of the run.
    pub async fn fetch_run(&self) -> TrackerResult<Value> {
        let path = format!("/runs/{}", self.run_id);
        let (status, payload) = self.client.get_json(&path).await?;
        ApiClient::ensure_success("run fetch failed", status, &payload)?;
        Ok(envelope::unwrap_envelope(payload))
    }

    /// Logs one step's metrics.
    pub async fn log(
        &self,
        metrics: &BTreeMap<String, f64>,
        step: u64,
        recorded_at: Option<&str>,
    ) -> TrackerResult<()> {
        let rows = metrics
            .iter()
            .map(|(key, value)| MetricRow {
                key: key.clone(),
                step,
                value: *value,
                recorded_at: recorded_at.map(str::to_string),
            })
            .collect();
        self.post_metrics(rows).await
    }

    /// Logs pre-assembled rows. The whole batch is rejected before any
    /// network call if a row is missing `key`, `step`, or `value`.
    pub async fn log_batch(&self, rows: &[Value]) -> TrackerResult<()> {
        let rows = metrics::validate_rows(rows)?;
        self.post_metrics(rows).await
    }

    async fn post_metrics(&self, rows: Vec<MetricRow>) -> TrackerResult<()> {
        let batches = metrics::build_batches(rows);
        let path = format!("/runs/{}/metrics", self.run_id);
        let (status, payload) = self.client.post_json(&path, &batches).await?;
        ApiClient::ensure_success("metrics log failed", status, &payload)?;
        // A 2xx is necessary but not sufficient: an explicit failure flag in
        // the body still fails the call.
        if let Value::Object(map) = &payload {
            if let Some(flag) = map.get("success") {
                if flag != &Value::Bool(true) {
                    return Err(TrackerError::Transport {
                        context: "metrics rejected by server".to_string(),
                        status: status.as_u16(),
                        body: payload.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Sends hyperparameters, inferring the value type of each entry.
    pub async fn log_hparams(
        &self,
        params: &Map<String, Value>,
        source: &str,
    ) -> TrackerResult<()> {
        let items: Vec<HParam> = params
            .iter()
            .map(|(key, value)| HParam::from_value(key, value, source))
            .collect();
        let path = format!("/runs/{}/hyperparams", self.run_id);
        let (status, payload) = self.client.post_json(&path, &items).await?;
        ApiClient::ensure_success("hparams log failed", status, &payload)
    }

    /// Sends an environment snapshot.
    pub async fn log_env_snapshot(&self, snapshot: &EnvSnapshot) -> TrackerResult<()> {
        let path = format!("/runs/{}/env", self.run_id);
        let (status, payload) = self.client.post_json(&path, snapshot).await?;
        ApiClient::ensure_success("env snapshot failed", status, &payload)
    }

    /// Registers a dataset reference for this run.
    pub async fn log_dataset_ref(&self, dataset: &DatasetRef) -> TrackerResult<Value> {
        let path = format!("/runs/{}/datasets", self.run_id);
        let (status, payload) = self.client.post_json(&path, dataset).await?;
        ApiClient::ensure_success("dataset ref failed", status, &payload)?;
        Ok(envelope::unwrap_envelope(payload))
    }

    /// Uploads a file as a run artifact via multipart POST.
    pub async fn upload_artifact(
        &self,
        path: &Path,
        options: ArtifactUpload,
    ) -> TrackerResult<Value> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("artifact")
            .to_string();
        let mut form = Form::new()
            .part(options.field_name, Part::bytes(bytes).file_name(file_name))
            .text("type", options.artifact_type);
        for (key, value) in options.extra_fields {
            form = form.text(key, value);
        }
        let url_path = format!("/runs/{}/artifacts", self.run_id);
        let (status, payload) = self.client.post_multipart(&url_path, form).await?;
        ApiClient::ensure_success("artifact upload failed", status, &payload)?;
        Ok(envelope::unwrap_envelope(payload))
    }

    /// Replaces the cached snapshot when the server returned one.
    fn recache_run(&mut self, payload: Value) {
        match envelope::unwrap_envelope(payload) {
            Value::Object(map) => self.run = Some(Value::Object(map)),
            other => debug!(body = %other, "no run snapshot in response; keeping cached copy"),
        }
    }

    /// Computes elapsed milliseconds from the cached (or re-fetched)
    /// `startedAt`. Strictly best-effort: any failure here is absorbed and
    /// only drops `elapsedMs` from the finish payload.
    async fn backfill_elapsed_ms(&self, finished_at: &str) -> Option<i64> {
        let started = match self.cached_started_at() {
            Some(started) => Some(started),
            None => self.refetch_started_at().await,
        };
        let ms = ms_between(&started?, finished_at)?;
        if ms < 0 {
            debug!(ms, "negative elapsed; omitting elapsedMs");
            return None;
        }
        Some(ms)
    }

    fn cached_started_at(&self) -> Option<String> {
        let run = self.run.as_ref()?;
        ["startedAt", "startTime", "started_at"]
            .iter()
            .find_map(|key| run.get(*key).and_then(Value::as_str))
            .map(str::to_string)
    }

    async fn refetch_started_at(&self) -> Option<String> {
        match self.fetch_run().await {
            Ok(run) => ["startedAt", "startTime"]
                .iter()
                .find_map(|key| run.get(*key).and_then(Value::as_str))
                .map(str::to_string),
            Err(err) => {
                debug!(error = %err, "run re-fetch failed; omitting elapsedMs");
                None
            }
        }
    }
}

fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn ms_between(start_iso: &str, end_iso: &str) -> Option<i64> {
    let start = DateTime::parse_from_rfc3339(start_iso).ok()?;
    let end = DateTime::parse_from_rfc3339(end_iso).ok()?;
    Some((end - start).num_milliseconds())
}

//! mltrack client
//!
//! Write-path SDK for the mltrack tracking service:
//! - Normalizing heterogeneous response envelopes (`envelope`)
//! - Idempotent create-or-discover of projects/experiments (`reconcile`)
//! - Run lifecycle sessions with explicit per-run context (`session`)
//! - Metric batching with last-write-wins deduplication (`metrics`)

pub mod api;
pub mod envelope;
pub mod error;
pub mod metrics;
pub mod reconcile;
pub mod session;
pub mod types;

pub use api::{ApiClient, ApiClientBuilder, Auth, DEFAULT_TIMEOUT_SECS};
pub use error::{TrackerError, TrackerResult};
pub use metrics::{MetricRow, StepMetrics};
pub use reconcile::{ensure_experiment, ensure_project};
pub use session::{
    ArtifactUpload, FinishOptions, RunSession, StartOptions, try_create_run,
};
pub use types::{DatasetRef, EnvSnapshot, HParam, HParamType, RunStatus};

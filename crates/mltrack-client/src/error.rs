use thiserror::Error;

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

/// Errors surfaced by the write path.
///
/// `Validation` and the pre-network status checks are raised before any
/// request is issued; `Transport` carries the status and body of a failed
/// call. Creation-unsupported is not an error at the probing layer (see
/// [`crate::session::try_create_run`]) and only becomes
/// `RunCreationUnsupported` when no fallback is possible.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{resource} '{name}' already exists but no discovery strategy found it")]
    ConflictUnresolved { resource: &'static str, name: String },

    #[error(
        "run creation endpoint not available; create the run via the UI/API and attach it with StartOptions::run_id"
    )]
    RunCreationUnsupported,

    #[error("{context} [{status}]: {body}")]
    Transport { context: String, status: u16, body: String },

    #[error("missing identifier in payload (expected one of id/runId/projectId/experimentId): {0}")]
    MissingId(String),

    #[error("request error: {0}")]
    Request(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.to_string())
    }
}

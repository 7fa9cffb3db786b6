//! Wire contract of the analysis service.

use serde::{Deserialize, Serialize};

use crate::series::RunSeries;
use crate::suggest::{self, Suggestion};

/// Request body for one recommendation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestRequest {
    #[serde(rename = "experimentId")]
    pub experiment_id: String,
    #[serde(default)]
    pub runs: Vec<RunSeries>,
}

/// Response body carrying the ranked suggestions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub suggestions: Vec<Suggestion>,
}

/// Computes recommendations for one request.
pub fn respond(request: &SuggestRequest) -> SuggestResponse {
    SuggestResponse { suggestions: suggest::recommend(&request.runs) }
}

//! mltrack insight
//!
//! Read-path analysis over logged metric series:
//! - Forecasting the next value of a series (`trend`, backed by `gbt`)
//! - Deriving ranked, explained tuning suggestions across runs (`suggest`)
//! - The analysis service wire contract (`service`)
//!
//! Everything here is pure and I/O-free: outputs are functions of the inputs
//! alone, deterministic under a fixed seed, and safe to evaluate
//! concurrently per run or per request.

pub mod gbt;
pub mod series;
pub mod service;
pub mod suggest;
pub mod trend;

pub use gbt::{GbtConfig, GradientBoostedTrees};
pub use series::{MetricPoint, RunSeries};
pub use service::{SuggestRequest, SuggestResponse, respond};
pub use suggest::{
    RunTrendStats, SearchGrid, Suggestion, SuggestionKind, recommend, recommend_from_stats,
};
pub use trend::{TrendForecast, last_value, predict_next};

//! Ranked, explained tuning suggestions derived from per-run forecasts.
//!
//! The three suggestion kinds are independent: missing inputs suppress only
//! the kind that needs them. The hyperparameter grid is shaped by an ordered
//! list of `(predicate, effect)` rules applied over a mutable working grid;
//! later rules override earlier effects on the same field and the last rule
//! that fires supplies the reported reason.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::series::RunSeries;
use crate::trend::{self, TrendForecast};

/// Suggestion kinds emitted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestionKind {
    RunSelection,
    EarlyStopHint,
    HyperparamSuggestion,
}

/// One recommendation, ready for wire serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub params: Value,
    #[serde(rename = "predictedScore", skip_serializing_if = "Option::is_none")]
    pub predicted_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanations: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// Per-run inputs to the engine.
#[derive(Debug, Clone, Default)]
pub struct RunTrendStats {
    pub run_id: String,
    pub accuracy: Option<TrendForecast>,
    pub loss: Option<TrendForecast>,
    pub last_accuracy: Option<f64>,
    pub last_loss: Option<f64>,
}

impl RunTrendStats {
    /// Computes forecasts and last observed values for one run's series.
    pub fn from_series(series: &RunSeries) -> Self {
        Self {
            run_id: series.run_id.clone(),
            accuracy: trend::predict_next(&series.accuracy, 1),
            loss: trend::predict_next(&series.loss, 1),
            last_accuracy: trend::last_value(&series.accuracy),
            last_loss: trend::last_value(&series.loss),
        }
    }
}

/// Runs all three suggestion kinds over the given runs.
pub fn recommend(runs: &[RunSeries]) -> Vec<Suggestion> {
    let stats: Vec<RunTrendStats> = runs.iter().map(RunTrendStats::from_series).collect();
    recommend_from_stats(&stats)
}

/// Engine core, separated from forecasting so each rule is testable on
/// fixed inputs.
pub fn recommend_from_stats(stats: &[RunTrendStats]) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();
    suggestions.extend(run_selection(stats));
    suggestions.extend(early_stop_hints(stats));
    suggestions.push(hyperparam_suggestion(stats));
    debug!(runs = stats.len(), suggestions = suggestions.len(), "recommendation pass done");
    suggestions
}

/// Sentinel ranking below any real accuracy value.
const NO_SCORE: f64 = -1.0;

/// Loss must be expected to drop by more than this to count as decreasing.
const LOSS_DROP_THRESHOLD: f64 = -1e-4;
/// Accuracy movement at or below this counts as stagnant.
const ACC_STAGNATION_THRESHOLD: f64 = 1e-4;

fn selection_score(stats: &RunTrendStats) -> f64 {
    stats
        .accuracy
        .map(|forecast| forecast.predicted_value)
        .or(stats.last_accuracy)
        .unwrap_or(NO_SCORE)
}

fn run_selection(stats: &[RunTrendStats]) -> Option<Suggestion> {
    // Strictly-greater comparison keeps the first-seen run on ties.
    let best = stats.iter().reduce(|best, candidate| {
        if selection_score(candidate) > selection_score(best) { candidate } else { best }
    })?;
    if best.accuracy.is_none() && best.last_accuracy.is_none() {
        return None;
    }
    let (basis, last, predicted) = match best.accuracy {
        Some(forecast) => {
            ("next-step prediction", forecast.last_value, forecast.predicted_value)
        }
        None => {
            let last = best.last_accuracy?;
            ("fallback to last observed value", last, last)
        }
    };
    Some(Suggestion {
        kind: SuggestionKind::RunSelection,
        params: json!({ "bestRunId": best.run_id, "predictedAccuracy": predicted }),
        predicted_score: Some(0.95),
        explanations: Some(json!({
            "basis": basis,
            "lastValue": last,
            "predictedValue": predicted,
        })),
        context: Some(json!({ "window": "all_points", "model": "boosted-trees+fallback" })),
    })
}

fn early_stop_hints(stats: &[RunTrendStats]) -> Vec<Suggestion> {
    stats
        .iter()
        .filter_map(|run| {
            let accuracy = run.accuracy?;
            let loss = run.loss?;
            if loss.delta >= LOSS_DROP_THRESHOLD || accuracy.delta > ACC_STAGNATION_THRESHOLD {
                return None;
            }
            let score = (loss.delta.abs() * 10.0 + (-accuracy.delta).max(0.0) * 10.0).min(1.0);
            Some(Suggestion {
                kind: SuggestionKind::EarlyStopHint,
                params: json!({
                    "runId": run.run_id,
                    "hints": [
                        "EarlyStopping(patience=3..5)",
                        "Increase Dropout",
                        "Increase Weight Decay",
                        "Stronger Augmentation",
                    ],
                }),
                predicted_score: Some(round2(score)),
                explanations: Some(json!({
                    "lossNextDelta": loss.delta,
                    "accNextDelta": accuracy.delta,
                    "reason": "Loss expected to drop while accuracy stagnates or decreases",
                })),
                context: Some(json!({ "model": "boosted-trees+fallback", "predictNextStep": true })),
            })
        })
        .collect()
}

/// Candidate grid mutated by the ordered heuristic rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchGrid {
    #[serde(rename = "lr")]
    pub learning_rates: Vec<f64>,
    #[serde(rename = "batch_size")]
    pub batch_sizes: Vec<u32>,
    pub epochs: Vec<u32>,
}

impl Default for SearchGrid {
    fn default() -> Self {
        Self {
            learning_rates: vec![0.1, 0.03, 0.01, 0.003, 0.001],
            batch_sizes: vec![32, 64, 128],
            epochs: vec![30, 50, 80],
        }
    }
}

/// Aggregate signals the grid rules act on.
#[derive(Debug, Clone, Copy)]
struct GridSignals {
    mean_accuracy_delta: f64,
    average_accuracy: f64,
    overfit_pattern: bool,
}

struct GridRule {
    reason: &'static str,
    applies: fn(&GridSignals) -> bool,
    apply: fn(&mut SearchGrid),
}

/// Ordered rules over the working grid. Order matters: rule 2 overrides the
/// learning rates rule 1 set, rule 4 overrides the epochs rule 3 set.
static GRID_RULES: [GridRule; 4] = [
    GridRule {
        reason: "Accuracy trend flat or declining; try higher learning rates",
        applies: |signals| signals.mean_accuracy_delta <= 0.0,
        apply: |grid| grid.learning_rates = vec![0.1, 0.05, 0.03],
    },
    GridRule {
        reason: "High accuracy but plateau; lower learning rates for fine-tuning",
        applies: |signals| signals.average_accuracy >= 0.90 && signals.mean_accuracy_delta <= 0.0,
        apply: |grid| grid.learning_rates = vec![0.01, 0.003, 0.001],
    },
    GridRule {
        reason: "Overfitting pattern detected; larger batches and fewer epochs",
        applies: |signals| signals.overfit_pattern,
        apply: |grid| {
            grid.batch_sizes = vec![64, 128];
            grid.epochs = vec![20, 30];
        },
    },
    GridRule {
        reason: "Underfitting; train for more epochs",
        applies: |signals| signals.average_accuracy < 0.60,
        apply: |grid| grid.epochs = vec![50, 80, 120],
    },
];

fn hyperparam_suggestion(stats: &[RunTrendStats]) -> Suggestion {
    let deltas: Vec<f64> =
        stats.iter().filter_map(|run| run.accuracy.map(|forecast| forecast.delta)).collect();
    let mean_accuracy_delta = mean(&deltas).unwrap_or(0.0);
    let last_accuracies: Vec<f64> = stats.iter().filter_map(|run| run.last_accuracy).collect();
    let average_accuracy = mean(&last_accuracies).unwrap_or(0.0);
    // The scan stops at the first run showing the pattern.
    let overfit_pattern = stats.iter().any(|run| {
        matches!(
            (run.accuracy, run.loss),
            (Some(accuracy), Some(loss)) if loss.delta < 0.0 && accuracy.delta <= 0.0
        )
    });
    let signals = GridSignals { mean_accuracy_delta, average_accuracy, overfit_pattern };

    let mut grid = SearchGrid::default();
    let mut reason = "Default grid";
    for rule in &GRID_RULES {
        if (rule.applies)(&signals) {
            (rule.apply)(&mut grid);
            reason = rule.reason;
        }
    }

    Suggestion {
        kind: SuggestionKind::HyperparamSuggestion,
        params: json!({ "grid": grid }),
        predicted_score: Some(0.6),
        explanations: Some(json!({
            "meanAccuracyDelta": mean_accuracy_delta,
            "averageAccuracy": average_accuracy,
            "reason": reason,
        })),
        context: Some(json!({ "model": "boosted-trees dynamic grid" })),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forecast(last: f64, predicted: f64) -> TrendForecast {
        TrendForecast { last_value: last, predicted_value: predicted, delta: predicted - last, next_step: 10 }
    }

    fn stats(run_id: &str) -> RunTrendStats {
        RunTrendStats { run_id: run_id.to_string(), ..RunTrendStats::default() }
    }

    fn find(suggestions: &[Suggestion], kind: SuggestionKind) -> Vec<&Suggestion> {
        suggestions.iter().filter(|s| s.kind == kind).collect()
    }

    #[test]
    fn selection_prefers_the_higher_predicted_accuracy() {
        let a = RunTrendStats { accuracy: Some(forecast(0.78, 0.80)), ..stats("run-a") };
        let b = RunTrendStats { accuracy: Some(forecast(0.88, 0.90)), ..stats("run-b") };
        let suggestions = recommend_from_stats(&[a, b]);
        let selection = find(&suggestions, SuggestionKind::RunSelection);
        assert_eq!(selection.len(), 1);
        assert_eq!(selection[0].params["bestRunId"], "run-b");
        assert_eq!(
            selection[0].explanations.as_ref().unwrap()["basis"],
            "next-step prediction"
        );
    }

    #[test]
    fn selection_falls_back_to_last_observed_value() {
        let a = RunTrendStats { last_accuracy: Some(0.7), ..stats("run-a") };
        let b = RunTrendStats { last_accuracy: Some(0.6), ..stats("run-b") };
        let suggestions = recommend_from_stats(&[a, b]);
        let selection = find(&suggestions, SuggestionKind::RunSelection);
        assert_eq!(selection[0].params["bestRunId"], "run-a");
        assert_eq!(
            selection[0].explanations.as_ref().unwrap()["basis"],
            "fallback to last observed value"
        );
    }

    #[test]
    fn selection_keeps_first_seen_run_on_ties() {
        let a = RunTrendStats { accuracy: Some(forecast(0.8, 0.9)), ..stats("run-a") };
        let b = RunTrendStats { accuracy: Some(forecast(0.8, 0.9)), ..stats("run-b") };
        let suggestions = recommend_from_stats(&[a, b]);
        assert_eq!(find(&suggestions, SuggestionKind::RunSelection)[0].params["bestRunId"], "run-a");
    }

    #[test]
    fn selection_is_suppressed_without_any_signal() {
        let suggestions = recommend_from_stats(&[stats("run-a")]);
        assert!(find(&suggestions, SuggestionKind::RunSelection).is_empty());
    }

    #[test]
    fn early_stop_fires_on_loss_down_accuracy_flat() {
        let run = RunTrendStats {
            accuracy: Some(forecast(0.802, 0.800)), // delta -0.002
            loss: Some(forecast(0.51, 0.50)),       // delta -0.01
            ..stats("run-a")
        };
        let suggestions = recommend_from_stats(&[run]);
        let hints = find(&suggestions, SuggestionKind::EarlyStopHint);
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].params["runId"], "run-a");
        // |−0.01|·10 + 0.002·10 = 0.12
        assert!((hints[0].predicted_score.unwrap() - 0.12).abs() < 1e-9);
    }

    #[test]
    fn early_stop_is_silent_when_loss_rises() {
        let run = RunTrendStats {
            accuracy: Some(forecast(0.80, 0.80)),
            loss: Some(forecast(0.50, 0.51)), // delta +0.01
            ..stats("run-a")
        };
        let suggestions = recommend_from_stats(&[run]);
        assert!(find(&suggestions, SuggestionKind::EarlyStopHint).is_empty());
    }

    #[test]
    fn early_stop_requires_both_forecasts() {
        let run = RunTrendStats { loss: Some(forecast(0.51, 0.50)), ..stats("run-a") };
        let suggestions = recommend_from_stats(&[run]);
        assert!(find(&suggestions, SuggestionKind::EarlyStopHint).is_empty());
    }

    #[test]
    fn early_stop_score_is_capped_at_one() {
        let run = RunTrendStats {
            accuracy: Some(forecast(0.9, 0.5)), // delta -0.4
            loss: Some(forecast(0.9, 0.1)),     // delta -0.8
            ..stats("run-a")
        };
        let suggestions = recommend_from_stats(&[run]);
        let hints = find(&suggestions, SuggestionKind::EarlyStopHint);
        assert_eq!(hints[0].predicted_score, Some(1.0));
    }

    #[test]
    fn grid_defaults_when_trends_improve() {
        let run = RunTrendStats {
            accuracy: Some(forecast(0.70, 0.75)), // delta +0.05
            last_accuracy: Some(0.70),
            ..stats("run-a")
        };
        let suggestions = recommend_from_stats(&[run]);
        let grid_suggestion = find(&suggestions, SuggestionKind::HyperparamSuggestion);
        assert_eq!(grid_suggestion.len(), 1);
        let grid: SearchGrid =
            serde_json::from_value(grid_suggestion[0].params["grid"].clone()).unwrap();
        assert_eq!(grid, SearchGrid::default());
        assert_eq!(
            grid_suggestion[0].explanations.as_ref().unwrap()["reason"],
            "Default grid"
        );
    }

    #[test]
    fn flat_trend_widens_toward_higher_learning_rates() {
        let run = RunTrendStats {
            accuracy: Some(forecast(0.70, 0.69)), // delta -0.01
            last_accuracy: Some(0.70),
            ..stats("run-a")
        };
        let suggestions = recommend_from_stats(&[run]);
        let grid: SearchGrid = serde_json::from_value(
            find(&suggestions, SuggestionKind::HyperparamSuggestion)[0].params["grid"].clone(),
        )
        .unwrap();
        assert_eq!(grid.learning_rates, vec![0.1, 0.05, 0.03]);
    }

    #[test]
    fn plateau_at_high_accuracy_overrides_to_fine_tuning_rates() {
        let run = RunTrendStats {
            accuracy: Some(forecast(0.96, 0.95)), // delta -0.01
            last_accuracy: Some(0.95),
            ..stats("run-a")
        };
        let suggestions = recommend_from_stats(&[run]);
        let grid_suggestion = find(&suggestions, SuggestionKind::HyperparamSuggestion);
        let grid: SearchGrid =
            serde_json::from_value(grid_suggestion[0].params["grid"].clone()).unwrap();
        assert_eq!(grid.learning_rates, vec![0.01, 0.003, 0.001]);
        let reason = grid_suggestion[0].explanations.as_ref().unwrap()["reason"]
            .as_str()
            .unwrap();
        assert!(reason.contains("plateau"));
    }

    #[test]
    fn overfit_pattern_bumps_batches_and_cuts_epochs() {
        let run = RunTrendStats {
            accuracy: Some(forecast(0.80, 0.80)), // delta 0
            loss: Some(forecast(0.50, 0.45)),     // delta -0.05
            last_accuracy: Some(0.80),
            ..stats("run-a")
        };
        let suggestions = recommend_from_stats(&[run]);
        let grid_suggestion = find(&suggestions, SuggestionKind::HyperparamSuggestion);
        let grid: SearchGrid =
            serde_json::from_value(grid_suggestion[0].params["grid"].clone()).unwrap();
        assert_eq!(grid.batch_sizes, vec![64, 128]);
        assert_eq!(grid.epochs, vec![20, 30]);
    }

    #[test]
    fn underfitting_overrides_epochs_upward_and_owns_the_reason() {
        let run = RunTrendStats {
            accuracy: Some(forecast(0.50, 0.50)), // delta 0 → rules 1 and 3 also fire
            loss: Some(forecast(0.9, 0.8)),
            last_accuracy: Some(0.50),
            ..stats("run-a")
        };
        let suggestions = recommend_from_stats(&[run]);
        let grid_suggestion = find(&suggestions, SuggestionKind::HyperparamSuggestion);
        let grid: SearchGrid =
            serde_json::from_value(grid_suggestion[0].params["grid"].clone()).unwrap();
        // Rule 3 set epochs [20, 30]; rule 4 overrides them upward.
        assert_eq!(grid.epochs, vec![50, 80, 120]);
        assert_eq!(grid.batch_sizes, vec![64, 128]);
        let reason = grid_suggestion[0].explanations.as_ref().unwrap()["reason"]
            .as_str()
            .unwrap();
        assert!(reason.contains("Underfitting"));
    }

    #[test]
    fn grid_suggestion_is_emitted_even_without_runs() {
        let suggestions = recommend_from_stats(&[]);
        assert_eq!(find(&suggestions, SuggestionKind::HyperparamSuggestion).len(), 1);
        assert!(find(&suggestions, SuggestionKind::RunSelection).is_empty());
    }
}

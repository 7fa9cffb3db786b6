//! Next-step forecasting for one metric series.

use serde::{Deserialize, Serialize};

use crate::gbt::{GbtConfig, GradientBoostedTrees};
use crate::series::MetricPoint;

/// Forecast for the next step of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendForecast {
    #[serde(rename = "lastValue")]
    pub last_value: f64,
    #[serde(rename = "predictedValue")]
    pub predicted_value: f64,
    pub delta: f64,
    #[serde(rename = "nextStep")]
    pub next_step: i64,
}

/// Forecasts the series value at `last_step + offset`.
///
/// An empty series yields no forecast. Fewer than three observations yield a
/// flat continuation (`predicted = last`, `delta = 0`) instead of a fitted
/// model; with three or more the boosted-tree ensemble is fit on the step
/// index alone. Identical inputs always yield identical outputs.
pub fn predict_next(points: &[MetricPoint], offset: i64) -> Option<TrendForecast> {
    if points.is_empty() {
        return None;
    }
    let mut ordered = points.to_vec();
    ordered.sort_by_key(|point| point.step);
    let last = ordered[ordered.len() - 1];
    let next_step = last.step + offset;

    if ordered.len() < 3 {
        return Some(TrendForecast {
            last_value: last.value,
            predicted_value: last.value,
            delta: 0.0,
            next_step,
        });
    }

    let steps: Vec<f64> = ordered.iter().map(|point| point.step as f64).collect();
    let values: Vec<f64> = ordered.iter().map(|point| point.value).collect();
    let model = GradientBoostedTrees::fit(&[steps], &values, &GbtConfig::default());
    let predicted = model.predict(&[next_step as f64]);

    Some(TrendForecast {
        last_value: last.value,
        predicted_value: predicted,
        delta: predicted - last.value,
        next_step,
    })
}

/// Last observed value in step order.
pub fn last_value(points: &[MetricPoint]) -> Option<f64> {
    points.iter().max_by_key(|point| point.step).map(|point| point.value)
}

//! Metric series shared by the prediction and suggestion layers.

use serde::{Deserialize, Serialize};

/// One observed value of a metric at a step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub step: i64,
    pub value: f64,
}

/// Metric series logged by one run.
///
/// `seriesA` is the improves-when-higher metric (accuracy-like), `seriesB`
/// the improves-when-lower one (loss-like).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSeries {
    #[serde(rename = "runId")]
    pub run_id: String,
    #[serde(rename = "seriesA", default)]
    pub accuracy: Vec<MetricPoint>,
    #[serde(rename = "seriesB", default)]
    pub loss: Vec<MetricPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_series_deserializes_wire_names() {
        let series: RunSeries = serde_json::from_str(
            r#"{ "runId": "r-1", "seriesA": [{ "step": 1, "value": 0.5 }] }"#,
        )
        .unwrap();
        assert_eq!(series.run_id, "r-1");
        assert_eq!(series.accuracy.len(), 1);
        assert!(series.loss.is_empty());
    }
}

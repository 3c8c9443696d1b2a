// Series metrics - summary statistics over a view or history
use super::sample::Sample;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataMetrics {
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub standard_deviation: f64,
    pub count: usize,
    pub duration: i64,
}

/// Population statistics; all zeros for an empty series.
pub fn calculate_metrics(samples: &[Sample]) -> DataMetrics {
    if samples.is_empty() {
        return DataMetrics::default();
    }

    let count = samples.len();
    let (mut min, mut max, mut sum) = (f64::INFINITY, f64::NEG_INFINITY, 0.0);
    let (mut first, mut last) = (i64::MAX, i64::MIN);
    for sample in samples {
        min = min.min(sample.value);
        max = max.max(sample.value);
        sum += sample.value;
        first = first.min(sample.timestamp);
        last = last.max(sample.timestamp);
    }

    let average = sum / count as f64;
    let variance = samples
        .iter()
        .map(|s| (s.value - average).powi(2))
        .sum::<f64>()
        / count as f64;

    DataMetrics {
        min,
        max,
        average,
        standard_deviation: variance.sqrt(),
        count,
        duration: last - first,
    }
}

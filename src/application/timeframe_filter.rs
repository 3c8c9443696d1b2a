// Timeframe filter - derives windowed views from a history snapshot
use crate::domain::sample::Sample;
use crate::domain::timeframe::{CustomRange, Timeframe, ViewWindow};
use serde::Deserialize;

pub const DEFAULT_FALLBACK_POINTS: usize = 100;

/// One row of the clustered-feed table: windows up to `max_window_ms` show
/// the newest `percent` of the series.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PercentBucket {
    pub max_window_ms: i64,
    pub percent: u32,
}

/// Heuristic for feeds whose timestamps carry no real spacing: when a large
/// series spans almost no time, a preset picks a share of the newest points
/// instead of a time window.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClusteredFeedPolicy {
    #[default]
    Disabled,
    PercentBuckets {
        min_points: usize,
        max_span_ms: i64,
        buckets: Vec<PercentBucket>,
    },
}

impl ClusteredFeedPolicy {
    pub fn percent_buckets() -> Self {
        ClusteredFeedPolicy::PercentBuckets {
            min_points: 100,
            max_span_ms: 3000,
            buckets: vec![
                PercentBucket { max_window_ms: 10_000, percent: 20 },
                PercentBucket { max_window_ms: 30_000, percent: 40 },
                PercentBucket { max_window_ms: 60_000, percent: 60 },
                PercentBucket { max_window_ms: 300_000, percent: 80 },
            ],
        }
    }

    /// Returns the view if the policy applies to this series.
    fn apply(&self, series: &[Sample], window_ms: i64) -> Option<Vec<Sample>> {
        let ClusteredFeedPolicy::PercentBuckets { min_points, max_span_ms, buckets } = self else {
            return None;
        };
        if series.len() <= *min_points {
            return None;
        }
        let span = match (series.first(), series.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => return None,
        };
        if span <= 0 || span >= *max_span_ms {
            return None;
        }

        let percent = buckets
            .iter()
            .find(|bucket| window_ms <= bucket.max_window_ms)
            .map(|bucket| bucket.percent)
            .unwrap_or(100)
            .min(100) as usize;
        let count = (series.len() * percent).div_ceil(100);
        Some(newest(series, count))
    }
}

fn newest(series: &[Sample], count: usize) -> Vec<Sample> {
    series[series.len().saturating_sub(count)..].to_vec()
}

/// Samples within `timeframe` of the series' newest timestamp. Never empty
/// for a non-empty series: falls back to the newest `fallback_points`.
pub fn filter_preset(
    series: &[Sample],
    timeframe: &Timeframe,
    policy: &ClusteredFeedPolicy,
    fallback_points: usize,
) -> Vec<Sample> {
    let Some(latest) = series.last() else {
        return Vec::new();
    };
    let window_ms = timeframe.to_millis();

    if let Some(view) = policy.apply(series, window_ms) {
        if !view.is_empty() {
            return view;
        }
    }

    let cutoff = latest.timestamp - window_ms;
    let start = series.partition_point(|s| s.timestamp < cutoff);
    let view = series[start..].to_vec();
    if view.is_empty() {
        return newest(series, fallback_points.max(1).min(series.len()));
    }
    view
}

/// Samples inside the inclusive range. An empty result is honored.
pub fn filter_custom(series: &[Sample], range: &CustomRange) -> Vec<Sample> {
    series
        .iter()
        .filter(|s| range.contains(s.timestamp))
        .cloned()
        .collect()
}

pub fn filter_view(
    series: &[Sample],
    window: &ViewWindow,
    policy: &ClusteredFeedPolicy,
    fallback_points: usize,
) -> Vec<Sample> {
    match window {
        ViewWindow::Unbounded => series.to_vec(),
        ViewWindow::Preset(timeframe) => filter_preset(series, timeframe, policy, fallback_points),
        ViewWindow::Custom(range) => filter_custom(series, range),
    }
}

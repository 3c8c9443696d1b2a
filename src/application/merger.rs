// Merger - folds staged buffers into bounded, sorted histories on each tick
use crate::application::producer_state::ProducerArena;
use crate::domain::sample::Sample;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_DATA_POINTS: usize = 10_000;
const TIMING_WINDOW: usize = 20;

/// Rolling window of recent merge pass durations. Advisory only.
#[derive(Debug, Clone, Default)]
pub struct MergeTimings {
    samples: VecDeque<Duration>,
    recorded: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeDiagnostics {
    pub recent_micros: Vec<u64>,
    pub average_micros: f64,
    pub merges: u64,
}

impl MergeTimings {
    pub fn record(&mut self, elapsed: Duration) {
        self.samples.push_back(elapsed);
        if self.samples.len() > TIMING_WINDOW {
            self.samples.pop_front();
        }
        self.recorded += 1;

        if self.recorded % 10 == 0 {
            tracing::debug!("merge avg time: {:.2}ms", self.average().as_secs_f64() * 1000.0);
        }
    }

    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        self.samples.iter().sum::<Duration>() / self.samples.len() as u32
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn diagnostics(&self) -> MergeDiagnostics {
        MergeDiagnostics {
            recent_micros: self.samples.iter().map(|d| d.as_micros() as u64).collect(),
            average_micros: self.average().as_secs_f64() * 1_000_000.0,
            merges: self.recorded,
        }
    }
}

/// Concatenate, stable-sort and keep the newest `max_points` samples.
pub fn merge_series(history: &[Sample], staged: Vec<Sample>, max_points: usize) -> Vec<Sample> {
    let mut merged = Vec::with_capacity(history.len() + staged.len());
    merged.extend_from_slice(history);
    merged.extend(staged);
    merged.sort_by_key(|s| s.timestamp);
    truncate_oldest(&mut merged, max_points);
    merged
}

pub fn truncate_oldest(series: &mut Vec<Sample>, max_points: usize) {
    if series.len() > max_points {
        let excess = series.len() - max_points;
        series.drain(..excess);
    }
}

pub struct Merger {
    max_data_points: usize,
    timings: MergeTimings,
}

impl Merger {
    pub fn new(max_data_points: usize) -> Self {
        Self {
            max_data_points,
            timings: MergeTimings::default(),
        }
    }

    pub fn set_max_data_points(&mut self, max_data_points: usize) {
        self.max_data_points = max_data_points;
    }

    pub fn timings(&self) -> &MergeTimings {
        &self.timings
    }

    /// Run one merge pass. Returns false, touching nothing, when every
    /// buffer is empty.
    pub fn merge_pass(&mut self, arena: &mut ProducerArena) -> bool {
        let started = Instant::now();
        let mut merged_any = false;

        for (_, state) in arena.iter_mut() {
            if state.buffer.is_empty() {
                continue;
            }
            let staged = state.buffer.take();
            state.history = Arc::new(merge_series(&state.history, staged, self.max_data_points));
            merged_any = true;
        }

        if merged_any {
            self.timings.record(started.elapsed());
        }
        merged_any
    }

    /// Trim every history to the current cap. Returns true if anything shrank.
    pub fn enforce_cap(&self, arena: &mut ProducerArena) -> bool {
        let mut trimmed = false;
        for (_, state) in arena.iter_mut() {
            if state.history.len() > self.max_data_points {
                let mut history = state.history.as_ref().clone();
                truncate_oldest(&mut history, self.max_data_points);
                state.history = Arc::new(history);
                trimmed = true;
            }
        }
        trimmed
    }
}

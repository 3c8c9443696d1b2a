// Ingestion buffer - per-producer staging area between validation and merge
use crate::domain::sample::Sample;

pub const DEFAULT_BATCH_CAP: usize = 1000;

/// Keep every `ceil(len / cap)`-th sample. Lossy decimation, not a summary.
pub fn downsample(batch: Vec<Sample>, cap: usize) -> Vec<Sample> {
    if cap == 0 || batch.len() <= cap {
        return batch;
    }
    let stride = batch.len().div_ceil(cap);
    batch.into_iter().step_by(stride).collect()
}

/// Staged samples for one producer, bounded at twice the batch cap.
#[derive(Debug, Clone, Default)]
pub struct IngestionBuffer {
    samples: Vec<Sample>,
}

impl IngestionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a validated batch, downsampling oversized batches first and
    /// dropping the oldest staged samples beyond `2 * cap`.
    pub fn push(&mut self, producer_id: &str, batch: Vec<Sample>, cap: usize) {
        let original = batch.len();
        let batch = downsample(batch, cap);
        if batch.len() < original {
            tracing::warn!(
                producer_id = %producer_id,
                original,
                downsampled = batch.len(),
                "received too many points, downsampling"
            );
        }

        self.samples.extend(batch);

        let ceiling = cap.saturating_mul(2);
        if ceiling > 0 && self.samples.len() > ceiling {
            let excess = self.samples.len() - ceiling;
            self.samples.drain(..excess);
        }
    }

    pub fn take(&mut self) -> Vec<Sample> {
        std::mem::take(&mut self.samples)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(count: usize) -> Vec<Sample> {
        (0..count)
            .map(|i| Sample::new("p1", 1_000 + i as i64 * 10, i as f64))
            .collect()
    }

    #[test]
    fn test_downsample_preserves_span() {
        let original = series(2500);
        let result = downsample(original.clone(), 1000);

        assert!(result.len() <= 1000);
        assert_eq!(result.len(), 834);
        assert_eq!(result[0], original[0]);
        for pair in result.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
            assert_eq!(pair[1].timestamp - pair[0].timestamp, 30);
        }
    }

    #[test]
    fn test_small_batch_untouched() {
        assert_eq!(downsample(series(10), 1000).len(), 10);
    }

    #[test]
    fn test_buffer_truncates_to_twice_cap() {
        let mut buffer = IngestionBuffer::new();
        buffer.push("p1", series(8), 4);
        assert_eq!(buffer.len(), 4);

        buffer.push("p1", series(3), 4);
        buffer.push("p1", series(3), 4);
        buffer.push("p1", series(3), 4);
        assert_eq!(buffer.len(), 8);

        let staged = buffer.take();
        assert_eq!(staged.last().map(|s| s.timestamp), Some(1_020));
        assert!(buffer.is_empty());
    }
}

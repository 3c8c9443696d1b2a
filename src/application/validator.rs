// Validator/Deduper - normalizes raw batches and rejects invalid or stale samples
use crate::domain::sample::{normalize_timestamp, RawSample, Sample};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleRejection {
    #[error("invalid sample (timestamp={timestamp}, value={value})")]
    Invalid { timestamp: f64, value: f64 },
    #[error("timestamp {timestamp} is not after watermark {watermark}")]
    DuplicateOrStale { timestamp: i64, watermark: i64 },
}

/// Check one raw sample and return its normalized millisecond timestamp.
fn check_finite(raw: &RawSample) -> Result<i64, SampleRejection> {
    let timestamp = normalize_timestamp(raw.timestamp);
    if !timestamp.is_finite() || !raw.value.is_finite() {
        return Err(SampleRejection::Invalid {
            timestamp: raw.timestamp,
            value: raw.value,
        });
    }
    Ok(timestamp.round() as i64)
}

/// Validate a batch against `watermark`, which is advanced to the newest
/// accepted timestamp. The result is strictly increasing by timestamp, so a
/// timestamp repeated inside one batch is accepted only once.
pub fn validate_batch(producer_id: &str, raw: &[RawSample], watermark: &mut i64) -> Vec<Sample> {
    let mut candidates: Vec<(i64, f64)> = Vec::with_capacity(raw.len());
    for sample in raw {
        match check_finite(sample) {
            Ok(timestamp) => candidates.push((timestamp, sample.value)),
            Err(rejection) => {
                tracing::warn!(producer_id = %producer_id, "dropping sample: {}", rejection);
            }
        }
    }

    candidates.sort_by_key(|(timestamp, _)| *timestamp);

    let mut accepted = Vec::with_capacity(candidates.len());
    let mut stale = 0usize;
    for (timestamp, value) in candidates {
        if timestamp <= *watermark {
            stale += 1;
            tracing::trace!(
                producer_id = %producer_id,
                "{}",
                SampleRejection::DuplicateOrStale { timestamp, watermark: *watermark }
            );
            continue;
        }
        *watermark = timestamp;
        accepted.push(Sample::new(producer_id, timestamp, value));
    }

    if stale > 0 {
        tracing::debug!(
            producer_id = %producer_id,
            stale,
            accepted = accepted.len(),
            "dropped duplicate or stale samples"
        );
    }

    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(points: &[(f64, f64)]) -> Vec<RawSample> {
        points.iter().map(|(t, v)| RawSample::new(*t, *v)).collect()
    }

    fn timestamps(samples: &[Sample]) -> Vec<i64> {
        samples.iter().map(|s| s.timestamp).collect()
    }

    #[test]
    fn test_stale_sample_in_second_batch_is_rejected() {
        let mut watermark = 0;
        let first = validate_batch("p1", &raw(&[(100.0, 1.0), (200.0, 2.0), (300.0, 3.0)]), &mut watermark);
        assert_eq!(first.len(), 3);

        let second = validate_batch("p1", &raw(&[(250.0, 4.0), (400.0, 5.0)]), &mut watermark);
        assert_eq!(timestamps(&second), vec![400_000]);
        assert_eq!(watermark, 400_000);
    }

    #[test]
    fn test_millisecond_batch_keeps_timestamps() {
        let mut watermark = 0;
        let base = 1_700_000_000_000.0;
        let accepted = validate_batch(
            "p1",
            &raw(&[(base + 300.0, 1.0), (base + 100.0, 2.0), (base + 200.0, 3.0)]),
            &mut watermark,
        );
        assert_eq!(
            timestamps(&accepted),
            vec![1_700_000_000_100, 1_700_000_000_200, 1_700_000_000_300]
        );
        assert_eq!(watermark, 1_700_000_000_300);
    }

    #[test]
    fn test_redelivery_is_rejected() {
        let mut watermark = 0;
        let batch = raw(&[(1_700_000_000_000.0, 1.0)]);
        assert_eq!(validate_batch("p1", &batch, &mut watermark).len(), 1);
        assert!(validate_batch("p1", &batch, &mut watermark).is_empty());
    }

    #[test]
    fn test_non_finite_samples_are_dropped() {
        let mut watermark = 0;
        let accepted = validate_batch(
            "p1",
            &raw(&[
                (f64::NAN, 1.0),
                (1_700_000_000_000.0, f64::INFINITY),
                (1_700_000_000_001.0, 2.0),
            ]),
            &mut watermark,
        );
        assert_eq!(timestamps(&accepted), vec![1_700_000_000_001]);
    }

    #[test]
    fn test_duplicates_within_batch_accepted_once() {
        let mut watermark = 0;
        let accepted = validate_batch(
            "p1",
            &raw(&[(1_700_000_000_000.0, 1.0), (1_700_000_000_000.0, 2.0)]),
            &mut watermark,
        );
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].value, 1.0);
    }

    #[test]
    fn test_empty_after_filtering_leaves_watermark() {
        let mut watermark = 5_000_000;
        let accepted = validate_batch("p1", &raw(&[(1000.0, 1.0)]), &mut watermark);
        assert!(accepted.is_empty());
        assert_eq!(watermark, 5_000_000);
    }
}

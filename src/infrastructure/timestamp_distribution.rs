// Timestamp distribution - assigns timestamps to polled entries
use crate::domain::sample::RawSample;
use crate::infrastructure::config::{DistributionConfig, DistributionMode};
use crate::infrastructure::wire::WireEntry;

/// The polled feed does not carry meaningful per-point timestamps, so by
/// default points are spread backwards from the receive time: the first
/// batch across a wide window with recent points packed tighter, later
/// batches across a short recent window.
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampDistribution {
    Redistribute {
        initial_span_ms: f64,
        skew_exponent: f64,
        recent_span_ms: f64,
    },
    Passthrough,
}

impl From<&DistributionConfig> for TimestampDistribution {
    fn from(config: &DistributionConfig) -> Self {
        match config.mode {
            DistributionMode::Passthrough => TimestampDistribution::Passthrough,
            DistributionMode::Redistribute => TimestampDistribution::Redistribute {
                initial_span_ms: config.initial_span_ms as f64,
                skew_exponent: config.skew_exponent,
                recent_span_ms: config.recent_span_ms as f64,
            },
        }
    }
}

impl TimestampDistribution {
    /// Entries are in arrival order, oldest first.
    pub fn assign(&self, entries: &[WireEntry], first_batch: bool, receive_ms: f64) -> Vec<RawSample> {
        let last = entries.len().saturating_sub(1).max(1) as f64;

        entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let timestamp = match self {
                    TimestampDistribution::Passthrough => entry.wire_timestamp(),
                    TimestampDistribution::Redistribute {
                        initial_span_ms,
                        skew_exponent,
                        recent_span_ms,
                    } => {
                        // 1.0 for the oldest entry, 0.0 for the newest.
                        let age = (entries.len() - index - 1) as f64 / last;
                        if first_batch {
                            receive_ms - initial_span_ms * age.powf(*skew_exponent)
                        } else {
                            receive_ms - recent_span_ms * age
                        }
                    }
                };
                RawSample::new(timestamp, entry.numeric_value())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: f64 = 1_700_000_000_000.0;

    fn entries(count: usize) -> Vec<WireEntry> {
        (0..count)
            .map(|i| WireEntry {
                timestamp: json!("1700000000000"),
                value: json!(i),
            })
            .collect()
    }

    fn redistribute() -> TimestampDistribution {
        TimestampDistribution::from(&DistributionConfig::default())
    }

    fn stamps(samples: &[RawSample]) -> Vec<f64> {
        samples.iter().map(|s| s.timestamp).collect()
    }

    #[test]
    fn test_first_batch_is_skewed_towards_now() {
        let samples = redistribute().assign(&entries(3), true, NOW);
        assert_eq!(stamps(&samples), vec![NOW - 1_200_000.0, NOW - 300_000.0, NOW]);
        assert_eq!(samples[2].value, 2.0);
    }

    #[test]
    fn test_later_batches_use_recent_window() {
        let samples = redistribute().assign(&entries(3), false, NOW);
        assert_eq!(stamps(&samples), vec![NOW - 5_000.0, NOW - 2_500.0, NOW]);
    }

    #[test]
    fn test_single_entry_lands_on_receive_time() {
        let samples = redistribute().assign(&entries(1), true, NOW);
        assert_eq!(stamps(&samples), vec![NOW]);
    }

    #[test]
    fn test_passthrough_uses_wire_timestamps() {
        let samples = TimestampDistribution::Passthrough.assign(&entries(2), true, 0.0);
        assert_eq!(stamps(&samples), vec![NOW, NOW]);
    }

    #[test]
    fn test_passthrough_seconds_are_normalized_once() {
        use crate::application::validator::validate_batch;

        let wire = vec![
            WireEntry { timestamp: json!("100"), value: json!(1.0) },
            WireEntry { timestamp: json!(200), value: json!(2.0) },
        ];
        let samples = TimestampDistribution::Passthrough.assign(&wire, true, NOW);
        let mut watermark = 0;
        let accepted = validate_batch("p1", &samples, &mut watermark);

        let timestamps: Vec<i64> = accepted.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![100_000, 200_000]);
    }
}

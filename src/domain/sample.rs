// Sample domain models - raw samples as delivered, validated samples as stored
use serde::Serialize;

/// Epoch milliseconds for 2000-01-01T00:00:00Z. Anything smaller is taken to
/// be expressed in seconds.
pub const YEAR_2000_MS: f64 = 946_684_800_000.0;

/// A sample exactly as a transport delivered it: the timestamp may be in
/// seconds or milliseconds and either field may be non-finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub value: f64,
    pub timestamp: f64,
}

impl RawSample {
    pub fn new(timestamp: f64, value: f64) -> Self {
        Self { value, timestamp }
    }
}

/// A batch of raw samples for one producer. `generation` identifies the
/// activation that produced it; the sink stamps it on delivery.
#[derive(Debug, Clone)]
pub struct RawBatch {
    pub producer_id: String,
    pub samples: Vec<RawSample>,
    pub generation: u64,
}

impl RawBatch {
    pub fn new(producer_id: impl Into<String>, samples: Vec<RawSample>) -> Self {
        Self {
            producer_id: producer_id.into(),
            samples,
            generation: 0,
        }
    }
}

/// A validated sample. Timestamps are integer epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub value: f64,
    pub timestamp: i64,
    pub producer_id: String,
}

impl Sample {
    pub fn new(producer_id: impl Into<String>, timestamp: i64, value: f64) -> Self {
        Self {
            value,
            timestamp,
            producer_id: producer_id.into(),
        }
    }
}

/// Apply the seconds-to-milliseconds heuristic.
pub fn normalize_timestamp(timestamp: f64) -> f64 {
    if timestamp < YEAR_2000_MS {
        timestamp * 1000.0
    } else {
        timestamp
    }
}

/// Parse a textual timestamp: a bare epoch number, returned as written, or
/// RFC 3339 in milliseconds. Returns NaN when the text is neither. Unit
/// normalization is left to validation.
pub fn parse_timestamp(text: &str) -> f64 {
    let trimmed = text.trim();
    if let Ok(number) = trimmed.parse::<f64>() {
        return number;
    }
    match chrono::DateTime::parse_from_rfc3339(trimmed) {
        Ok(time) => time.timestamp_millis() as f64,
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_timestamp() {
        assert_eq!(normalize_timestamp(1_627_776.0), 1_627_776_000.0);
        assert_eq!(normalize_timestamp(1_627_776_000_000.0), 1_627_776_000_000.0);
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("1627776000000"), 1_627_776_000_000.0);
        assert_eq!(parse_timestamp("1627776000"), 1_627_776_000.0);
        assert_eq!(parse_timestamp("2021-08-01T00:00:00Z"), 1_627_776_000_000.0);
        assert!(parse_timestamp("yesterday").is_nan());
    }
}

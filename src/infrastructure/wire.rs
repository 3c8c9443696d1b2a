// Wire format for the polling endpoint - one JSON array of entries per connection
use crate::application::transport::TransportError;
use crate::domain::sample::parse_timestamp;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct WireEntry {
    pub timestamp: Value,
    pub value: Value,
}

impl WireEntry {
    /// Numbers pass through, numeric strings are parsed, anything else is NaN.
    pub fn numeric_value(&self) -> f64 {
        as_number(&self.value).unwrap_or(f64::NAN)
    }

    pub fn wire_timestamp(&self) -> f64 {
        match &self.timestamp {
            Value::String(text) => parse_timestamp(text),
            other => as_number(other).unwrap_or(f64::NAN),
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn decode_message(text: &str) -> Result<Vec<WireEntry>, TransportError> {
    serde_json::from_str(text).map_err(|e| TransportError::Decode(e.to_string()))
}

/// `<base>/<id>` with the first hyphen of the id turned into an underscore.
pub fn endpoint_url(base_url: &str, producer_id: &str) -> String {
    let backend_id = producer_id.replacen('-', "_", 1);
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(&backend_id)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_message() {
        let entries = decode_message(
            r#"[{"timestamp":"1700000000000","value":1.5},{"timestamp":"x","value":"2.5"},{"timestamp":"1","value":null}]"#,
        )
        .unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].numeric_value(), 1.5);
        assert_eq!(entries[0].wire_timestamp(), 1_700_000_000_000.0);
        assert_eq!(entries[1].numeric_value(), 2.5);
        assert!(entries[1].wire_timestamp().is_nan());
        assert!(entries[2].numeric_value().is_nan());
    }

    #[test]
    fn test_decode_rejects_non_array() {
        assert!(matches!(decode_message(r#"{"value":1}"#), Err(TransportError::Decode(_))));
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("ws://127.0.0.1:4000/producer/", "producer-1"),
            "ws://127.0.0.1:4000/producer/producer_1"
        );
        assert_eq!(
            endpoint_url("ws://host/producer", "a-b-c"),
            "ws://host/producer/a_b-c"
        );
    }
}

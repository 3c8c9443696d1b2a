// Timeframe domain models - preset windows and absolute ranges
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeframeUnit {
    Seconds,
    Minutes,
    Hours,
}

impl TimeframeUnit {
    fn millis(self) -> i64 {
        match self {
            TimeframeUnit::Seconds => 1_000,
            TimeframeUnit::Minutes => 60_000,
            TimeframeUnit::Hours => 3_600_000,
        }
    }
}

/// A named rolling window, e.g. "30 seconds".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeframe {
    pub amount: u32,
    pub unit: TimeframeUnit,
    pub label: String,
}

impl Timeframe {
    pub fn new(amount: u32, unit: TimeframeUnit, label: impl Into<String>) -> Self {
        Self {
            amount,
            unit,
            label: label.into(),
        }
    }

    pub fn to_millis(&self) -> i64 {
        i64::from(self.amount) * self.unit.millis()
    }

    pub fn default_presets() -> Vec<Timeframe> {
        vec![
            Timeframe::new(10, TimeframeUnit::Seconds, "10 seconds"),
            Timeframe::new(30, TimeframeUnit::Seconds, "30 seconds"),
            Timeframe::new(1, TimeframeUnit::Minutes, "1 minute"),
            Timeframe::new(5, TimeframeUnit::Minutes, "5 minutes"),
            Timeframe::new(15, TimeframeUnit::Minutes, "15 minutes"),
            Timeframe::new(30, TimeframeUnit::Minutes, "30 minutes"),
        ]
    }
}

/// An absolute, inclusive range of epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRange {
    pub start: i64,
    pub end: i64,
}

impl CustomRange {
    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}

/// The window the view is currently derived with.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ViewWindow {
    #[default]
    Unbounded,
    Preset(Timeframe),
    Custom(CustomRange),
}

impl ViewWindow {
    /// A custom range wins over a preset; neither means no filtering.
    pub fn resolve(timeframe: Option<&Timeframe>, custom: Option<CustomRange>) -> Self {
        match (custom, timeframe) {
            (Some(range), _) => ViewWindow::Custom(range),
            (None, Some(preset)) => ViewWindow::Preset(preset.clone()),
            (None, None) => ViewWindow::Unbounded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_to_millis() {
        assert_eq!(Timeframe::new(30, TimeframeUnit::Seconds, "30 seconds").to_millis(), 30_000);
        assert_eq!(Timeframe::new(5, TimeframeUnit::Minutes, "5 minutes").to_millis(), 300_000);
        assert_eq!(Timeframe::new(1, TimeframeUnit::Hours, "1 hour").to_millis(), 3_600_000);
    }

    #[test]
    fn test_custom_range_wins() {
        let preset = Timeframe::new(10, TimeframeUnit::Seconds, "10 seconds");
        let range = CustomRange { start: 1, end: 2 };
        assert_eq!(ViewWindow::resolve(Some(&preset), Some(range)), ViewWindow::Custom(range));
        assert_eq!(ViewWindow::resolve(Some(&preset), None), ViewWindow::Preset(preset));
        assert_eq!(ViewWindow::resolve(None, None), ViewWindow::Unbounded);
    }

    #[test]
    fn test_unit_deserializes_lowercase() {
        let tf: Timeframe =
            serde_json::from_str(r#"{"amount":1,"unit":"minutes","label":"1 minute"}"#).unwrap();
        assert_eq!(tf.unit, TimeframeUnit::Minutes);
    }
}

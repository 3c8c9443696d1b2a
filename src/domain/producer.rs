// Producer domain model
use serde::{Deserialize, Serialize};

const PRODUCER_COLORS: [&str; 10] = [
    "#FF6384", "#36A2EB", "#FFCE56", "#4BC0C0", "#9966FF", "#FF9F40", "#8AC926", "#1982C4",
    "#6A4C93", "#F94144",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Producer {
    pub id: String,
    pub display_name: String,
    pub color_tag: String,
    #[serde(default)]
    pub active: bool,
}

impl Producer {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, color_tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            color_tag: color_tag.into(),
            active: false,
        }
    }

    /// The stock catalog: `producer-1` through `producer-10`.
    pub fn default_catalog() -> Vec<Producer> {
        PRODUCER_COLORS
            .iter()
            .enumerate()
            .map(|(i, color)| {
                Producer::new(
                    format!("producer-{}", i + 1),
                    format!("Producer {}", i + 1),
                    *color,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog() {
        let catalog = Producer::default_catalog();
        assert_eq!(catalog.len(), 10);
        assert_eq!(catalog[0].id, "producer-1");
        assert_eq!(catalog[9].display_name, "Producer 10");
        assert!(catalog.iter().all(|p| !p.active));
    }
}

// Telemetry pipeline - per-producer ingestion, bounded history and windowed views
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod polling_transport;
pub mod simulated_transport;
pub mod timestamp_distribution;
pub mod wire;

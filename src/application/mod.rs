// Application layer - ingestion pipeline stages and the service that owns them
pub mod ingestion_buffer;
pub mod merger;
pub mod pipeline_service;
pub mod producer_state;
pub mod status_registry;
pub mod throttle;
pub mod timeframe_filter;
pub mod transport;
pub mod validator;

// Domain layer - Pure data types shared by every other layer
pub mod metrics;
pub mod producer;
pub mod sample;
pub mod status;
pub mod timeframe;

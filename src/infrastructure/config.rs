use crate::application::pipeline_service::PipelineSettings;
use crate::application::timeframe_filter::ClusteredFeedPolicy;
use crate::domain::producer::Producer;
use crate::domain::timeframe::{Timeframe, TimeframeUnit};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub transport: TransportConfig,
    pub simulation: SimulationConfig,
    pub data: DataConfig,
    pub view: ViewConfig,
    pub server: ServerConfig,
    pub producers: Option<Vec<Producer>>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    Simulated,
    Polling,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TransportConfig {
    pub mode: TransportMode,
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub connect_timeout_ms: u64,
    pub distribution: DistributionConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::Simulated,
            base_url: "ws://127.0.0.1:4000/producer".to_string(),
            poll_interval_ms: 500,
            connect_timeout_ms: 2000,
            distribution: DistributionConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistributionMode {
    #[default]
    Redistribute,
    Passthrough,
}

/// How polled batches get their timestamps.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DistributionConfig {
    pub mode: DistributionMode,
    pub initial_span_ms: u64,
    pub skew_exponent: f64,
    pub recent_span_ms: u64,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            mode: DistributionMode::Redistribute,
            initial_span_ms: 20 * 60 * 1000,
            skew_exponent: 2.0,
            recent_span_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulationConfig {
    pub backfill_points: usize,
    pub backfill_span_ms: u64,
    pub emit_interval_ms: u64,
    pub min_batch: usize,
    pub max_batch: usize,
    pub value_min: f64,
    pub value_max: f64,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            backfill_points: 300,
            backfill_span_ms: 5 * 60 * 1000,
            emit_interval_ms: 500,
            min_batch: 5,
            max_batch: 10,
            value_min: 0.0,
            value_max: 20.0,
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    pub max_data_points: usize,
    pub batch_cap: usize,
    pub merge_interval_ms: u64,
    pub default_timeframe: Option<Timeframe>,
    pub available_timeframes: Vec<Timeframe>,
    pub clustered_feed: ClusteredFeedPolicy,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            max_data_points: 10_000,
            batch_cap: 1000,
            merge_interval_ms: 250,
            default_timeframe: Some(Timeframe::new(30, TimeframeUnit::Seconds, "30 seconds")),
            available_timeframes: Timeframe::default_presets(),
            clustered_feed: ClusteredFeedPolicy::Disabled,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ViewConfig {
    pub throttle_interval_ms: u64,
    pub filter_debounce_ms: u64,
    pub fallback_points: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            throttle_interval_ms: 100,
            filter_debounce_ms: 50,
            fallback_points: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn catalog(&self) -> Vec<Producer> {
        self.producers.clone().unwrap_or_else(Producer::default_catalog)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            max_data_points: self.data.max_data_points,
            batch_cap: self.data.batch_cap,
            merge_interval: Duration::from_millis(self.data.merge_interval_ms),
            throttle_interval: Duration::from_millis(self.view.throttle_interval_ms),
            filter_debounce: Duration::from_millis(self.view.filter_debounce_ms),
            fallback_points: self.view.fallback_points,
            clustered_feed: self.data.clustered_feed.clone(),
            default_timeframe: self.data.default_timeframe.clone(),
            available_timeframes: self.data.available_timeframes.clone(),
            ..PipelineSettings::default()
        }
    }
}

/// Load `config/pipeline.*` (optional) overlaid with `PIPELINE__*` env vars.
pub fn load_pipeline_config() -> anyhow::Result<PipelineConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/pipeline").required(false))
        .add_source(config::Environment::with_prefix("PIPELINE").separator("__"))
        .build()?;

    let config: PipelineConfig = settings.try_deserialize()?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &PipelineConfig) -> anyhow::Result<()> {
    anyhow::ensure!(config.data.merge_interval_ms > 0, "data.merge_interval_ms must be positive");
    anyhow::ensure!(config.transport.poll_interval_ms > 0, "transport.poll_interval_ms must be positive");
    anyhow::ensure!(
        config.transport.connect_timeout_ms > 0,
        "transport.connect_timeout_ms must be positive"
    );
    anyhow::ensure!(
        config.simulation.emit_interval_ms > 0,
        "simulation.emit_interval_ms must be positive"
    );
    anyhow::ensure!(config.data.max_data_points > 0, "data.max_data_points must be positive");
    anyhow::ensure!(config.data.batch_cap > 0, "data.batch_cap must be positive");
    anyhow::ensure!(
        config.simulation.min_batch <= config.simulation.max_batch,
        "simulation.min_batch must not exceed simulation.max_batch"
    );
    anyhow::ensure!(
        config.simulation.value_min <= config.simulation.value_max,
        "simulation.value_min must not exceed simulation.value_max"
    );
    Ok(())
}

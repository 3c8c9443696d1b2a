// Application state for HTTP handlers
use crate::application::pipeline_service::TelemetryPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: TelemetryPipeline,
}

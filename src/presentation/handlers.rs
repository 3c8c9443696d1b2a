// HTTP request handlers
use crate::application::merger::MergeDiagnostics;
use crate::application::pipeline_service::{PipelineError, SeriesSnapshot};
use crate::domain::metrics::DataMetrics;
use crate::domain::producer::Producer;
use crate::domain::sample::Sample;
use crate::domain::status::ConnectionStatus;
use crate::domain::timeframe::{CustomRange, Timeframe};
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

/// Maps pipeline failures onto HTTP status codes.
pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            PipelineError::UnknownProducer(_) => StatusCode::NOT_FOUND,
            PipelineError::InvalidMaxDataPoints => StatusCode::BAD_REQUEST,
            PipelineError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status.is_server_error() {
            tracing::error!("request failed: {}", self.0);
        }
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

#[derive(Deserialize)]
pub struct PauseRequest {
    pub paused: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaxDataPointsRequest {
    pub max_data_points: usize,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub producers: HashMap<String, ConnectionStatus>,
    pub aggregate: Option<ConnectionStatus>,
    pub paused: bool,
}

#[derive(Serialize)]
pub struct TimeframesResponse {
    pub available: Vec<Timeframe>,
    pub default: Option<Timeframe>,
    pub selected: Option<Timeframe>,
    pub custom_range: Option<CustomRange>,
}

fn ensure_known(state: &AppState, producer_id: &str) -> Result<(), ApiError> {
    if state.pipeline.producers().iter().any(|p| p.id == producer_id) {
        Ok(())
    } else {
        Err(PipelineError::UnknownProducer(producer_id.to_string()).into())
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_producers(State(state): State<Arc<AppState>>) -> Json<Vec<Producer>> {
    Json(state.pipeline.producers())
}

pub async fn set_producer_active(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<ActiveRequest>,
) -> Result<StatusCode, ApiError> {
    state.pipeline.set_active(&id, request.active).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn producer_view(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Sample>>, ApiError> {
    ensure_known(&state, &id)?;
    Ok(Json(state.pipeline.view(&id)))
}

pub async fn producer_history(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Sample>>, ApiError> {
    ensure_known(&state, &id)?;
    Ok(Json(state.pipeline.history(&id)))
}

pub async fn producer_metrics(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<DataMetrics>, ApiError> {
    ensure_known(&state, &id)?;
    Ok(Json(state.pipeline.metrics(&id)))
}

pub async fn connection_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        producers: state.pipeline.status(),
        aggregate: state.pipeline.aggregate_status(),
        paused: state.pipeline.is_paused(),
    })
}

pub async fn set_paused(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PauseRequest>,
) -> StatusCode {
    state.pipeline.set_paused(request.paused);
    StatusCode::NO_CONTENT
}

/// A `null` body clears the preset.
pub async fn set_timeframe(
    State(state): State<Arc<AppState>>,
    Json(timeframe): Json<Option<Timeframe>>,
) -> StatusCode {
    state.pipeline.set_timeframe(timeframe);
    StatusCode::NO_CONTENT
}

pub async fn set_custom_range(
    State(state): State<Arc<AppState>>,
    Json(range): Json<Option<CustomRange>>,
) -> StatusCode {
    state.pipeline.set_custom_range(range);
    StatusCode::NO_CONTENT
}

pub async fn set_max_data_points(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MaxDataPointsRequest>,
) -> Result<StatusCode, ApiError> {
    state.pipeline.set_max_data_points(request.max_data_points).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_data(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.pipeline.clear_data().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_timeframes(State(state): State<Arc<AppState>>) -> Json<TimeframesResponse> {
    let selection = state.pipeline.selection();
    Json(TimeframesResponse {
        available: state.pipeline.available_timeframes().to_vec(),
        default: state.pipeline.default_timeframe().cloned(),
        selected: selection.timeframe,
        custom_range: selection.custom_range,
    })
}

pub async fn merge_diagnostics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MergeDiagnostics>, ApiError> {
    Ok(Json(state.pipeline.merge_diagnostics().await?))
}

fn render_views(views: &SeriesSnapshot) -> serde_json::Result<String> {
    let borrowed: HashMap<&str, &[Sample]> = views
        .iter()
        .map(|(id, series)| (id.as_str(), series.as_slice()))
        .collect();
    serde_json::to_string(&borrowed)
}

/// Stream one `views` event per recomputed view map.
pub async fn stream_views(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut views = state.pipeline.subscribe_views();

    let stream = async_stream::stream! {
        while views.changed().await.is_ok() {
            let snapshot = views.borrow_and_update().clone();
            match render_views(&snapshot) {
                Ok(json) => yield Ok(Event::default().event("views").data(json)),
                Err(e) => tracing::error!("failed to encode views: {}", e),
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

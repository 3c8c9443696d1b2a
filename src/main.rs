// Main entry point - Dependency injection and server setup
use std::{net::SocketAddr, sync::Arc};

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use telemetry_pipeline::application::pipeline_service::TelemetryPipeline;
use telemetry_pipeline::application::status_registry::{StatusRegistry, SubscriberError};
use telemetry_pipeline::application::transport::{PauseFlag, Transport};
use telemetry_pipeline::domain::status::ConnectionStatus;
use telemetry_pipeline::infrastructure::config::{load_pipeline_config, TransportMode};
use telemetry_pipeline::infrastructure::polling_transport::PollingTransport;
use telemetry_pipeline::infrastructure::simulated_transport::SimulatedTransport;
use telemetry_pipeline::presentation::app_state::AppState;
use telemetry_pipeline::presentation::handlers::{
    clear_data, connection_status, health_check, list_producers, list_timeframes,
    merge_diagnostics, producer_history, producer_metrics, producer_view, set_custom_range,
    set_max_data_points, set_paused, set_producer_active, set_timeframe, stream_views,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_pipeline_config()?;

    // Create transport (infrastructure layer)
    let status = Arc::new(StatusRegistry::new());
    let paused = PauseFlag::default();
    let transport: Arc<dyn Transport> = match config.transport.mode {
        TransportMode::Simulated => Arc::new(SimulatedTransport::new(
            config.simulation.clone(),
            status.clone(),
            paused.clone(),
        )),
        TransportMode::Polling => Arc::new(PollingTransport::new(
            &config.transport,
            status.clone(),
            paused.clone(),
        )),
    };

    // Create pipeline (application layer)
    let catalog = config.catalog();
    let pipeline = TelemetryPipeline::start(
        config.pipeline_settings(),
        catalog.clone(),
        transport,
        status,
        paused,
    );
    pipeline.status_registry().register_status_callback(Arc::new(
        |status: ConnectionStatus, producer_id: Option<&str>| -> Result<(), SubscriberError> {
            match producer_id {
                Some(id) => tracing::info!(producer_id = %id, ?status, "connection status changed"),
                None => tracing::info!(?status, "aggregate connection status changed"),
            }
            Ok(())
        },
    ));

    for producer in catalog.iter().filter(|p| p.active) {
        pipeline.set_active(&producer.id, true).await?;
    }

    // Create application state
    let state = Arc::new(AppState {
        pipeline: pipeline.clone(),
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/producers", get(list_producers))
        .route("/producers/:id/active", put(set_producer_active))
        .route("/producers/:id/view", get(producer_view))
        .route("/producers/:id/history", get(producer_history))
        .route("/producers/:id/metrics", get(producer_metrics))
        .route("/status", get(connection_status))
        .route("/pause", put(set_paused))
        .route("/timeframe", put(set_timeframe))
        .route("/custom-range", put(set_custom_range))
        .route("/max-data-points", put(set_max_data_points))
        .route("/clear", post(clear_data))
        .route("/timeframes", get(list_timeframes))
        .route("/diagnostics", get(merge_diagnostics))
        .route("/views/stream", get(stream_views))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config.server.bind_addr.parse()?;
    tracing::info!("Starting telemetry-pipeline service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pipeline.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

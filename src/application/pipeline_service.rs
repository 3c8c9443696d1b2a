// Pipeline service - single owner of ingestion, merge, throttle and view state
use crate::application::merger::{MergeDiagnostics, Merger, DEFAULT_MAX_DATA_POINTS};
use crate::application::producer_state::ProducerArena;
use crate::application::status_registry::StatusRegistry;
use crate::application::throttle::{Debounce, Offer, Throttle};
use crate::application::timeframe_filter::{filter_view, ClusteredFeedPolicy, DEFAULT_FALLBACK_POINTS};
use crate::application::transport::{BatchSink, PauseFlag, Transport, MIN_TICK};
use crate::application::ingestion_buffer::DEFAULT_BATCH_CAP;
use crate::domain::metrics::{calculate_metrics, DataMetrics};
use crate::domain::producer::Producer;
use crate::domain::sample::{RawBatch, Sample};
use crate::domain::status::ConnectionStatus;
use crate::domain::timeframe::{CustomRange, Timeframe, ViewWindow};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Per-producer series, shared immutably with readers.
pub type SeriesSnapshot = Arc<HashMap<String, Arc<Vec<Sample>>>>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown producer: {0}")]
    UnknownProducer(String),
    #[error("max data points must be positive")]
    InvalidMaxDataPoints,
    #[error("pipeline is stopped")]
    Stopped,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_data_points: usize,
    pub batch_cap: usize,
    pub merge_interval: Duration,
    pub throttle_interval: Duration,
    pub filter_debounce: Duration,
    pub fallback_points: usize,
    pub clustered_feed: ClusteredFeedPolicy,
    pub default_timeframe: Option<Timeframe>,
    pub available_timeframes: Vec<Timeframe>,
    pub inbox_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_data_points: DEFAULT_MAX_DATA_POINTS,
            batch_cap: DEFAULT_BATCH_CAP,
            merge_interval: Duration::from_millis(250),
            throttle_interval: Duration::from_millis(100),
            filter_debounce: Duration::from_millis(50),
            fallback_points: DEFAULT_FALLBACK_POINTS,
            clustered_feed: ClusteredFeedPolicy::Disabled,
            default_timeframe: None,
            available_timeframes: Timeframe::default_presets(),
            inbox_capacity: 1024,
        }
    }
}

/// The timeframe and custom range a consumer has asked for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewSelection {
    pub timeframe: Option<Timeframe>,
    pub custom_range: Option<CustomRange>,
}

impl ViewSelection {
    pub fn window(&self) -> ViewWindow {
        ViewWindow::resolve(self.timeframe.as_ref(), self.custom_range)
    }
}

enum Command {
    Activate(String, oneshot::Sender<u64>),
    Deactivate(String, oneshot::Sender<()>),
    SetMaxDataPoints(usize),
    Clear,
    Diagnostics(oneshot::Sender<MergeDiagnostics>),
    Shutdown,
}

#[derive(Clone)]
pub struct TelemetryPipeline {
    commands: mpsc::Sender<Command>,
    inbox: mpsc::Sender<RawBatch>,
    transport: Arc<dyn Transport>,
    status: Arc<StatusRegistry>,
    paused: PauseFlag,
    selection: Arc<watch::Sender<ViewSelection>>,
    history_rx: watch::Receiver<SeriesSnapshot>,
    view_rx: watch::Receiver<SeriesSnapshot>,
    catalog: Arc<RwLock<Vec<Producer>>>,
    settings: Arc<PipelineSettings>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl TelemetryPipeline {
    /// Spawn the pipeline actor. Must be called inside a tokio runtime.
    pub fn start(
        settings: PipelineSettings,
        catalog: Vec<Producer>,
        transport: Arc<dyn Transport>,
        status: Arc<StatusRegistry>,
        paused: PauseFlag,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(64);
        let (inbox, inbox_rx) = mpsc::channel(settings.inbox_capacity.max(1));
        let (selection, selection_rx) = watch::channel(ViewSelection::default());
        let (history_tx, history_rx) = watch::channel(SeriesSnapshot::default());
        let (view_tx, view_rx) = watch::channel(SeriesSnapshot::default());

        let catalog = catalog
            .into_iter()
            .map(|mut producer| {
                producer.active = false;
                producer
            })
            .collect();

        let actor = PipelineActor {
            arena: ProducerArena::new(),
            merger: Merger::new(settings.max_data_points),
            throttle: Throttle::new(settings.throttle_interval),
            debounce: Debounce::new(settings.filter_debounce),
            throttled: SeriesSnapshot::default(),
            selection_rx,
            paused: paused.clone(),
            history_tx,
            view_tx,
            batch_cap: settings.batch_cap,
            fallback_points: settings.fallback_points,
            clustered_feed: settings.clustered_feed.clone(),
            merge_interval: settings.merge_interval,
        };
        let task = tokio::spawn(actor.run(command_rx, inbox_rx));

        tracing::info!(
            max_data_points = settings.max_data_points,
            batch_cap = settings.batch_cap,
            "telemetry pipeline started"
        );

        Self {
            commands,
            inbox,
            transport,
            status,
            paused,
            selection: Arc::new(selection),
            history_rx,
            view_rx,
            catalog: Arc::new(RwLock::new(catalog)),
            settings: Arc::new(settings),
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    /// Activate or deactivate a producer. Activation creates its state record
    /// and connects its transport; deactivation tears both down.
    pub async fn set_active(&self, producer_id: &str, active: bool) -> Result<(), PipelineError> {
        let currently_active = self
            .producers()
            .into_iter()
            .find(|p| p.id == producer_id)
            .map(|p| p.active)
            .ok_or_else(|| PipelineError::UnknownProducer(producer_id.to_string()))?;

        if currently_active == active {
            return Ok(());
        }

        if active {
            let generation = self
                .request(|reply| Command::Activate(producer_id.to_string(), reply))
                .await?;
            self.transport
                .connect(
                    producer_id,
                    BatchSink::with_generation(self.inbox.clone(), generation),
                )
                .await;
        } else {
            self.transport.disconnect(producer_id).await;
            self.request(|reply| Command::Deactivate(producer_id.to_string(), reply))
                .await?;
        }

        self.mark_active(producer_id, active);
        tracing::info!(producer_id = %producer_id, active, "producer toggled");
        Ok(())
    }

    pub fn set_paused(&self, paused: bool) {
        self.transport.set_paused(paused);
        tracing::info!(paused, "ingestion pause toggled");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.is_paused()
    }

    pub fn set_timeframe(&self, timeframe: Option<Timeframe>) {
        self.selection.send_modify(|selection| selection.timeframe = timeframe);
    }

    pub fn set_custom_range(&self, range: Option<CustomRange>) {
        self.selection.send_modify(|selection| selection.custom_range = range);
    }

    pub fn selection(&self) -> ViewSelection {
        self.selection.borrow().clone()
    }

    pub async fn set_max_data_points(&self, max_data_points: usize) -> Result<(), PipelineError> {
        if max_data_points == 0 {
            return Err(PipelineError::InvalidMaxDataPoints);
        }
        self.send(Command::SetMaxDataPoints(max_data_points)).await
    }

    /// Drop every history, buffer and watermark; producers stay connected.
    pub async fn clear_data(&self) -> Result<(), PipelineError> {
        self.send(Command::Clear).await
    }

    pub fn view(&self, producer_id: &str) -> Vec<Sample> {
        series_of(&self.view_rx, producer_id)
    }

    pub fn history(&self, producer_id: &str) -> Vec<Sample> {
        series_of(&self.history_rx, producer_id)
    }

    pub fn metrics(&self, producer_id: &str) -> DataMetrics {
        let views = self.view_rx.borrow();
        views
            .get(producer_id)
            .map(|series| calculate_metrics(series))
            .unwrap_or_default()
    }

    pub fn status(&self) -> HashMap<String, ConnectionStatus> {
        self.status.get_connection_status()
    }

    pub fn aggregate_status(&self) -> Option<ConnectionStatus> {
        self.status.aggregate_status()
    }

    pub fn status_registry(&self) -> &Arc<StatusRegistry> {
        &self.status
    }

    pub fn producers(&self) -> Vec<Producer> {
        self.catalog.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn available_timeframes(&self) -> &[Timeframe] {
        &self.settings.available_timeframes
    }

    pub fn default_timeframe(&self) -> Option<&Timeframe> {
        self.settings.default_timeframe.as_ref()
    }

    /// Observe every recomputed view map.
    pub fn subscribe_views(&self) -> watch::Receiver<SeriesSnapshot> {
        self.view_rx.clone()
    }

    pub async fn merge_diagnostics(&self) -> Result<MergeDiagnostics, PipelineError> {
        self.request(Command::Diagnostics).await
    }

    /// Disconnect every producer, then stop the actor and its timers.
    pub async fn shutdown(&self) {
        self.transport.disconnect_all().await;
        let _ = self.commands.send(Command::Shutdown).await;

        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            let _ = task.await;
        }
        for producer in self.catalog.write().unwrap_or_else(|e| e.into_inner()).iter_mut() {
            producer.active = false;
        }
        tracing::info!("telemetry pipeline stopped");
    }

    fn mark_active(&self, producer_id: &str, active: bool) {
        let mut catalog = self.catalog.write().unwrap_or_else(|e| e.into_inner());
        if let Some(producer) = catalog.iter_mut().find(|p| p.id == producer_id) {
            producer.active = active;
        }
    }

    async fn send(&self, command: Command) -> Result<(), PipelineError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| PipelineError::Stopped)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, PipelineError> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response.await.map_err(|_| PipelineError::Stopped)
    }
}

fn series_of(rx: &watch::Receiver<SeriesSnapshot>, producer_id: &str) -> Vec<Sample> {
    rx.borrow()
        .get(producer_id)
        .map(|series| series.as_ref().clone())
        .unwrap_or_default()
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Owns all mutable pipeline state. Every event is handled to completion
/// before the next is polled.
struct PipelineActor {
    arena: ProducerArena,
    merger: Merger,
    throttle: Throttle<SeriesSnapshot>,
    debounce: Debounce,
    throttled: SeriesSnapshot,
    selection_rx: watch::Receiver<ViewSelection>,
    paused: PauseFlag,
    history_tx: watch::Sender<SeriesSnapshot>,
    view_tx: watch::Sender<SeriesSnapshot>,
    batch_cap: usize,
    fallback_points: usize,
    clustered_feed: ClusteredFeedPolicy,
    merge_interval: Duration,
}

impl PipelineActor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, mut inbox: mpsc::Receiver<RawBatch>) {
        let mut merge_tick = tokio::time::interval(self.merge_interval.max(MIN_TICK));
        merge_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut selection_open = true;

        loop {
            let throttle_deadline = self.throttle.deadline();
            let debounce_deadline = self.debounce.deadline();

            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
                changed = self.selection_rx.changed(), if selection_open => {
                    if changed.is_ok() {
                        self.debounce.trigger(Instant::now());
                    } else {
                        selection_open = false;
                    }
                }
                Some(batch) = inbox.recv() => self.on_batch(batch),
                _ = merge_tick.tick() => self.on_merge_tick(),
                _ = sleep_until_opt(throttle_deadline) => {
                    if let Some(snapshot) = self.throttle.poll_due(Instant::now()) {
                        self.on_throttled(snapshot);
                    }
                }
                _ = sleep_until_opt(debounce_deadline) => {
                    if self.debounce.poll_due(Instant::now()) {
                        self.recompute_views();
                    }
                }
            }
        }

        self.throttle.cancel();
        self.debounce.cancel();
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Activate(producer_id, reply) => {
                if self.arena.activate(&producer_id) {
                    self.publish_history();
                }
                let _ = reply.send(self.arena.generation(&producer_id).unwrap_or_default());
            }
            Command::Deactivate(producer_id, reply) => {
                if self.arena.deactivate(&producer_id).is_some() {
                    self.reset_views();
                }
                let _ = reply.send(());
            }
            Command::SetMaxDataPoints(max_data_points) => {
                self.merger.set_max_data_points(max_data_points);
                if self.merger.enforce_cap(&mut self.arena) {
                    self.publish_history();
                }
            }
            Command::Clear => {
                self.arena.clear();
                self.reset_views();
            }
            Command::Diagnostics(reply) => {
                let _ = reply.send(self.merger.timings().diagnostics());
            }
            Command::Shutdown => {}
        }
    }

    fn on_batch(&mut self, batch: RawBatch) {
        if self.paused.is_paused() {
            tracing::trace!(producer_id = %batch.producer_id, "paused, discarding batch");
            return;
        }
        if self.arena.generation(&batch.producer_id) != Some(batch.generation) {
            tracing::debug!(producer_id = %batch.producer_id, "discarding batch from an earlier activation");
            return;
        }
        self.arena.ingest(&batch.producer_id, &batch.samples, self.batch_cap);
    }

    fn on_merge_tick(&mut self) {
        if self.merger.merge_pass(&mut self.arena) {
            self.publish_history();
        }
    }

    /// Publish the histories and offer them to the throttle.
    fn publish_history(&mut self) -> SeriesSnapshot {
        let snapshot: SeriesSnapshot = Arc::new(self.arena.histories());
        self.history_tx.send_replace(snapshot.clone());
        if let Offer::Emit(snapshot) = self.throttle.offer(snapshot.clone(), Instant::now()) {
            self.on_throttled(snapshot);
        }
        snapshot
    }

    fn on_throttled(&mut self, snapshot: SeriesSnapshot) {
        self.throttled = snapshot;
        self.debounce.trigger(Instant::now());
    }

    /// Make removals visible immediately instead of after throttle and debounce.
    fn reset_views(&mut self) {
        let snapshot = self.publish_history();
        self.throttle.cancel();
        self.debounce.cancel();
        self.throttled = snapshot;
        self.recompute_views();
    }

    fn recompute_views(&mut self) {
        let window = self.selection_rx.borrow_and_update().window();
        let views: HashMap<String, Arc<Vec<Sample>>> = self
            .throttled
            .iter()
            .map(|(producer_id, series)| {
                let view = match window {
                    ViewWindow::Unbounded => series.clone(),
                    _ => Arc::new(filter_view(
                        series,
                        &window,
                        &self.clustered_feed,
                        self.fallback_points,
                    )),
                };
                (producer_id.clone(), view)
            })
            .collect();
        self.view_tx.send_replace(Arc::new(views));
    }
}

// Polling transport - opens one short-lived websocket per tick and reads a single message
use crate::application::status_registry::StatusRegistry;
use crate::application::transport::{
    BatchSink, PauseFlag, Transport, TransportError, WorkerSet, MIN_TICK,
};
use crate::domain::sample::RawBatch;
use crate::domain::status::ConnectionStatus;
use crate::infrastructure::config::TransportConfig;
use crate::infrastructure::timestamp_distribution::TimestampDistribution;
use crate::infrastructure::wire::{decode_message, endpoint_url};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{timeout, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const MAX_DISTRIBUTION_NOTICES: u32 = 3;

/// State shared by every polling worker.
struct PollContext {
    base_url: String,
    poll_interval: Duration,
    connect_timeout: Duration,
    distribution: TimestampDistribution,
    paused: PauseFlag,
    status: Arc<StatusRegistry>,
    initial_loaded: Mutex<HashSet<String>>,
    notices: Mutex<HashMap<String, u32>>,
}

impl PollContext {
    fn mark_live(&self, producer_id: &str) {
        let live = self
            .status
            .status_of(producer_id)
            .map(ConnectionStatus::is_live)
            .unwrap_or(false);
        if !live {
            let status = if self.paused.is_paused() {
                ConnectionStatus::Paused
            } else {
                ConnectionStatus::Connected
            };
            self.status.notify(status, Some(producer_id));
        }
    }

    fn mark_error(&self, producer_id: &str, error: &TransportError) {
        if self.status.status_of(producer_id) == Some(ConnectionStatus::Error) {
            tracing::debug!(producer_id = %producer_id, "poll failed again: {}", error);
            return;
        }
        tracing::error!(producer_id = %producer_id, "poll failed: {}", error);
        self.status.notify(ConnectionStatus::Error, Some(producer_id));
    }

    /// True exactly once per producer for the lifetime of the transport.
    fn take_first_batch(&self, producer_id: &str) -> bool {
        self.initial_loaded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(producer_id.to_string())
    }

    fn note_distribution(&self, producer_id: &str) {
        if self.distribution == TimestampDistribution::Passthrough {
            return;
        }
        let mut notices = self.notices.lock().unwrap_or_else(|e| e.into_inner());
        let count = notices.entry(producer_id.to_string()).or_insert(0);
        if *count < MAX_DISTRIBUTION_NOTICES {
            *count += 1;
            tracing::info!(producer_id = %producer_id, "applying artificial timestamp distribution");
        }
    }

    /// Open a connection, wait for one text message, close it.
    async fn fetch_once(&self, producer_id: &str, url: &str) -> Result<String, TransportError> {
        let (mut socket, _) = timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?
            .map_err(|e| TransportError::Open {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        self.mark_live(producer_id);

        let received = timeout(self.connect_timeout, async {
            while let Some(frame) = socket.next().await {
                match frame {
                    Ok(Message::Text(text)) => return Ok(text),
                    Ok(Message::Binary(bytes)) => {
                        return String::from_utf8(bytes)
                            .map_err(|e| TransportError::Decode(e.to_string()));
                    }
                    Ok(Message::Close(_)) => return Err(TransportError::Closed),
                    Ok(_) => continue,
                    Err(e) => {
                        return Err(TransportError::Open {
                            url: url.to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
            Err(TransportError::Closed)
        })
        .await
        .map_err(|_| TransportError::Timeout(self.connect_timeout))
        .and_then(|result| result);

        let _ = socket.close(None).await;
        received
    }

    async fn poll_once(&self, producer_id: &str, url: &str, sink: &BatchSink) {
        let text = match self.fetch_once(producer_id, url).await {
            Ok(text) => text,
            Err(error) => {
                self.mark_error(producer_id, &error);
                return;
            }
        };

        if self.paused.is_paused() {
            return;
        }

        let entries = match decode_message(&text) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::error!(producer_id = %producer_id, "error processing message: {}", error);
                return;
            }
        };
        if entries.is_empty() {
            return;
        }

        self.note_distribution(producer_id);
        let first_batch = self.take_first_batch(producer_id);
        let receive_ms = chrono::Utc::now().timestamp_millis() as f64;
        let samples = self.distribution.assign(&entries, first_batch, receive_ms);
        if first_batch {
            tracing::info!(producer_id = %producer_id, points = samples.len(), "initial load complete");
        }

        sink.deliver(RawBatch::new(producer_id, samples));
    }
}

async fn poll_loop(context: Arc<PollContext>, producer_id: String, sink: BatchSink) {
    let url = endpoint_url(&context.base_url, &producer_id);
    let mut ticker = tokio::time::interval(context.poll_interval.max(MIN_TICK));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        context.poll_once(&producer_id, &url, &sink).await;
    }
}

pub struct PollingTransport {
    workers: WorkerSet,
    context: Arc<PollContext>,
}

impl PollingTransport {
    pub fn new(settings: &TransportConfig, status: Arc<StatusRegistry>, paused: PauseFlag) -> Self {
        let context = PollContext {
            base_url: settings.base_url.clone(),
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            distribution: TimestampDistribution::from(&settings.distribution),
            paused: paused.clone(),
            status: status.clone(),
            initial_loaded: Mutex::new(HashSet::new()),
            notices: Mutex::new(HashMap::new()),
        };
        tracing::info!(base_url = %settings.base_url, "polling transport initialized");

        Self {
            workers: WorkerSet::new(status, paused),
            context: Arc::new(context),
        }
    }
}

#[async_trait]
impl Transport for PollingTransport {
    async fn connect(&self, producer_id: &str, sink: BatchSink) {
        if self.workers.contains(producer_id) {
            return;
        }
        // Reported before the worker starts so its first poll result wins.
        self.workers
            .status()
            .notify(ConnectionStatus::Connecting, Some(producer_id));
        self.workers.spawn_if_absent(producer_id, || {
            poll_loop(self.context.clone(), producer_id.to_string(), sink)
        });
    }

    async fn disconnect(&self, producer_id: &str) {
        self.workers.stop(producer_id).await;
    }

    async fn disconnect_all(&self) {
        self.workers.stop_all().await;
    }

    fn is_connected(&self, producer_id: &str) -> bool {
        self.workers.is_connected(producer_id)
    }

    fn set_paused(&self, paused: bool) {
        self.workers.set_paused(paused);
    }
}

// Transport contract - per-producer data sources feeding the pipeline
use crate::application::status_registry::StatusRegistry;
use crate::domain::sample::RawBatch;
use crate::domain::status::ConnectionStatus;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open connection to {url}: {reason}")]
    Open { url: String, reason: String },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection closed before a message arrived")]
    Closed,
    #[error("could not decode message: {0}")]
    Decode(String),
}

/// Shortest period any periodic worker ticks at; `interval` rejects zero.
pub const MIN_TICK: Duration = Duration::from_millis(1);

/// Process-wide pause switch shared by transports and the pipeline.
#[derive(Debug, Clone, Default)]
pub struct PauseFlag(Arc<AtomicBool>);

impl PauseFlag {
    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, paused: bool) {
        self.0.store(paused, Ordering::SeqCst);
    }
}

/// Non-blocking hand-off from a transport worker into the pipeline.
#[derive(Debug, Clone)]
pub struct BatchSink {
    tx: mpsc::Sender<RawBatch>,
    generation: u64,
}

impl BatchSink {
    pub fn new(tx: mpsc::Sender<RawBatch>) -> Self {
        Self { tx, generation: 0 }
    }

    /// Sink for one activation of a producer. Every delivered batch carries
    /// `generation` so the pipeline can discard leftovers from earlier ones.
    pub fn with_generation(tx: mpsc::Sender<RawBatch>, generation: u64) -> Self {
        Self { tx, generation }
    }

    /// Returns false if the batch was not handed off.
    pub fn deliver(&self, mut batch: RawBatch) -> bool {
        if batch.samples.is_empty() {
            return false;
        }
        batch.generation = self.generation;
        match self.tx.try_send(batch) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(batch)) => {
                tracing::warn!(
                    producer_id = %batch.producer_id,
                    dropped = batch.samples.len(),
                    "pipeline inbox full, dropping batch"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Start delivering batches for `producer_id` into `sink`. Connecting an
    /// already connected producer is a no-op.
    async fn connect(&self, producer_id: &str, sink: BatchSink);

    /// Tear down the producer's worker and report `Disconnected`.
    async fn disconnect(&self, producer_id: &str);

    /// Drain every worker and report an aggregate `Disconnected`.
    async fn disconnect_all(&self);

    fn is_connected(&self, producer_id: &str) -> bool;

    /// Stop or resume forwarding without tearing anything down.
    fn set_paused(&self, paused: bool);
}

/// Per-producer worker bookkeeping shared by the transport implementations.
pub struct WorkerSet {
    workers: Mutex<HashMap<String, JoinHandle<()>>>,
    paused: PauseFlag,
    status: Arc<StatusRegistry>,
}

impl WorkerSet {
    pub fn new(status: Arc<StatusRegistry>, paused: PauseFlag) -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
            paused,
            status,
        }
    }

    pub fn paused(&self) -> &PauseFlag {
        &self.paused
    }

    pub fn status(&self) -> &Arc<StatusRegistry> {
        &self.status
    }

    /// Spawn the worker built by `make` unless one is already running.
    /// `make` runs under the worker lock, so it must not block.
    pub fn spawn_if_absent<F>(&self, producer_id: &str, make: impl FnOnce() -> F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        if workers.contains_key(producer_id) {
            return false;
        }
        let handle = tokio::spawn(make());
        workers.insert(producer_id.to_string(), handle);
        true
    }

    pub fn contains(&self, producer_id: &str) -> bool {
        self.workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(producer_id)
    }

    pub async fn stop(&self, producer_id: &str) {
        let handle = self
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(producer_id);
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        tracing::info!(producer_id = %producer_id, "disconnected from producer");
        self.status.notify(ConnectionStatus::Disconnected, Some(producer_id));
    }

    pub async fn stop_all(&self) {
        let ids: Vec<String> = self
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        for id in ids {
            self.stop(&id).await;
        }
        self.status.forget_all();
        self.status.notify(ConnectionStatus::Disconnected, None);
    }

    pub fn is_connected(&self, producer_id: &str) -> bool {
        self.status
            .status_of(producer_id)
            .map(ConnectionStatus::is_live)
            .unwrap_or(false)
    }

    /// Flip the pause flag and move every live producer to the matching status.
    pub fn set_paused(&self, paused: bool) {
        self.paused.set(paused);
        let status = if paused {
            ConnectionStatus::Paused
        } else {
            ConnectionStatus::Connected
        };

        for (producer_id, current) in self.status.get_connection_status() {
            if current.is_live() {
                self.status.notify(status, Some(&producer_id));
            }
        }
        self.status.notify(status, None);
    }

    /// Connected or paused, whichever matches the current flag.
    pub fn live_status(&self) -> ConnectionStatus {
        if self.paused.is_paused() {
            ConnectionStatus::Paused
        } else {
            ConnectionStatus::Connected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sample::RawSample;

    #[tokio::test]
    async fn test_spawn_if_absent_is_idempotent() {
        let workers = WorkerSet::new(Arc::new(StatusRegistry::new()), PauseFlag::default());
        assert!(workers.spawn_if_absent("p1", || std::future::pending::<()>()));
        assert!(!workers.spawn_if_absent("p1", || std::future::pending::<()>()));
        assert!(workers.contains("p1"));

        workers.stop_all().await;
        assert!(!workers.contains("p1"));
        assert_eq!(workers.status().aggregate_status(), Some(ConnectionStatus::Disconnected));
    }

    #[tokio::test]
    async fn test_pause_updates_live_producers_only() {
        let status = Arc::new(StatusRegistry::new());
        let workers = WorkerSet::new(status.clone(), PauseFlag::default());
        status.notify(ConnectionStatus::Connected, Some("p1"));
        status.notify(ConnectionStatus::Error, Some("p2"));

        workers.set_paused(true);
        assert!(workers.paused().is_paused());
        assert_eq!(status.status_of("p1"), Some(ConnectionStatus::Paused));
        assert_eq!(status.status_of("p2"), Some(ConnectionStatus::Error));
        assert!(workers.is_connected("p1"));

        workers.set_paused(false);
        assert_eq!(status.status_of("p1"), Some(ConnectionStatus::Connected));
    }

    #[tokio::test]
    async fn test_sink_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = BatchSink::new(tx);
        let batch = RawBatch::new("p1", vec![RawSample::new(1.0, 1.0)]);

        assert!(sink.deliver(batch.clone()));
        assert!(!sink.deliver(batch));
        assert!(!sink.deliver(RawBatch::new("p1", Vec::new())));
        assert_eq!(rx.recv().await.map(|b| b.samples.len()), Some(1));
    }

    #[tokio::test]
    async fn test_sink_stamps_its_generation() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = BatchSink::with_generation(tx, 7);
        assert!(sink.deliver(RawBatch::new("p1", vec![RawSample::new(1.0, 1.0)])));
        assert_eq!(rx.recv().await.map(|b| b.generation), Some(7));
    }
}

// Simulated transport - bounded random-walk generator for development and tests
use crate::application::status_registry::StatusRegistry;
use crate::application::transport::{BatchSink, PauseFlag, Transport, WorkerSet, MIN_TICK};
use crate::domain::sample::{RawBatch, RawSample};
use crate::infrastructure::config::SimulationConfig;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Random walk clamped to the configured value range.
struct RandomWalk {
    rng: StdRng,
    value: f64,
    min: f64,
    max: f64,
}

impl RandomWalk {
    fn new(mut rng: StdRng, min: f64, max: f64) -> Self {
        let start = rng.gen_range(min..=(min + (max - min) / 2.0));
        Self { rng, value: start, min, max }
    }

    fn step(&mut self) -> f64 {
        self.value = (self.value + self.rng.gen_range(-0.25..=0.25)).clamp(self.min, self.max);
        self.value
    }
}

fn now_ms() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64
}

pub struct SimulatedTransport {
    workers: WorkerSet,
    settings: SimulationConfig,
    seeds: Mutex<StdRng>,
}

impl SimulatedTransport {
    pub fn new(settings: SimulationConfig, status: Arc<StatusRegistry>, paused: PauseFlag) -> Self {
        let seeds = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            workers: WorkerSet::new(status, paused),
            settings,
            seeds: Mutex::new(seeds),
        }
    }

    pub fn is_running(&self, producer_id: &str) -> bool {
        self.workers.contains(producer_id)
    }

    fn next_rng(&self) -> StdRng {
        let seed = self.seeds.lock().unwrap_or_else(|e| e.into_inner()).next_u64();
        StdRng::seed_from_u64(seed)
    }

    /// Evenly spaced history ending now.
    fn backfill(&self, producer_id: &str, walk: &mut RandomWalk) -> RawBatch {
        let count = self.settings.backfill_points;
        let step = self.settings.backfill_span_ms as f64 / count.max(1) as f64;
        let now = now_ms();
        let samples = (0..count)
            .map(|i| RawSample::new(now - (count - i) as f64 * step, walk.step()))
            .collect();
        RawBatch::new(producer_id, samples)
    }
}

async fn emit_loop(
    producer_id: String,
    sink: BatchSink,
    paused: PauseFlag,
    settings: SimulationConfig,
    mut walk: RandomWalk,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(settings.emit_interval_ms).max(MIN_TICK));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if paused.is_paused() {
            continue;
        }

        let count = walk.rng.gen_range(settings.min_batch..=settings.max_batch);
        let now = now_ms();
        let samples = (0..count)
            .map(|_| {
                let jitter = walk.rng.gen_range(0..100) as f64;
                RawSample::new(now - jitter, walk.step())
            })
            .collect();
        sink.deliver(RawBatch::new(producer_id.clone(), samples));
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn connect(&self, producer_id: &str, sink: BatchSink) {
        let spawned = self.workers.spawn_if_absent(producer_id, || {
            let mut walk = RandomWalk::new(self.next_rng(), self.settings.value_min, self.settings.value_max);
            if !self.workers.paused().is_paused() {
                sink.deliver(self.backfill(producer_id, &mut walk));
            }
            emit_loop(
                producer_id.to_string(),
                sink,
                self.workers.paused().clone(),
                self.settings.clone(),
                walk,
            )
        });

        if spawned {
            tracing::info!(producer_id = %producer_id, "simulated producer connected");
            self.workers
                .status()
                .notify(self.workers.live_status(), Some(producer_id));
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::status::ConnectionStatus;
    use tokio::sync::mpsc;

    fn transport(status: Arc<StatusRegistry>, paused: PauseFlag) -> SimulatedTransport {
        let settings = SimulationConfig {
            seed: Some(7),
            ..SimulationConfig::default()
        };
        SimulatedTransport::new(settings, status, paused)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_backfills_then_streams() {
        let status = Arc::new(StatusRegistry::new());
        let transport = transport(status.clone(), PauseFlag::default());
        let (tx, mut rx) = mpsc::channel(16);

        transport.connect("producer-1", BatchSink::new(tx.clone())).await;
        transport.connect("producer-1", BatchSink::new(tx)).await;
        assert!(transport.is_connected("producer-1"));
        assert_eq!(status.status_of("producer-1"), Some(ConnectionStatus::Connected));

        let backfill = rx.recv().await.unwrap();
        assert_eq!(backfill.samples.len(), 300);
        assert!(backfill.samples.iter().all(|s| (0.0..=20.0).contains(&s.value)));
        let span = backfill.samples[299].timestamp - backfill.samples[0].timestamp;
        assert_eq!(span, 299_000.0);

        let live = rx.recv().await.unwrap();
        assert!((5..=10).contains(&live.samples.len()));
        assert!(rx.try_recv().is_err());

        transport.disconnect("producer-1").await;
        assert!(!transport.is_running("producer-1"));
        assert_eq!(status.status_of("producer-1"), Some(ConnectionStatus::Disconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_transport_emits_nothing() {
        let status = Arc::new(StatusRegistry::new());
        let transport = transport(status.clone(), PauseFlag::default());
        let (tx, mut rx) = mpsc::channel(16);

        transport.set_paused(true);
        transport.connect("producer-1", BatchSink::new(tx)).await;
        assert_eq!(status.status_of("producer-1"), Some(ConnectionStatus::Paused));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());

        transport.set_paused(false);
        assert!(rx.recv().await.is_some());

        transport.disconnect_all().await;
        assert_eq!(status.aggregate_status(), Some(ConnectionStatus::Disconnected));
        assert!(status.get_connection_status().is_empty());
    }
}

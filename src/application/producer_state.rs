// Producer arena - one explicit state record per active producer
use crate::application::ingestion_buffer::IngestionBuffer;
use crate::application::validator::validate_batch;
use crate::domain::sample::{RawSample, Sample};
use std::collections::HashMap;
use std::sync::Arc;

/// Watermark, staged buffer and merged history of one active producer.
#[derive(Debug, Clone, Default)]
pub struct ProducerState {
    pub generation: u64,
    pub watermark: i64,
    pub buffer: IngestionBuffer,
    pub history: Arc<Vec<Sample>>,
}

/// State records keyed by producer id. A record exists exactly while its
/// producer is active.
#[derive(Debug, Default)]
pub struct ProducerArena {
    states: HashMap<String, ProducerState>,
    last_generation: u64,
}

impl ProducerArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the producer was already present. A new record gets
    /// a generation no earlier record of any producer has used.
    pub fn activate(&mut self, producer_id: &str) -> bool {
        if self.states.contains_key(producer_id) {
            return false;
        }
        self.last_generation += 1;
        let state = ProducerState {
            generation: self.last_generation,
            ..ProducerState::default()
        };
        self.states.insert(producer_id.to_string(), state);
        true
    }

    pub fn generation(&self, producer_id: &str) -> Option<u64> {
        self.states.get(producer_id).map(|state| state.generation)
    }

    pub fn deactivate(&mut self, producer_id: &str) -> Option<ProducerState> {
        self.states.remove(producer_id)
    }

    pub fn get(&self, producer_id: &str) -> Option<&ProducerState> {
        self.states.get(producer_id)
    }

    /// Validate a raw batch and stage the accepted samples. Returns the number
    /// of samples accepted; batches for unknown producers are dropped.
    pub fn ingest(&mut self, producer_id: &str, raw: &[RawSample], batch_cap: usize) -> usize {
        let Some(state) = self.states.get_mut(producer_id) else {
            tracing::debug!(producer_id = %producer_id, "dropping batch for inactive producer");
            return 0;
        };

        let accepted = validate_batch(producer_id, raw, &mut state.watermark);
        let count = accepted.len();
        if count > 0 {
            state.buffer.push(producer_id, accepted, batch_cap);
        }
        count
    }

    /// Reset every record to empty while keeping producers active.
    pub fn clear(&mut self) {
        for state in self.states.values_mut() {
            *state = ProducerState {
                generation: state.generation,
                ..ProducerState::default()
            };
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut ProducerState)> {
        self.states.iter_mut()
    }

    pub fn histories(&self) -> HashMap<String, Arc<Vec<Sample>>> {
        self.states
            .iter()
            .map(|(id, state)| (id.clone(), state.history.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_requires_activation() {
        let mut arena = ProducerArena::new();
        let batch = [RawSample::new(1_700_000_000_000.0, 1.0)];
        assert_eq!(arena.ingest("p1", &batch, 1000), 0);

        assert!(arena.activate("p1"));
        assert!(!arena.activate("p1"));
        assert_eq!(arena.ingest("p1", &batch, 1000), 1);
        assert_eq!(arena.get("p1").map(|s| s.buffer.len()), Some(1));
    }

    #[test]
    fn test_deactivate_resets_watermark() {
        let mut arena = ProducerArena::new();
        let batch = [RawSample::new(1_700_000_000_000.0, 1.0)];
        arena.activate("p1");
        arena.ingest("p1", &batch, 1000);
        arena.deactivate("p1");

        arena.activate("p1");
        assert_eq!(arena.get("p1").map(|s| s.watermark), Some(0));
        assert_eq!(arena.ingest("p1", &batch, 1000), 1);
    }

    #[test]
    fn test_reactivation_gets_new_generation() {
        let mut arena = ProducerArena::new();
        arena.activate("p1");
        let first = arena.generation("p1");
        arena.clear();
        assert_eq!(arena.generation("p1"), first);

        arena.deactivate("p1");
        assert_eq!(arena.generation("p1"), None);
        arena.activate("p1");
        assert!(arena.generation("p1") > first);
    }
}

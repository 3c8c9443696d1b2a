// Status registry - last-known connection status per producer plus subscriber fan-out
use crate::domain::status::ConnectionStatus;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubscriberError {
    #[error("status subscriber failed: {0}")]
    Failed(String),
    #[error("status subscriber panicked")]
    Panicked,
}

/// Receives `(status, producer_id)`; `None` denotes an aggregate change.
pub type StatusCallback =
    Arc<dyn Fn(ConnectionStatus, Option<&str>) -> Result<(), SubscriberError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Outcome of one fan-out.
#[derive(Debug, Default)]
pub struct Delivery {
    pub delivered: usize,
    pub failures: Vec<(SubscriptionId, SubscriberError)>,
}

#[derive(Default)]
pub struct StatusRegistry {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionId, StatusCallback)>>,
    statuses: RwLock<HashMap<String, ConnectionStatus>>,
    aggregate: RwLock<Option<ConnectionStatus>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_status_callback(&self, callback: StatusCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, callback));
        id
    }

    pub fn unregister_status_callback(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    /// Record and broadcast a status. A failing subscriber is logged and
    /// reported in the result; the others still receive the update.
    pub fn notify(&self, status: ConnectionStatus, producer_id: Option<&str>) -> Delivery {
        match producer_id {
            Some(id) => {
                self.statuses
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(id.to_string(), status);
            }
            None => {
                *self.aggregate.write().unwrap_or_else(|e| e.into_inner()) = Some(status);
            }
        }

        // Snapshot so callbacks may re-enter the registry.
        let subscribers: Vec<(SubscriptionId, StatusCallback)> = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let mut delivery = Delivery::default();
        for (id, callback) in subscribers {
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(status, producer_id)))
                .unwrap_or(Err(SubscriberError::Panicked));
            match outcome {
                Ok(()) => delivery.delivered += 1,
                Err(error) => {
                    tracing::error!(?id, producer_id = ?producer_id, "error in status callback: {}", error);
                    delivery.failures.push((id, error));
                }
            }
        }
        delivery
    }

    pub fn status_of(&self, producer_id: &str) -> Option<ConnectionStatus> {
        self.statuses
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(producer_id)
            .copied()
    }

    pub fn get_connection_status(&self) -> HashMap<String, ConnectionStatus> {
        self.statuses.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn aggregate_status(&self) -> Option<ConnectionStatus> {
        *self.aggregate.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn forget_all(&self) {
        self.statuses.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder(log: Arc<Mutex<Vec<(ConnectionStatus, Option<String>)>>>) -> StatusCallback {
        Arc::new(move |status: ConnectionStatus, producer_id: Option<&str>| -> Result<(), SubscriberError> {
            log.lock().unwrap().push((status, producer_id.map(str::to_string)));
            Ok(())
        })
    }

    #[test]
    fn test_failing_subscriber_does_not_block_others() {
        let registry = StatusRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.register_status_callback(Arc::new(
            |_: ConnectionStatus, _: Option<&str>| -> Result<(), SubscriberError> {
                Err(SubscriberError::Failed("boom".into()))
            },
        ));
        registry.register_status_callback(Arc::new(
            |_: ConnectionStatus, _: Option<&str>| -> Result<(), SubscriberError> {
                panic!("subscriber bug")
            },
        ));
        registry.register_status_callback(recorder(log.clone()));

        let delivery = registry.notify(ConnectionStatus::Connected, Some("p1"));
        assert_eq!(delivery.delivered, 1);
        assert_eq!(delivery.failures.len(), 2);
        assert_eq!(delivery.failures[1].1, SubscriberError::Panicked);
        assert_eq!(
            log.lock().unwrap().as_slice(),
            &[(ConnectionStatus::Connected, Some("p1".to_string()))]
        );
    }

    #[test]
    fn test_tracks_last_known_status() {
        let registry = StatusRegistry::new();
        registry.notify(ConnectionStatus::Connecting, Some("p1"));
        registry.notify(ConnectionStatus::Connected, Some("p1"));
        registry.notify(ConnectionStatus::Error, Some("p2"));
        registry.notify(ConnectionStatus::Paused, None);

        let statuses = registry.get_connection_status();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses["p1"], ConnectionStatus::Connected);
        assert_eq!(statuses["p2"], ConnectionStatus::Error);
        assert_eq!(registry.aggregate_status(), Some(ConnectionStatus::Paused));
    }

    #[test]
    fn test_unregister_stops_delivery() {
        let registry = StatusRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = registry.register_status_callback(recorder(log.clone()));

        assert!(registry.unregister_status_callback(id));
        assert!(!registry.unregister_status_callback(id));
        registry.notify(ConnectionStatus::Connected, Some("p1"));
        assert!(log.lock().unwrap().is_empty());
    }
}

// Connection status domain model
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Connecting,
    Error,
    Paused,
}

impl ConnectionStatus {
    /// Connected and paused producers both hold a live transport.
    pub fn is_live(self) -> bool {
        matches!(self, ConnectionStatus::Connected | ConnectionStatus::Paused)
    }
}

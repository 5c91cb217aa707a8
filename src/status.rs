use crate::events::FeedEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Display status of the feed connection.
///
/// The status exists only to drive the status label in the feed view; no
/// other component consumes it and no state is terminal. Transitions are
/// driven solely by connector lifecycle events and the refresh gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
    Detected,
    Error,
    RefreshRequested,
    RefreshUnavailable,
}

impl ConnectionStatus {
    /// Status label shown in the feed view
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Detected => "New detection received",
            ConnectionStatus::Error => "Connection error",
            ConnectionStatus::RefreshRequested => "Refresh requested",
            ConnectionStatus::RefreshUnavailable => "Cannot refresh: not connected",
        }
    }

    /// Status transition implied by a feed event, if any
    pub fn for_event(event: &FeedEvent) -> Option<ConnectionStatus> {
        match event {
            FeedEvent::ConnectionOpened { .. } => Some(ConnectionStatus::Connected),
            FeedEvent::ConnectionClosed { .. } => Some(ConnectionStatus::Disconnected),
            FeedEvent::ConnectionError { .. } => Some(ConnectionStatus::Error),
            FeedEvent::ImageDetected { .. } => Some(ConnectionStatus::Detected),
            FeedEvent::RefreshRequested { .. } => Some(ConnectionStatus::RefreshRequested),
            FeedEvent::RefreshUnavailable { .. } => Some(ConnectionStatus::RefreshUnavailable),
            FeedEvent::RefreshGesture { .. }
            | FeedEvent::HistoryReloaded { .. }
            | FeedEvent::ShutdownRequested { .. } => None,
        }
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        ConnectionStatus::Disconnected
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

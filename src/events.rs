use crate::error::DoorwatchError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events that can occur in the doorwatch client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FeedEvent {
    /// The server announced a new detection image
    ImageDetected { url: String, time: String },
    /// The feed connection was established
    ConnectionOpened { timestamp: SystemTime },
    /// The feed connection was closed by the server
    ConnectionClosed { timestamp: SystemTime },
    /// The feed connection failed with a transport error
    ConnectionError { error: String },
    /// The user performed the refresh gesture
    RefreshGesture { timestamp: SystemTime },
    /// A refresh request was sent over the open connection
    RefreshRequested { timestamp: SystemTime },
    /// A refresh was requested while the connection was not open
    RefreshUnavailable { timestamp: SystemTime },
    /// The persisted history was re-read from storage
    HistoryReloaded { entries: usize },
    /// Client shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl FeedEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            FeedEvent::ConnectionOpened { timestamp }
            | FeedEvent::ConnectionClosed { timestamp }
            | FeedEvent::RefreshGesture { timestamp }
            | FeedEvent::RefreshRequested { timestamp }
            | FeedEvent::RefreshUnavailable { timestamp }
            | FeedEvent::ShutdownRequested { timestamp, .. } => *timestamp,
            FeedEvent::ImageDetected { .. }
            | FeedEvent::ConnectionError { .. }
            | FeedEvent::HistoryReloaded { .. } => SystemTime::now(),
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            FeedEvent::ImageDetected { url, time } => {
                format!("New image detected at {}: {}", time, url)
            }
            FeedEvent::ConnectionOpened { .. } => "Feed connection opened".to_string(),
            FeedEvent::ConnectionClosed { .. } => "Feed connection closed".to_string(),
            FeedEvent::ConnectionError { error } => {
                format!("Feed connection error: {}", error)
            }
            FeedEvent::RefreshGesture { .. } => "Refresh gesture".to_string(),
            FeedEvent::RefreshRequested { .. } => "Refresh request sent".to_string(),
            FeedEvent::RefreshUnavailable { .. } => {
                "Refresh unavailable: connection not open".to_string()
            }
            FeedEvent::HistoryReloaded { entries } => {
                format!("History reloaded ({} entries)", entries)
            }
            FeedEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering and logging
    pub fn event_type(&self) -> &'static str {
        match self {
            FeedEvent::ImageDetected { .. } => "image_detected",
            FeedEvent::ConnectionOpened { .. } => "connection_opened",
            FeedEvent::ConnectionClosed { .. } => "connection_closed",
            FeedEvent::ConnectionError { .. } => "connection_error",
            FeedEvent::RefreshGesture { .. } => "refresh_gesture",
            FeedEvent::RefreshRequested { .. } => "refresh_requested",
            FeedEvent::RefreshUnavailable { .. } => "refresh_unavailable",
            FeedEvent::HistoryReloaded { .. } => "history_reloaded",
            FeedEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<FeedEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub async fn publish(&self, event: FeedEvent) -> Result<usize, DoorwatchError> {
        // Log important events at appropriate levels
        match &event {
            FeedEvent::ImageDetected { url, .. } => {
                info!("New detection image: {}", url);
            }
            FeedEvent::ConnectionError { error } => {
                error!("Feed connection error: {}", error);
            }
            FeedEvent::ConnectionClosed { .. } => {
                warn!("Feed connection closed");
            }
            FeedEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {
                debug!("Event: {}", event.description());
            }
        }

        self.sender
            .send(event)
            .map_err(|e| DoorwatchError::EventBus {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

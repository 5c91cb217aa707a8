use crate::error::Result;
use crate::events::{EventBus, FeedEvent};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Keyboard handler for the refresh gesture and shutdown.
///
/// 'r' publishes a refresh gesture, 'q' or Esc requests shutdown.
pub struct KeyboardInputHandler {
    event_bus: Arc<EventBus>,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            event_bus,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Starting keyboard handler - 'r' to refresh, 'q' to quit");

        let event_bus = Arc::clone(&self.event_bus);
        let cancellation_token = self.cancellation_token.clone();
        let runtime_handle = Handle::current();

        // Keyboard polling blocks, so it runs on the blocking pool
        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Keyboard handler stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        if let Ok(Event::Key(key_event)) = event::read() {
                            if key_event.kind != KeyEventKind::Press {
                                continue;
                            }
                            let feed_event = match key_event.code {
                                KeyCode::Char('r') => {
                                    debug!("Refresh gesture");
                                    Some(FeedEvent::RefreshGesture {
                                        timestamp: SystemTime::now(),
                                    })
                                }
                                KeyCode::Char('q') | KeyCode::Esc => {
                                    Some(FeedEvent::ShutdownRequested {
                                        timestamp: SystemTime::now(),
                                        reason: "User requested via keyboard".to_string(),
                                    })
                                }
                                _ => None,
                            };

                            let quit =
                                matches!(key_event.code, KeyCode::Char('q') | KeyCode::Esc);

                            if let Some(feed_event) = feed_event {
                                let event_bus = Arc::clone(&event_bus);
                                runtime_handle.spawn(async move {
                                    if let Err(e) = event_bus.publish(feed_event).await {
                                        warn!("Failed to publish keyboard event: {}", e);
                                    }
                                });
                            }

                            if quit {
                                break;
                            }
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard handler task exited");
        });

        Ok(())
    }

    /// Stop the keyboard handler and restore the terminal
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard handler");
        self.cancellation_token.cancel();

        // Give the task a moment to observe the cancellation
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Raw mode must not outlive the handler even if the task stalled
        let _ = disable_raw_mode();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handler_creation() {
        let event_bus = Arc::new(EventBus::new(16));
        let handler = KeyboardInputHandler::new(event_bus);

        assert!(!handler.cancellation_token.is_cancelled());
    }

    #[tokio::test]
    async fn test_handler_stop() {
        let event_bus = Arc::new(EventBus::new(16));
        let handler = KeyboardInputHandler::new(event_bus);

        handler.stop().await.unwrap();
        assert!(handler.cancellation_token.is_cancelled());
    }
}

use crate::config::DoorwatchConfig;
use crate::connector::FeedConnector;
use crate::display::{FeedRow, FeedView};
use crate::error::Result;
use crate::events::{EventBus, FeedEvent};
use crate::history::HistoryStore;
use crate::input::KeyboardInputHandler;
use crate::probe::ImageHeightResolver;
use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use std::io::Write;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Wires the client components together and runs the event loop.
///
/// Loads persisted history, opens the feed connection, and re-renders the
/// feed view whenever an event arrives. The refresh gesture fans out to
/// both the connector (refresh request) and the store (re-read from disk).
pub struct FeedOrchestrator {
    event_bus: Arc<EventBus>,
    history: Arc<HistoryStore>,
    connector: FeedConnector,
    resolver: ImageHeightResolver,
    view: FeedView,
    keyboard: Option<KeyboardInputHandler>,
}

impl FeedOrchestrator {
    pub fn new(config: DoorwatchConfig, headless: bool) -> Result<Self> {
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let history = Arc::new(HistoryStore::new(config.history.clone()));

        let connector = FeedConnector::new(
            &config.server,
            &config.display,
            Arc::clone(&history),
            Arc::clone(&event_bus),
        )?;

        let resolver = ImageHeightResolver::new(&config.display);
        let view = FeedView::new(&config.display);

        let keyboard = if headless {
            None
        } else {
            Some(KeyboardInputHandler::new(Arc::clone(&event_bus)))
        };

        Ok(Self {
            event_bus,
            history,
            connector,
            resolver,
            view,
            keyboard,
        })
    }

    /// Run the client until shutdown is requested. Returns the exit code.
    pub async fn run(&self) -> Result<i32> {
        // Subscribe before starting the connector so no lifecycle event
        // is missed.
        let mut events = self.event_bus.subscribe();

        self.history.load().await?;

        // A failed initial connect is not fatal: the persisted history is
        // still shown, the status label reads Error. There is no
        // auto-reconnect.
        if let Err(e) = self.connector.start().await {
            warn!("Feed connection unavailable: {}", e);
        }

        if let Some(keyboard) = &self.keyboard {
            keyboard.start().await?;
        }

        self.redraw().await?;

        let exit_code = loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(FeedEvent::ShutdownRequested { reason, .. }) => {
                        info!("Shutting down: {}", reason);
                        break 0;
                    }
                    Ok(FeedEvent::RefreshGesture { .. }) => {
                        self.handle_refresh_gesture().await;
                        self.redraw().await?;
                    }
                    Ok(event) => {
                        debug!("Redrawing after event: {}", event.event_type());
                        self.redraw().await?;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event loop lagged, {} events dropped", skipped);
                    }
                    Err(RecvError::Closed) => break 0,
                },
                _ = signal::ctrl_c() => {
                    info!("Ctrl-C received, shutting down");
                    break 0;
                }
            }
        };

        self.shutdown().await;
        Ok(exit_code)
    }

    /// Refresh gesture: poke the server and reconcile against storage
    async fn handle_refresh_gesture(&self) {
        if let Err(e) = self.connector.request_refresh().await {
            warn!("Refresh request failed: {}", e);
        }

        match self.history.refresh().await {
            Ok(entries) => {
                if let Err(e) = self
                    .event_bus
                    .publish(FeedEvent::HistoryReloaded { entries })
                    .await
                {
                    debug!("Event not delivered: {}", e);
                }
            }
            Err(e) => warn!("History refresh failed: {}", e),
        }
    }

    /// Render the current state to the terminal
    async fn redraw(&self) -> Result<()> {
        let status = self.connector.status().await;
        let current_image = self.connector.current_image().await;
        let records = self.history.records().await;

        let mut rows = Vec::with_capacity(records.len().min(self.view.max_rows()));
        for record in records.into_iter().take(self.view.max_rows()) {
            let height = self.resolver.resolve(&record.url).await;
            rows.push(FeedRow { record, height });
        }

        let screen = self.view.render(status, current_image.as_deref(), &rows);

        let mut stdout = std::io::stdout();
        if self.keyboard.is_some() {
            execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;
        }
        stdout.write_all(screen.as_bytes())?;
        stdout.flush()?;

        Ok(())
    }

    async fn shutdown(&self) {
        self.connector.stop().await;
        if let Some(keyboard) = &self.keyboard {
            if let Err(e) = keyboard.stop().await {
                warn!("Keyboard handler stop failed: {}", e);
            }
        }
        info!("Doorwatch client stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ConnectionStatus;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> DoorwatchConfig {
        let mut config = DoorwatchConfig::default();
        config.history.path = dir
            .path()
            .join("history.json")
            .to_string_lossy()
            .into_owned();
        config
    }

    #[tokio::test]
    async fn test_orchestrator_creation() {
        let dir = TempDir::new().unwrap();
        let orchestrator = FeedOrchestrator::new(test_config(&dir), true).unwrap();

        assert!(orchestrator.keyboard.is_none());
        assert_eq!(
            orchestrator.connector.status().await,
            ConnectionStatus::Disconnected
        );
    }

    #[tokio::test]
    async fn test_refresh_gesture_without_connection() {
        let dir = TempDir::new().unwrap();
        let orchestrator = FeedOrchestrator::new(test_config(&dir), true).unwrap();

        orchestrator.handle_refresh_gesture().await;

        // Nothing was sent; the status reflects the unavailable refresh
        assert_eq!(
            orchestrator.connector.status().await,
            ConnectionStatus::RefreshUnavailable
        );
        assert!(orchestrator.history.is_empty().await);
    }
}

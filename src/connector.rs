use crate::config::{DisplayConfig, ServerConfig};
use crate::error::Result;
use crate::events::{EventBus, FeedEvent};
use crate::history::{DetectionRecord, HistoryStore};
use crate::status::ConnectionStatus;
use chrono::Utc;
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Inbound wire frame, one JSON object per line.
///
/// Only `{"message": "New image", "url": ...}` is acted on; any other
/// decoded shape is ignored.
#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Owns the live connection to the detection feed server.
///
/// One outbound TCP connection, opened by `start` and torn down by `stop`.
/// There is no auto-reconnect: a dropped connection surfaces as
/// `Disconnected` (or `Error`) in the status and stays there, matching the
/// documented behavior of the feed protocol.
pub struct FeedConnector {
    address: String,
    time_format: String,
    timezone: Tz,
    history: Arc<HistoryStore>,
    event_bus: Arc<EventBus>,
    status: Arc<RwLock<ConnectionStatus>>,
    current_image: Arc<RwLock<Option<String>>>,
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
    cancellation_token: CancellationToken,
}

impl FeedConnector {
    pub fn new(
        server: &ServerConfig,
        display: &DisplayConfig,
        history: Arc<HistoryStore>,
        event_bus: Arc<EventBus>,
    ) -> Result<Self> {
        Ok(Self {
            address: server.address(),
            time_format: display.time_format.clone(),
            timezone: display.parsed_timezone()?,
            history,
            event_bus,
            status: Arc::new(RwLock::new(ConnectionStatus::default())),
            current_image: Arc::new(RwLock::new(None)),
            writer: Arc::new(Mutex::new(None)),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Open the feed connection and spawn the read loop
    pub async fn start(&self) -> Result<()> {
        info!("Connecting to detection feed at {}", self.address);

        let stream = match TcpStream::connect(&self.address).await {
            Ok(stream) => stream,
            Err(e) => {
                self.track(FeedEvent::ConnectionError {
                    error: e.to_string(),
                })
                .await;
                return Err(e.into());
            }
        };

        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);

        self.track(FeedEvent::ConnectionOpened {
            timestamp: SystemTime::now(),
        })
        .await;

        let connector = self.clone();
        tokio::spawn(async move {
            connector.read_loop(read_half).await;
        });

        Ok(())
    }

    /// Close the connection and stop the read loop
    pub async fn stop(&self) {
        info!("Stopping feed connector");
        self.cancellation_token.cancel();
        self.writer.lock().await.take();
        self.set_status(ConnectionStatus::Disconnected).await;
    }

    /// Current display status of the connection
    pub async fn status(&self) -> ConnectionStatus {
        *self.status.read().await
    }

    /// URL of the most recently announced detection image
    pub async fn current_image(&self) -> Option<String> {
        self.current_image.read().await.clone()
    }

    /// Whether the outbound half of the connection is open
    pub async fn is_connected(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Send the fire-and-forget refresh request over the open connection.
    ///
    /// No acknowledgment or timeout is defined for this message. When the
    /// connection is not open, the status becomes `RefreshUnavailable` and
    /// nothing is sent.
    pub async fn request_refresh(&self) -> Result<()> {
        let mut writer_guard = self.writer.lock().await;

        let writer = match writer_guard.as_mut() {
            Some(writer) => writer,
            None => {
                drop(writer_guard);
                self.track(FeedEvent::RefreshUnavailable {
                    timestamp: SystemTime::now(),
                })
                .await;
                return Ok(());
            }
        };

        let mut frame = serde_json::to_vec(&json!({"type": "refresh_request"}))?;
        frame.push(b'\n');

        if let Err(e) = writer.write_all(&frame).await {
            writer_guard.take();
            drop(writer_guard);
            self.track(FeedEvent::ConnectionError {
                error: e.to_string(),
            })
            .await;
            return Err(e.into());
        }
        drop(writer_guard);

        self.track(FeedEvent::RefreshRequested {
            timestamp: SystemTime::now(),
        })
        .await;
        Ok(())
    }

    async fn read_loop(&self, read_half: OwnedReadHalf) {
        let mut lines = BufReader::new(read_half).lines();

        loop {
            tokio::select! {
                _ = self.cancellation_token.cancelled() => {
                    debug!("Feed read loop stopping");
                    break;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => self.handle_frame(&line).await,
                    Ok(None) => {
                        self.writer.lock().await.take();
                        self.track(FeedEvent::ConnectionClosed {
                            timestamp: SystemTime::now(),
                        })
                        .await;
                        break;
                    }
                    Err(e) => {
                        self.writer.lock().await.take();
                        self.track(FeedEvent::ConnectionError {
                            error: e.to_string(),
                        })
                        .await;
                        break;
                    }
                }
            }
        }

        debug!("Feed read loop exited");
    }

    /// Decode one inbound line and act on a recognized detection message
    async fn handle_frame(&self, line: &str) {
        let frame: InboundFrame = match serde_json::from_str(line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Ignoring malformed feed frame: {}", e);
                return;
            }
        };

        match (frame.message.as_deref(), frame.url) {
            (Some("New image"), Some(url)) => {
                let time = self.format_now();

                *self.current_image.write().await = Some(url.clone());

                let record = DetectionRecord::new(url.clone(), time.clone());
                if let Err(e) = self.history.append(record).await {
                    error!("Failed to persist detection record: {}", e);
                }

                self.track(FeedEvent::ImageDetected { url, time }).await;
            }
            _ => {
                trace!("Ignoring unrecognized feed frame");
            }
        }
    }

    /// Publish an event and apply its status transition, if any
    async fn track(&self, event: FeedEvent) {
        if let Some(status) = ConnectionStatus::for_event(&event) {
            self.set_status(status).await;
        }
        if let Err(e) = self.event_bus.publish(event).await {
            debug!("Event not delivered: {}", e);
        }
    }

    async fn set_status(&self, status: ConnectionStatus) {
        let mut current = self.status.write().await;
        if *current != status {
            debug!("Connection status: {} -> {}", current, status);
            *current = status;
        }
    }

    /// Wall-clock time formatted for display in the configured timezone
    fn format_now(&self) -> String {
        Utc::now()
            .with_timezone(&self.timezone)
            .format(&self.time_format)
            .to_string()
    }
}

impl Clone for FeedConnector {
    fn clone(&self) -> Self {
        Self {
            address: self.address.clone(),
            time_format: self.time_format.clone(),
            timezone: self.timezone,
            history: Arc::clone(&self.history),
            event_bus: Arc::clone(&self.event_bus),
            status: Arc::clone(&self.status),
            current_image: Arc::clone(&self.current_image),
            writer: Arc::clone(&self.writer),
            cancellation_token: self.cancellation_token.clone(),
        }
    }
}

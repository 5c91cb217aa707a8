pub mod app;
pub mod config;
pub mod connector;
pub mod display;
pub mod error;
pub mod events;
pub mod history;
pub mod input;
pub mod probe;
pub mod status;

pub use app::FeedOrchestrator;
pub use config::DoorwatchConfig;
pub use connector::FeedConnector;
pub use display::{FeedRow, FeedView};
pub use error::{DoorwatchError, Result};
pub use events::{EventBus, FeedEvent};
pub use history::{DetectionRecord, HistoryStore};
pub use input::KeyboardInputHandler;
pub use probe::ImageHeightResolver;
pub use status::ConnectionStatus;

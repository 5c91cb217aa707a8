use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DoorwatchConfig {
    pub server: ServerConfig,
    pub history: HistoryConfig,
    pub display: DisplayConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Hostname or IP address of the detection feed server
    #[serde(default = "default_server_host")]
    pub host: String,

    /// TCP port the feed server listens on
    #[serde(default = "default_server_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HistoryConfig {
    /// Path of the persisted history file (JSON array of {url, time})
    #[serde(default = "default_history_path")]
    pub path: String,

    /// Optional cap on persisted history entries; unbounded when absent
    #[serde(default)]
    pub max_entries: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DisplayConfig {
    /// Display width in units used for image height computation
    #[serde(default = "default_display_width")]
    pub width: f32,

    /// Fallback row height when an image cannot be probed
    #[serde(default = "default_row_height")]
    pub default_row_height: f32,

    /// Maximum number of history rows rendered in the feed view
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// strftime format for detection timestamps
    #[serde(default = "default_time_format")]
    pub time_format: String,

    /// IANA timezone name for detection timestamps
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl ServerConfig {
    /// Socket address string used to open the feed connection
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DisplayConfig {
    /// Parse the configured timezone name
    pub fn parsed_timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone.parse::<Tz>().map_err(|_| {
            ConfigError::Message(format!("Unknown timezone: {}", self.timezone))
        })
    }
}

impl DoorwatchConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("doorwatch.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("server.host", default_server_host())?
            .set_default("server.port", default_server_port())?
            .set_default("history.path", default_history_path())?
            .set_default("display.width", default_display_width() as f64)?
            .set_default("display.default_row_height", default_row_height() as f64)?
            .set_default("display.max_rows", default_max_rows() as i64)?
            .set_default("display.time_format", default_time_format())?
            .set_default("display.timezone", default_timezone())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with DOORWATCH_ prefix
            .add_source(Environment::with_prefix("DOORWATCH").separator("_"))
            .build()?;

        let config: DoorwatchConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.is_empty() {
            return Err(ConfigError::Message(
                "Server host must not be empty".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::Message(
                "Server port must be greater than 0".to_string(),
            ));
        }

        if self.history.path.is_empty() {
            return Err(ConfigError::Message(
                "History path must not be empty".to_string(),
            ));
        }

        if self.history.max_entries == Some(0) {
            return Err(ConfigError::Message(
                "History max_entries must be greater than 0 when set".to_string(),
            ));
        }

        if self.display.width <= 0.0 {
            return Err(ConfigError::Message(
                "Display width must be greater than 0".to_string(),
            ));
        }

        if self.display.default_row_height <= 0.0 {
            return Err(ConfigError::Message(
                "Display default_row_height must be greater than 0".to_string(),
            ));
        }

        if self.display.max_rows == 0 {
            return Err(ConfigError::Message(
                "Display max_rows must be greater than 0".to_string(),
            ));
        }

        if self.display.time_format.is_empty() {
            return Err(ConfigError::Message(
                "Display time_format must not be empty".to_string(),
            ));
        }

        self.display.parsed_timezone()?;

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for DoorwatchConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_server_host(),
                port: default_server_port(),
            },
            history: HistoryConfig {
                path: default_history_path(),
                max_entries: None,
            },
            display: DisplayConfig {
                width: default_display_width(),
                default_row_height: default_row_height(),
                max_rows: default_max_rows(),
                time_format: default_time_format(),
                timezone: default_timezone(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_server_host() -> String {
    "127.0.0.1".to_string()
}
fn default_server_port() -> u16 {
    8765
}

fn default_history_path() -> String {
    "./doorwatch_history.json".to_string()
}

fn default_display_width() -> f32 {
    350.0
}
fn default_row_height() -> f32 {
    250.0
}
fn default_max_rows() -> usize {
    20
}
fn default_time_format() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}
fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_event_bus_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DoorwatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.address(), "127.0.0.1:8765");
        assert_eq!(config.history.max_entries, None);
    }

    #[test]
    fn test_config_validation() {
        let mut config = DoorwatchConfig::default();

        config.server.port = 0;
        assert!(config.validate().is_err());

        config.server.port = 8765;
        assert!(config.validate().is_ok());

        config.history.max_entries = Some(0);
        assert!(config.validate().is_err());

        config.history.max_entries = Some(500);
        assert!(config.validate().is_ok());

        config.display.width = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timezone_parsing() {
        let mut config = DoorwatchConfig::default();
        assert!(config.display.parsed_timezone().is_ok());

        config.display.timezone = "America/New_York".to_string();
        assert!(config.validate().is_ok());

        config.display.timezone = "Not/A_Zone".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = DoorwatchConfig::load_from_file("/nonexistent/doorwatch.toml")
            .expect("defaults should apply when the file is absent");
        assert_eq!(config.server.port, default_server_port());
        assert_eq!(config.display.default_row_height, default_row_height());
    }
}

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PreviewcamConfig {
    pub camera: CameraConfig,
    pub session: SessionConfig,
    pub capture: CaptureConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Logical camera id handed to the hardware layer
    #[serde(default = "default_camera_id")]
    pub camera_id: String,

    /// Preview and still buffer resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),
}

/// Open/close/retry policy for the session controller
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SessionConfig {
    /// Automatic reattempts after a transient open failure
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Linear backoff step; attempt N waits N * base
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Minimum time between a close and the next open
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Wait after a surface becomes available before acting on it
    #[serde(default = "default_stabilization_delay_ms")]
    pub stabilization_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Directory for saved stills
    #[serde(default = "default_capture_path")]
    pub path: String,

    /// File name prefix for saved stills
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl SessionConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn stabilization_delay(&self) -> Duration {
        Duration::from_millis(self.stabilization_delay_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry_limit: default_retry_limit(),
            backoff_base_ms: default_backoff_base_ms(),
            cooldown_ms: default_cooldown_ms(),
            stabilization_delay_ms: default_stabilization_delay_ms(),
        }
    }
}

impl PreviewcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("previewcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.camera_id", default_camera_id())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("session.retry_limit", default_retry_limit())?
            .set_default("session.backoff_base_ms", default_backoff_base_ms())?
            .set_default("session.cooldown_ms", default_cooldown_ms())?
            .set_default(
                "session.stabilization_delay_ms",
                default_stabilization_delay_ms(),
            )?
            .set_default("capture.path", default_capture_path())?
            .set_default("capture.file_prefix", default_file_prefix())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // PREVIEWCAM_SESSION__RETRY_LIMIT=5 overrides session.retry_limit
            .add_source(
                Environment::with_prefix("PREVIEWCAM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: PreviewcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.camera_id.trim().is_empty() {
            return Err(ConfigError::Message(
                "Camera id must not be empty".to_string(),
            ));
        }

        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.session.retry_limit > 0 && self.session.backoff_base_ms == 0 {
            return Err(ConfigError::Message(
                "Session backoff_base_ms must be greater than 0 when retries are enabled"
                    .to_string(),
            ));
        }

        if self.capture.path.trim().is_empty() {
            return Err(ConfigError::Message(
                "Capture path must not be empty".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render this configuration as TOML
    pub fn to_toml(&self) -> crate::error::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for PreviewcamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                camera_id: default_camera_id(),
                resolution: default_camera_resolution(),
            },
            session: SessionConfig::default(),
            capture: CaptureConfig {
                path: default_capture_path(),
                file_prefix: default_file_prefix(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_camera_id() -> String {
    "0".to_string()
}
fn default_camera_resolution() -> (u32, u32) {
    (1920, 1080)
}

fn default_retry_limit() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_cooldown_ms() -> u64 {
    1000
}
fn default_stabilization_delay_ms() -> u64 {
    1000
}

fn default_capture_path() -> String {
    "./captures".to_string()
}
fn default_file_prefix() -> String {
    "IMG_".to_string()
}

fn default_event_bus_capacity() -> usize {
    64
}

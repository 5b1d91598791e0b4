use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreviewcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },
}

impl PreviewcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

/// Failure kinds produced at the hardware boundary.
///
/// Every call into a [`CameraDevice`](crate::camera::CameraDevice) is caught where it is made and
/// mapped onto one of these, so nothing crosses the worker queue as an uncaught fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera permission not granted")]
    PermissionDenied,

    #[error("Camera device or service busy: {details}")]
    DeviceBusy { details: String },

    #[error("Session configuration failed: {details}")]
    ConfigurationFailed { details: String },

    #[error("Camera hardware error: {details}")]
    HardwareError { details: String },

    #[error("Camera not ready")]
    NotReady,

    #[error("Image sink failure: {details}")]
    SinkFailure { details: String },

    #[error("Camera disconnected")]
    Disconnected,
}

impl CameraError {
    pub fn busy<S: Into<String>>(details: S) -> Self {
        Self::DeviceBusy {
            details: details.into(),
        }
    }

    pub fn configuration<S: Into<String>>(details: S) -> Self {
        Self::ConfigurationFailed {
            details: details.into(),
        }
    }

    pub fn hardware<S: Into<String>>(details: S) -> Self {
        Self::HardwareError {
            details: details.into(),
        }
    }

    pub fn sink<S: Into<String>>(details: S) -> Self {
        Self::SinkFailure {
            details: details.into(),
        }
    }

    /// Transient failures are retried automatically within the retry budget.
    pub fn is_transient(&self) -> bool {
        matches!(self, CameraError::DeviceBusy { .. })
    }

    /// Stable lowercase name for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CameraError::PermissionDenied => "permission_denied",
            CameraError::DeviceBusy { .. } => "device_busy",
            CameraError::ConfigurationFailed { .. } => "configuration_failed",
            CameraError::HardwareError { .. } => "hardware_error",
            CameraError::NotReady => "not_ready",
            CameraError::SinkFailure { .. } => "sink_failure",
            CameraError::Disconnected => "disconnected",
        }
    }
}

/// Result of a rejected or failed still capture.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Camera not ready for capture")]
    NotReady,

    #[error("Still capture failed: {details}")]
    Hardware { details: String },

    #[error("Captured image could not be delivered: {details}")]
    Sink { details: String },

    #[error("Camera session controller has been shut down")]
    Stopped,
}

impl From<CameraError> for CaptureError {
    fn from(error: CameraError) -> Self {
        match error {
            CameraError::NotReady => CaptureError::NotReady,
            CameraError::SinkFailure { details } => CaptureError::Sink { details },
            other => CaptureError::Hardware {
                details: other.to_string(),
            },
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, PreviewcamError>;

use crate::error::CameraError;
use crate::surface::{SurfaceSize, SurfaceTarget};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

/// Entry point to the platform camera service
#[async_trait]
pub trait CameraHardware: Send + Sync {
    /// Acquire exclusive ownership of a camera device.
    ///
    /// Implementations map "camera in use" / "max cameras in use" style
    /// rejections to [`CameraError::DeviceBusy`] so they are retried.
    async fn open(
        &self,
        camera_id: &str,
        resolution: (u32, u32),
    ) -> Result<Box<dyn CameraDevice>, CameraError>;
}

/// An opened camera device
#[async_trait]
pub trait CameraDevice: Send {
    /// Bind the device to a render target and build the capture session
    async fn configure_session(
        &mut self,
        target: &SurfaceTarget,
        size: SurfaceSize,
    ) -> Result<(), CameraError>;

    /// Start the repeating preview request on the configured session
    async fn start_repeating_preview(&mut self) -> Result<(), CameraError>;

    async fn stop_preview(&mut self) -> Result<(), CameraError>;

    /// One still capture; resolves with the complete encoded image
    async fn capture_still(&mut self) -> Result<Bytes, CameraError>;

    /// Release the device
    async fn close(&mut self) -> Result<(), CameraError>;
}

/// Exclusive ownership of an opened device; held only by the session worker
pub(crate) struct HardwareHandle {
    camera_id: String,
    device: Box<dyn CameraDevice>,
}

impl HardwareHandle {
    pub(crate) fn new(camera_id: String, device: Box<dyn CameraDevice>) -> Self {
        debug!("Hardware handle acquired for camera {}", camera_id);
        Self { camera_id, device }
    }

    pub(crate) fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub(crate) fn device(&mut self) -> &mut dyn CameraDevice {
        self.device.as_mut()
    }

    /// Consume the handle, releasing the device
    pub(crate) async fn release(mut self) -> Result<(), CameraError> {
        debug!("Releasing hardware handle for camera {}", self.camera_id);
        self.device.close().await
    }
}

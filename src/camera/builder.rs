use super::controller::SessionController;
use super::interface::CameraHardware;
use super::state::SessionStatus;
use super::worker::{SessionWorker, WorkerParts};
use crate::capture::{CaptureCoordinator, ImageSink};
use crate::config::{CameraConfig, PreviewcamConfig, SessionConfig};
use crate::error::{PreviewcamError, Result};
use crate::events::EventSink;
use crate::permissions::{PermissionProvider, PermissionStatus, StaticPermission};
use crate::surface::{SurfaceLifecycleTracker, SurfaceSlot};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;

/// Builder for the camera session controller
pub struct SessionControllerBuilder {
    camera: CameraConfig,
    session: SessionConfig,
    hardware: Option<Arc<dyn CameraHardware>>,
    permission: Arc<dyn PermissionProvider>,
    events: Option<Arc<dyn EventSink>>,
    image_sink: Option<Arc<dyn ImageSink>>,
}

impl SessionControllerBuilder {
    pub fn new() -> Self {
        let defaults = PreviewcamConfig::default();
        Self {
            camera: defaults.camera,
            session: defaults.session,
            hardware: None,
            permission: Arc::new(StaticPermission(PermissionStatus::Granted)),
            events: None,
            image_sink: None,
        }
    }

    /// Take camera and session settings from a loaded configuration
    pub fn config(mut self, config: &PreviewcamConfig) -> Self {
        self.camera = config.camera.clone();
        self.session = config.session.clone();
        self
    }

    pub fn camera(mut self, camera: CameraConfig) -> Self {
        self.camera = camera;
        self
    }

    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn hardware(mut self, hardware: Arc<dyn CameraHardware>) -> Self {
        self.hardware = Some(hardware);
        self
    }

    pub fn permission(mut self, permission: Arc<dyn PermissionProvider>) -> Self {
        self.permission = permission;
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn image_sink(mut self, sink: Arc<dyn ImageSink>) -> Self {
        self.image_sink = Some(sink);
        self
    }

    /// Spawn the session worker on the current tokio runtime
    pub fn build(self) -> Result<SessionController> {
        let hardware = self
            .hardware
            .ok_or_else(|| PreviewcamError::system("Camera hardware must be specified"))?;
        let events = self
            .events
            .ok_or_else(|| PreviewcamError::system("Event sink must be specified"))?;
        let image_sink = self
            .image_sink
            .ok_or_else(|| PreviewcamError::system("Image sink must be specified"))?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            PreviewcamError::system("Session controller must be built inside a tokio runtime")
        })?;

        info!(
            "Starting camera session controller for camera {} (retries: {}, backoff: {}ms, cooldown: {}ms, stabilization: {}ms)",
            self.camera.camera_id,
            self.session.retry_limit,
            self.session.backoff_base_ms,
            self.session.cooldown_ms,
            self.session.stabilization_delay_ms
        );

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());
        let slot = Arc::new(SurfaceSlot::new());

        let worker = SessionWorker::new(
            WorkerParts {
                camera: self.camera,
                session: self.session,
                hardware,
                permission: self.permission,
                events,
                surface: Arc::clone(&slot),
                capture: CaptureCoordinator::new(image_sink),
            },
            commands_tx.clone(),
            status_tx,
        );

        let task = runtime.spawn(worker.run(commands_rx));
        let surface = SurfaceLifecycleTracker::new(slot, commands_tx.clone());

        Ok(SessionController::from_parts(commands_tx, status_rx, surface, task))
    }
}

impl Default for SessionControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

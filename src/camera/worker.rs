use super::interface::{CameraHardware, HardwareHandle};
use super::scheduler::DeferredScheduler;
use super::state::{SessionState, SessionStatus};
use crate::capture::{CaptureCoordinator, CapturedImage};
use crate::config::{CameraConfig, SessionConfig};
use crate::error::{CameraError, CaptureError};
use crate::events::EventSink;
use crate::permissions::PermissionProvider;
use crate::recovery::{CooldownWindow, RecoveryAction, RetryBudget};
use crate::surface::SurfaceSlot;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Messages processed, in submission order, by the session worker
pub(crate) enum SessionCommand {
    /// `epoch` is set when the open was deferred by the close cooldown
    Open { epoch: Option<u64> },
    RetryOpen { epoch: u64 },
    AttachPreview,
    StartPreview,
    RestartPreview,
    SurfaceAvailable { generation: u64 },
    SurfaceSettled { generation: u64 },
    SurfaceLost { ack: oneshot::Sender<()> },
    Capture {
        reply: Option<oneshot::Sender<Result<CapturedImage, CaptureError>>>,
    },
    Close { ack: Option<oneshot::Sender<()>> },
    Flush { ack: oneshot::Sender<()> },
    Shutdown,
}

/// Collaborators handed to the worker at construction
pub(crate) struct WorkerParts {
    pub camera: CameraConfig,
    pub session: SessionConfig,
    pub hardware: Arc<dyn CameraHardware>,
    pub permission: Arc<dyn PermissionProvider>,
    pub events: Arc<dyn EventSink>,
    pub surface: Arc<SurfaceSlot>,
    pub capture: CaptureCoordinator,
}

/// Owns the hardware handle and the session state machine.
///
/// Runs as a single task; every mutation of the handle and the state happens
/// here, so no two hardware operations can overlap.
pub(crate) struct SessionWorker {
    camera: CameraConfig,
    session: SessionConfig,
    hardware: Arc<dyn CameraHardware>,
    permission: Arc<dyn PermissionProvider>,
    events: Arc<dyn EventSink>,
    surface: Arc<SurfaceSlot>,
    capture: CaptureCoordinator,
    handle: Option<HardwareHandle>,
    state: SessionState,
    retry: RetryBudget,
    cooldown: CooldownWindow,
    scheduler: DeferredScheduler,
    status: watch::Sender<SessionStatus>,
    epoch: u64,
    open_scheduled: bool,
    session_configured: bool,
    preview_running: bool,
    pending_attach: bool,
    /// Surface generation whose stabilization wait is still outstanding
    settling: Option<u64>,
}

impl SessionWorker {
    pub(crate) fn new(
        parts: WorkerParts,
        commands: mpsc::UnboundedSender<SessionCommand>,
        status: watch::Sender<SessionStatus>,
    ) -> Self {
        Self {
            retry: RetryBudget::from_config(&parts.session),
            cooldown: CooldownWindow::new(parts.session.cooldown()),
            camera: parts.camera,
            session: parts.session,
            hardware: parts.hardware,
            permission: parts.permission,
            events: parts.events,
            surface: parts.surface,
            capture: parts.capture,
            handle: None,
            state: SessionState::Closed,
            scheduler: DeferredScheduler::new(commands),
            status,
            epoch: 0,
            open_scheduled: false,
            session_configured: false,
            preview_running: false,
            pending_attach: false,
            settling: None,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        info!("Camera session worker started for camera {}", self.camera.camera_id);

        while let Some(command) = commands.recv().await {
            if matches!(command, SessionCommand::Shutdown) {
                debug!("Session worker received shutdown");
                break;
            }
            self.handle_command(command).await;
            self.publish_status();
        }

        // Anything queued after the shutdown marker is dropped with the receiver.
        self.scheduler.cancel_all();
        if self.handle.is_some() || self.state != SessionState::Closed {
            warn!("Session worker stopping with camera still open; closing");
            self.close().await;
        }
        self.publish_status();

        info!("Camera session worker stopped");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Open { epoch } => {
                if let Some(epoch) = epoch {
                    if epoch != self.epoch {
                        debug!("Dropping stale deferred open (epoch {} != {})", epoch, self.epoch);
                        return;
                    }
                    self.open_scheduled = false;
                }
                self.open().await;
            }
            SessionCommand::RetryOpen { epoch } => {
                if epoch != self.epoch || self.state != SessionState::Opening {
                    debug!(
                        "Dropping stale open retry (epoch {}, current {}, state {:?})",
                        epoch, self.epoch, self.state
                    );
                    return;
                }
                self.attempt_open().await;
            }
            SessionCommand::AttachPreview => {
                // Rebuilding a running session drops its repeating request
                if self.preview_running {
                    self.restart_preview().await;
                } else {
                    self.attach_preview().await;
                }
            }
            SessionCommand::StartPreview => self.start_preview().await,
            SessionCommand::RestartPreview => {
                if self.settling == Some(self.surface.generation()) {
                    debug!("Restart skipped: surface still stabilizing");
                    return;
                }
                self.restart_preview().await;
            }
            SessionCommand::SurfaceAvailable { generation } => {
                let delay = self.session.stabilization_delay();
                if delay.is_zero() {
                    self.on_surface_settled(generation).await;
                } else {
                    self.settling = Some(generation);
                    self.scheduler.schedule(
                        delay,
                        SessionCommand::SurfaceSettled { generation },
                        "surface stabilization",
                    );
                }
            }
            SessionCommand::SurfaceSettled { generation } => {
                if self.settling == Some(generation) {
                    self.settling = None;
                }
                self.on_surface_settled(generation).await;
            }
            SessionCommand::SurfaceLost { ack } => {
                self.on_surface_lost().await;
                let _ = ack.send(());
            }
            SessionCommand::Capture { reply } => {
                let result = self.capture().await;
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            SessionCommand::Close { ack } => {
                self.close().await;
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            SessionCommand::Flush { ack } => {
                let _ = ack.send(());
            }
            SessionCommand::Shutdown => {}
        }
    }

    async fn open(&mut self) {
        let permission = self.permission.check();
        if !permission.is_granted() {
            warn!(
                "Camera permission {}; open skipped until permission is granted",
                permission
            );
            return;
        }

        if self.state != SessionState::Closed || self.handle.is_some() {
            debug!("Open skipped: session busy ({:?})", self.state);
            return;
        }

        if self.open_scheduled {
            debug!("Open skipped: a deferred open is already scheduled");
            return;
        }

        if let Some(remaining) = self.cooldown.remaining() {
            info!("Close cooldown active; deferring open by {:?}", remaining);
            self.open_scheduled = true;
            self.scheduler.schedule(
                remaining,
                SessionCommand::Open {
                    epoch: Some(self.epoch),
                },
                "cooldown open",
            );
            return;
        }

        self.set_state(SessionState::Opening);
        self.attempt_open().await;
    }

    async fn attempt_open(&mut self) {
        let camera_id = self.camera.camera_id.clone();
        info!(
            "Opening camera {} (attempt {})",
            camera_id,
            self.retry.attempts() + 1
        );

        match self.hardware.open(&camera_id, self.camera.resolution).await {
            Ok(device) => {
                self.handle = Some(HardwareHandle::new(camera_id.clone(), device));
                self.set_state(SessionState::Open);
                self.retry.reset();
                info!("Camera {} opened successfully", camera_id);

                if self.attach_preview().await {
                    self.start_preview().await;
                }
                if self.handle.is_some() {
                    self.events.ready().await;
                }
            }
            Err(error) => match self.retry.handle_error(&error) {
                RecoveryAction::RetryAfterDelay(delay) => {
                    warn!("Camera {} busy: {}", camera_id, error);
                    self.scheduler.schedule(
                        delay,
                        SessionCommand::RetryOpen { epoch: self.epoch },
                        "open retry",
                    );
                }
                RecoveryAction::GiveUp => {
                    error!("Error opening camera {}: {}", camera_id, error);
                    self.retry.reset();
                    self.set_state(SessionState::Closed);
                    self.events.report(&error).await;
                }
            },
        }
    }

    /// Bind the open device to the ready surface. Returns true when bound.
    async fn attach_preview(&mut self) -> bool {
        if self.state == SessionState::Closing {
            return false;
        }

        let Some(handle) = self.handle.as_mut() else {
            debug!("Attach skipped: camera not open");
            return false;
        };

        let Some((target, size)) = self.surface.current() else {
            debug!("Surface not ready; attach deferred until it becomes available");
            self.pending_attach = true;
            return false;
        };

        debug!(
            "Configuring capture session on surface {} ({}x{})",
            target.id(),
            size.width,
            size.height
        );

        let result = handle.device().configure_session(&target, size).await;
        match result {
            Ok(()) => {
                self.session_configured = true;
                self.pending_attach = false;
                info!("Capture session configured on surface {}", target.id());
                true
            }
            Err(CameraError::Disconnected) => {
                self.release_lost_device(&CameraError::Disconnected).await;
                false
            }
            Err(e) => {
                let error = match e {
                    CameraError::ConfigurationFailed { .. } => e,
                    other => CameraError::configuration(other.to_string()),
                };
                error!("Capture session configuration failed: {}", error);
                self.session_configured = false;
                if self.state == SessionState::PreviewActive {
                    self.set_state(SessionState::Open);
                }
                self.events.report(&error).await;
                false
            }
        }
    }

    async fn start_preview(&mut self) {
        if self.state == SessionState::PreviewActive {
            debug!("Preview already active");
            return;
        }

        if self.state != SessionState::Open || self.handle.is_none() {
            debug!("Preview start skipped in state {:?}", self.state);
            return;
        }

        if !self.surface.is_ready() {
            debug!("Preview start skipped: surface not ready");
            self.pending_attach = true;
            return;
        }

        if !self.session_configured && !self.attach_preview().await {
            return;
        }

        let Some(handle) = self.handle.as_mut() else {
            return;
        };

        match handle.device().start_repeating_preview().await {
            Ok(()) => {
                self.preview_running = true;
                self.set_state(SessionState::PreviewActive);
                info!("Preview started with repeating request");
            }
            Err(CameraError::Disconnected) => {
                self.release_lost_device(&CameraError::Disconnected).await;
            }
            Err(error) => {
                error!("Error starting preview: {}", error);
                self.events.report(&error).await;
            }
        }
    }

    /// The device went away under us; report once and release like a close
    async fn release_lost_device(&mut self, error: &CameraError) {
        error!("Camera device lost: {}", error);
        self.events.report(error).await;
        self.close().await;
    }

    /// Stop the repeating request; failures are logged and swallowed
    async fn stop_preview_quietly(&mut self) {
        if self.preview_running {
            if let Some(handle) = self.handle.as_mut() {
                if let Err(e) = handle.device().stop_preview().await {
                    warn!("Ignoring preview stop failure: {}", e);
                }
            }
            debug!("Preview stopped");
        }

        self.preview_running = false;
        self.session_configured = false;
        if self.state == SessionState::PreviewActive {
            self.set_state(SessionState::Open);
        }
    }

    async fn restart_preview(&mut self) {
        if self.handle.is_none() {
            debug!("Restart requested without an open camera; opening instead");
            self.open().await;
            return;
        }

        if self.state == SessionState::Closing {
            return;
        }

        info!("Restarting preview");
        self.stop_preview_quietly().await;
        if self.attach_preview().await {
            self.start_preview().await;
        }
    }

    async fn on_surface_settled(&mut self, generation: u64) {
        if generation != self.surface.generation() || !self.surface.is_ready() {
            debug!(
                "Surface generation {} superseded (current {}); ignoring",
                generation,
                self.surface.generation()
            );
            return;
        }

        if self.handle.is_some() {
            self.restart_preview().await;
            return;
        }

        match self.state {
            SessionState::Closed => self.open().await,
            state => debug!("Surface ready while {:?}; preview attaches after open", state),
        }
    }

    async fn on_surface_lost(&mut self) {
        if self.handle.is_none() {
            debug!("Surface lost with camera closed");
            return;
        }

        self.stop_preview_quietly().await;
        self.pending_attach = true;
        info!("Preview detached from destroyed surface; camera handle retained");
    }

    async fn capture(&mut self) -> Result<CapturedImage, CaptureError> {
        if self.state != SessionState::PreviewActive {
            warn!("Camera not ready for capture (state {:?})", self.state);
            self.events.report(&CameraError::NotReady).await;
            return Err(CaptureError::NotReady);
        }

        let Some(handle) = self.handle.as_mut() else {
            self.events.report(&CameraError::NotReady).await;
            return Err(CaptureError::NotReady);
        };

        let request = self.capture.begin();
        let outcome = match self.capture.shoot(handle.device(), &request).await {
            Ok(frame) => self.capture.deliver(frame).await,
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(image) => self.events.picture_saved(image.location.clone()).await,
            Err(CameraError::Disconnected) => {}
            Err(e) => self.events.report(e).await,
        }

        if matches!(outcome, Err(CameraError::Disconnected)) {
            self.release_lost_device(&CameraError::Disconnected).await;
        } else {
            // Resume regardless of how the capture went.
            self.restart_preview().await;
        }

        self.capture.finish(&request, &outcome);
        outcome.map_err(CaptureError::from)
    }

    /// Release everything. Safe in every state; no step can block the next.
    async fn close(&mut self) {
        self.scheduler.cancel_all();
        self.epoch += 1;
        self.open_scheduled = false;
        self.pending_attach = false;
        self.settling = None;
        self.retry.reset();

        if self.state == SessionState::Closed && self.handle.is_none() {
            debug!("Close requested while already closed");
            return;
        }

        info!("Closing camera");
        self.set_state(SessionState::Closing);

        self.stop_preview_quietly().await;

        if let Some(handle) = self.handle.take() {
            let camera_id = handle.camera_id().to_string();
            if let Err(e) = handle.release().await {
                warn!("Ignoring camera {} close failure: {}", camera_id, e);
            }
            self.cooldown.mark_closed();
            info!("Camera {} closed", camera_id);
        }

        self.set_state(SessionState::Closed);
    }

    fn set_state(&mut self, state: SessionState) {
        debug_assert!(
            self.handle.is_none() || state.may_hold_handle(),
            "hardware handle held in state {:?}",
            state
        );
        if self.state != state {
            debug!("Session state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
        self.publish_status();
    }

    fn publish_status(&mut self) {
        let snapshot = SessionStatus {
            state: self.state,
            has_handle: self.handle.is_some(),
            surface_ready: self.surface.is_ready(),
            retry_attempts: self.retry.attempts(),
            pending_attach: self.pending_attach,
            pending_tasks: self.scheduler.pending(),
            captures_completed: self.capture.stats().completed,
        };

        self.status.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

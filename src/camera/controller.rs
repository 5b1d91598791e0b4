use super::builder::SessionControllerBuilder;
use super::state::{SessionState, SessionStatus};
use super::worker::SessionCommand;
use crate::capture::CapturedImage;
use crate::error::CaptureError;
use crate::surface::SurfaceLifecycleTracker;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Control-side handle to the camera session.
///
/// Every operation is a one-way post onto the session worker queue; the
/// worker executes them strictly in submission order.
pub struct SessionController {
    commands: mpsc::UnboundedSender<SessionCommand>,
    status: watch::Receiver<SessionStatus>,
    surface: SurfaceLifecycleTracker,
    worker: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl SessionController {
    pub fn builder() -> SessionControllerBuilder {
        SessionControllerBuilder::new()
    }

    pub(crate) fn from_parts(
        commands: mpsc::UnboundedSender<SessionCommand>,
        status: watch::Receiver<SessionStatus>,
        surface: SurfaceLifecycleTracker,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            commands,
            status,
            surface,
            worker: Mutex::new(Some(worker)),
            stopped: AtomicBool::new(false),
        }
    }

    /// Surface callbacks for the UI widget that owns the render target
    pub fn surface(&self) -> SurfaceLifecycleTracker {
        self.surface.clone()
    }

    /// Open the camera if permitted and closed; otherwise a no-op
    pub fn open(&self) {
        self.post(SessionCommand::Open { epoch: None });
    }

    pub fn attach_preview(&self) {
        self.post(SessionCommand::AttachPreview);
    }

    pub fn start_preview(&self) {
        self.post(SessionCommand::StartPreview);
    }

    pub fn restart_preview(&self) {
        self.post(SessionCommand::RestartPreview);
    }

    pub fn close(&self) {
        self.post(SessionCommand::Close { ack: None });
    }

    /// Close and wait until the handle has been released
    pub async fn close_and_wait(&self) {
        let (ack, done) = oneshot::channel();
        if self.post(SessionCommand::Close { ack: Some(ack) }) {
            let _ = done.await;
        }
    }

    /// Take a still; resolves once the image reached the sink
    pub async fn capture(&self) -> Result<CapturedImage, CaptureError> {
        let (reply, result) = oneshot::channel();
        if !self.post(SessionCommand::Capture { reply: Some(reply) }) {
            return Err(CaptureError::Stopped);
        }
        result.await.unwrap_or(Err(CaptureError::Stopped))
    }

    /// Take a still; the outcome is reported only through events
    pub fn take_picture(&self) {
        self.post(SessionCommand::Capture { reply: None });
    }

    /// Wait until every previously posted command has been processed
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.post(SessionCommand::Flush { ack }) {
            let _ = done.await;
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.status.borrow().state
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Wait until the session reaches `state`; false if the worker is gone
    pub async fn wait_for_state(&self, state: SessionState) -> bool {
        self.wait_until(|status| status.state == state).await
    }

    pub async fn wait_until<F>(&self, mut predicate: F) -> bool
    where
        F: FnMut(&SessionStatus) -> bool,
    {
        let mut status = self.status.clone();
        let reached = status.wait_for(|s| predicate(s)).await.is_ok();
        reached
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Close the camera, stop the worker and join it.
    ///
    /// The close is queued before the stop marker, so no hardware operation
    /// runs after this returns.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            debug!("Session controller already shut down");
            return;
        }

        info!("Shutting down camera session controller");
        let _ = self.commands.send(SessionCommand::Close { ack: None });
        let _ = self.commands.send(SessionCommand::Shutdown);

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("Camera session worker ended abnormally: {}", e);
            }
        }

        info!("Camera session controller shut down");
    }

    fn post(&self, command: SessionCommand) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            debug!("Session controller stopped; command ignored");
            return false;
        }

        if self.commands.send(command).is_err() {
            debug!("Session worker gone; command ignored");
            return false;
        }
        true
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            let _ = self.commands.send(SessionCommand::Close { ack: None });
            let _ = self.commands.send(SessionCommand::Shutdown);
        }
    }
}

use crate::camera::SessionCommand;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

/// Opaque render target supplied by the UI widget.
///
/// The optional payload carries whatever native surface object a hardware
/// backend needs; the controller never inspects it.
#[derive(Clone)]
pub struct SurfaceTarget {
    id: u64,
    payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl SurfaceTarget {
    pub fn new(id: u64) -> Self {
        Self { id, payload: None }
    }

    pub fn with_payload<T: Any + Send + Sync>(id: u64, payload: T) -> Self {
        Self {
            id,
            payload: Some(Arc::new(payload)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn payload<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.payload.as_ref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for SurfaceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceTarget")
            .field("id", &self.id)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Edge reported once per readiness change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceTransition {
    BecameReady,
    BecameUnready,
}

/// Readiness shared between the control side and the session worker.
///
/// The flag and generation are written on the control side and read by the
/// worker without a lock. A stale read only turns a queued step into a no-op.
#[derive(Debug, Default)]
pub struct SurfaceSlot {
    ready: AtomicBool,
    generation: AtomicU64,
    target: Mutex<Option<(SurfaceTarget, SurfaceSize)>>,
}

impl SurfaceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Current target, only while ready
    pub fn current(&self) -> Option<(SurfaceTarget, SurfaceSize)> {
        if !self.is_ready() {
            return None;
        }
        self.target.lock().clone()
    }

    pub(crate) fn attach(&self, target: SurfaceTarget, size: SurfaceSize) -> (u64, Option<SurfaceTransition>) {
        *self.target.lock() = Some((target, size));
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let was_ready = self.ready.swap(true, Ordering::AcqRel);
        let transition = (!was_ready).then_some(SurfaceTransition::BecameReady);
        (generation, transition)
    }

    pub(crate) fn resize(&self, size: SurfaceSize) -> bool {
        let mut target = self.target.lock();
        match target.as_mut() {
            Some((_, current)) => {
                *current = size;
                true
            }
            None => false,
        }
    }

    pub(crate) fn detach(&self) -> (u64, Option<SurfaceTransition>) {
        let was_ready = self.ready.swap(false, Ordering::AcqRel);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.target.lock().take();
        let transition = was_ready.then_some(SurfaceTransition::BecameUnready);
        (generation, transition)
    }
}

/// Receives surface lifecycle callbacks from the UI widget and forwards them
/// to the session worker.
#[derive(Clone)]
pub struct SurfaceLifecycleTracker {
    slot: Arc<SurfaceSlot>,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SurfaceLifecycleTracker {
    pub(crate) fn new(
        slot: Arc<SurfaceSlot>,
        commands: mpsc::UnboundedSender<SessionCommand>,
    ) -> Self {
        Self { slot, commands }
    }

    /// The surface can be rendered to.
    ///
    /// The worker acts on it only after the stabilization delay, and only if no
    /// later available/destroyed callback has superseded this one.
    pub fn on_available(&self, target: SurfaceTarget, width: u32, height: u32) {
        info!(
            "Surface {} available ({}x{})",
            target.id(),
            width,
            height
        );

        let (generation, transition) = self.slot.attach(target, SurfaceSize::new(width, height));
        match transition {
            Some(edge) => debug!("Surface transition: {:?} (generation {})", edge, generation),
            None => debug!("Surface replaced while ready (generation {})", generation),
        }

        self.post(SessionCommand::SurfaceAvailable { generation });
    }

    pub fn on_size_changed(&self, width: u32, height: u32) {
        if !self.slot.resize(SurfaceSize::new(width, height)) {
            debug!("Ignoring size change for detached surface");
            return;
        }

        info!("Surface resized to {}x{}", width, height);
        if self.slot.is_ready() {
            self.post(SessionCommand::RestartPreview);
        }
    }

    /// The surface is going away.
    ///
    /// Returns once the worker has stopped preview, so the caller may release
    /// the underlying buffer. Always returns `true`.
    pub async fn on_destroyed(&self) -> bool {
        let (generation, transition) = self.slot.detach();
        info!("Surface destroyed (generation {})", generation);
        if let Some(edge) = transition {
            debug!("Surface transition: {:?}", edge);
        }

        let (ack, done) = oneshot::channel();
        if self.commands.send(SessionCommand::SurfaceLost { ack }).is_err() {
            debug!("Session worker stopped; nothing to detach");
            return true;
        }

        if done.await.is_err() {
            warn!("Session worker exited before acknowledging surface loss");
        }

        true
    }

    /// Per-frame callback
    pub fn on_updated(&self) {
        trace!("Surface frame updated");
    }

    pub fn is_ready(&self) -> bool {
        self.slot.is_ready()
    }

    pub fn generation(&self) -> u64 {
        self.slot.generation()
    }

    fn post(&self, command: SessionCommand) {
        if self.commands.send(command).is_err() {
            debug!("Session worker stopped; surface event ignored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_fire_once_per_edge() {
        let slot = SurfaceSlot::new();

        let (first, edge) = slot.attach(SurfaceTarget::new(1), SurfaceSize::new(640, 480));
        assert_eq!(edge, Some(SurfaceTransition::BecameReady));

        let (second, edge) = slot.attach(SurfaceTarget::new(2), SurfaceSize::new(640, 480));
        assert_eq!(edge, None);
        assert!(second > first);

        let (_, edge) = slot.detach();
        assert_eq!(edge, Some(SurfaceTransition::BecameUnready));
        let (_, edge) = slot.detach();
        assert_eq!(edge, None);
        assert!(!slot.is_ready());
        assert!(slot.current().is_none());
    }

    #[test]
    fn test_resize_only_applies_to_attached_surface() {
        let slot = SurfaceSlot::new();
        assert!(!slot.resize(SurfaceSize::new(10, 10)));

        slot.attach(SurfaceTarget::new(7), SurfaceSize::new(640, 480));
        assert!(slot.resize(SurfaceSize::new(1280, 720)));
        let (target, size) = slot.current().unwrap();
        assert_eq!(target.id(), 7);
        assert_eq!(size, SurfaceSize::new(1280, 720));
    }

    #[test]
    fn test_target_payload_downcast() {
        let target = SurfaceTarget::with_payload(3, String::from("texture-3"));
        assert_eq!(target.payload::<String>().map(String::as_str), Some("texture-3"));
        assert!(target.payload::<u32>().is_none());
        assert!(SurfaceTarget::new(4).payload::<String>().is_none());
    }

    #[tokio::test]
    async fn test_destroy_after_worker_gone_still_returns_true() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let tracker = SurfaceLifecycleTracker::new(Arc::new(SurfaceSlot::new()), tx);
        tracker.on_available(SurfaceTarget::new(1), 640, 480);
        assert!(tracker.is_ready());
        assert!(tracker.on_destroyed().await);
        assert!(!tracker.is_ready());
    }
}

use super::interface::{CameraDevice, CameraHardware};
use crate::error::CameraError;
use crate::surface::{SurfaceSize, SurfaceTarget};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Call counters recorded by the mock hardware
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockCameraStats {
    pub open_calls: u32,
    pub acquisitions: u32,
    pub releases: u32,
    pub live_handles: u32,
    pub max_live_handles: u32,
    pub configures: u32,
    pub configured_targets: Vec<u64>,
    pub preview_starts: u32,
    pub preview_stops: u32,
    pub captures: u32,
    pub previewing: bool,
}

impl MockCameraStats {
    /// Calls that touch an opened device
    pub fn device_calls(&self) -> u32 {
        self.configures + self.preview_starts + self.preview_stops + self.captures + self.releases
    }
}

#[derive(Default)]
struct MockScript {
    open_failures: VecDeque<CameraError>,
    configure_failures: VecDeque<CameraError>,
    preview_failures: VecDeque<CameraError>,
    stop_failures: VecDeque<CameraError>,
    capture_failures: VecDeque<CameraError>,
    close_failures: VecDeque<CameraError>,
    open_latency: Option<Duration>,
}

struct MockState {
    script: Mutex<MockScript>,
    stats: Mutex<MockCameraStats>,
    image: Mutex<Bytes>,
}

/// Scripted camera service for tests and the simulator binary.
///
/// Clones share state, so a test keeps one clone to script failures and read
/// counters while the controller owns another.
#[derive(Clone)]
pub struct MockCameraHardware {
    state: Arc<MockState>,
}

impl MockCameraHardware {
    pub fn new() -> Self {
        // Minimal JPEG: SOI, APP0 marker, EOI
        let image = Bytes::from_static(&[
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x01,
            0x00, 0x48, 0x00, 0x48, 0x00, 0x00, 0xFF, 0xD9,
        ]);

        Self {
            state: Arc::new(MockState {
                script: Mutex::new(MockScript::default()),
                stats: Mutex::new(MockCameraStats::default()),
                image: Mutex::new(image),
            }),
        }
    }

    /// Fail the next `count` opens with `error`
    pub fn fail_next_opens(&self, count: usize, error: CameraError) {
        let mut script = self.state.script.lock();
        for _ in 0..count {
            script.open_failures.push_back(error.clone());
        }
    }

    pub fn fail_next_configure(&self, error: CameraError) {
        self.state.script.lock().configure_failures.push_back(error);
    }

    pub fn fail_next_preview_start(&self, error: CameraError) {
        self.state.script.lock().preview_failures.push_back(error);
    }

    pub fn fail_next_stop(&self, error: CameraError) {
        self.state.script.lock().stop_failures.push_back(error);
    }

    pub fn fail_next_capture(&self, error: CameraError) {
        self.state.script.lock().capture_failures.push_back(error);
    }

    pub fn fail_next_close(&self, error: CameraError) {
        self.state.script.lock().close_failures.push_back(error);
    }

    /// Make every open take this long on the virtual or real clock
    pub fn set_open_latency(&self, latency: Duration) {
        self.state.script.lock().open_latency = Some(latency);
    }

    pub fn set_image(&self, image: Bytes) {
        *self.state.image.lock() = image;
    }

    pub fn stats(&self) -> MockCameraStats {
        self.state.stats.lock().clone()
    }
}

impl Default for MockCameraHardware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraHardware for MockCameraHardware {
    async fn open(
        &self,
        camera_id: &str,
        resolution: (u32, u32),
    ) -> Result<Box<dyn CameraDevice>, CameraError> {
        let latency = {
            self.state.stats.lock().open_calls += 1;
            self.state.script.lock().open_latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(error) = self.state.script.lock().open_failures.pop_front() {
            debug!("Mock camera {} open failing: {}", camera_id, error);
            return Err(error);
        }

        let mut stats = self.state.stats.lock();
        if stats.live_handles > 0 {
            return Err(CameraError::busy(format!("camera {} already in use", camera_id)));
        }

        stats.acquisitions += 1;
        stats.live_handles += 1;
        stats.max_live_handles = stats.max_live_handles.max(stats.live_handles);
        debug!(
            "Mock camera {} opened at {}x{}",
            camera_id, resolution.0, resolution.1
        );

        Ok(Box::new(MockCameraDevice {
            state: Arc::clone(&self.state),
            configured: false,
            closed: false,
        }))
    }
}

struct MockCameraDevice {
    state: Arc<MockState>,
    configured: bool,
    closed: bool,
}

impl MockCameraDevice {
    fn ensure_open(&self) -> Result<(), CameraError> {
        if self.closed {
            return Err(CameraError::Disconnected);
        }
        Ok(())
    }
}

#[async_trait]
impl CameraDevice for MockCameraDevice {
    async fn configure_session(
        &mut self,
        target: &SurfaceTarget,
        _size: SurfaceSize,
    ) -> Result<(), CameraError> {
        self.ensure_open()?;
        let mut stats = self.state.stats.lock();
        stats.configures += 1;
        // A rebuilt session carries no repeating request
        stats.previewing = false;
        if let Some(error) = self.state.script.lock().configure_failures.pop_front() {
            self.configured = false;
            return Err(error);
        }
        stats.configured_targets.push(target.id());
        self.configured = true;
        Ok(())
    }

    async fn start_repeating_preview(&mut self) -> Result<(), CameraError> {
        self.ensure_open()?;
        let mut stats = self.state.stats.lock();
        stats.preview_starts += 1;
        if let Some(error) = self.state.script.lock().preview_failures.pop_front() {
            return Err(error);
        }
        if !self.configured {
            return Err(CameraError::configuration("no capture session configured"));
        }
        stats.previewing = true;
        Ok(())
    }

    async fn stop_preview(&mut self) -> Result<(), CameraError> {
        self.ensure_open()?;
        let mut stats = self.state.stats.lock();
        stats.preview_stops += 1;
        stats.previewing = false;
        if let Some(error) = self.state.script.lock().stop_failures.pop_front() {
            return Err(error);
        }
        Ok(())
    }

    async fn capture_still(&mut self) -> Result<Bytes, CameraError> {
        self.ensure_open()?;
        self.state.stats.lock().captures += 1;
        if let Some(error) = self.state.script.lock().capture_failures.pop_front() {
            return Err(error);
        }
        if !self.configured {
            return Err(CameraError::configuration("no capture session configured"));
        }
        Ok(self.state.image.lock().clone())
    }

    async fn close(&mut self) -> Result<(), CameraError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.configured = false;

        let mut stats = self.state.stats.lock();
        stats.releases += 1;
        stats.live_handles = stats.live_handles.saturating_sub(1);
        stats.previewing = false;

        match self.state.script.lock().close_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Drop for MockCameraDevice {
    fn drop(&mut self) {
        if !self.closed {
            let mut stats = self.state.stats.lock();
            stats.live_handles = stats.live_handles.saturating_sub(1);
        }
    }
}

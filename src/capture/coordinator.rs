use super::sink::ImageSink;
use crate::camera::CameraDevice;
use crate::error::CameraError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One still capture in flight
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub id: Uuid,
    pub requested_at: Instant,
}

/// Raw still as handed to the image sink
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub request_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub data: Bytes,
}

/// A still that reached the sink
#[derive(Debug, Clone, Serialize)]
pub struct CapturedImage {
    pub request_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub location: String,
    pub size_bytes: usize,
    #[serde(skip)]
    pub data: Bytes,
}

/// Capture counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    pub completed: u64,
    pub failed: u64,
}

/// Issues still captures against an active session and delivers the result.
///
/// Preview resumption after the capture is the session worker's job; the
/// coordinator only guarantees one complete buffer per successful capture.
pub struct CaptureCoordinator {
    sink: Arc<dyn ImageSink>,
    in_flight: Option<CaptureRequest>,
    stats: CaptureStats,
}

impl CaptureCoordinator {
    pub fn new(sink: Arc<dyn ImageSink>) -> Self {
        Self {
            sink,
            in_flight: None,
            stats: CaptureStats::default(),
        }
    }

    /// Start tracking a new request
    pub fn begin(&mut self) -> CaptureRequest {
        if let Some(previous) = self.in_flight.take() {
            warn!("Capture {} was never finished; dropping it", previous.id);
        }

        let request = CaptureRequest {
            id: Uuid::new_v4(),
            requested_at: Instant::now(),
        };
        debug!("Capture {} requested", request.id);
        self.in_flight = Some(request.clone());
        request
    }

    /// Run the still capture on the device
    pub async fn shoot(
        &self,
        device: &mut dyn CameraDevice,
        request: &CaptureRequest,
    ) -> Result<CapturedFrame, CameraError> {
        info!("Capturing still for request {}", request.id);

        let data = device.capture_still().await.map_err(|e| match e {
            CameraError::HardwareError { .. } | CameraError::Disconnected => e,
            other => CameraError::hardware(format!("still capture failed: {}", other)),
        })?;

        if data.is_empty() {
            return Err(CameraError::hardware("still capture returned no image data"));
        }

        debug!(
            "Capture {} produced {} bytes in {:?}",
            request.id,
            data.len(),
            request.requested_at.elapsed()
        );

        Ok(CapturedFrame {
            request_id: request.id,
            captured_at: Utc::now(),
            data,
        })
    }

    /// Hand the buffer to the sink
    pub async fn deliver(&self, frame: CapturedFrame) -> Result<CapturedImage, CameraError> {
        let location = self.sink.persist(&frame).await.map_err(|e| match e {
            CameraError::SinkFailure { .. } => e,
            other => CameraError::sink(other.to_string()),
        })?;

        info!("Capture {} delivered to {}", frame.request_id, location);

        Ok(CapturedImage {
            request_id: frame.request_id,
            captured_at: frame.captured_at,
            location,
            size_bytes: frame.data.len(),
            data: frame.data,
        })
    }

    /// Stop tracking the request and record its outcome
    pub fn finish(&mut self, request: &CaptureRequest, outcome: &Result<CapturedImage, CameraError>) {
        if self.in_flight.as_ref().map(|r| r.id) == Some(request.id) {
            self.in_flight = None;
        }

        match outcome {
            Ok(_) => self.stats.completed += 1,
            Err(e) => {
                self.stats.failed += 1;
                error!("Capture {} failed: {}", request.id, e);
            }
        }
    }

    pub fn in_flight(&self) -> Option<&CaptureRequest> {
        self.in_flight.as_ref()
    }

    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }
}

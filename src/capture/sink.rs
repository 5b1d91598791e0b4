use super::coordinator::CapturedFrame;
use crate::config::CaptureConfig;
use crate::error::CameraError;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// Destination for captured stills.
///
/// Naming and storage policy belong to the sink; it returns a location string
/// the host can open.
#[async_trait]
pub trait ImageSink: Send + Sync {
    async fn persist(&self, frame: &CapturedFrame) -> Result<String, CameraError>;
}

/// Writes each still as a timestamped JPEG under a directory
pub struct FileImageSink {
    directory: PathBuf,
    prefix: String,
}

impl FileImageSink {
    pub fn new<P: Into<PathBuf>>(directory: P, prefix: &str) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.to_string(),
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(&config.path, &config.file_prefix)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_stem(&self, captured_at: DateTime<Local>) -> String {
        format!("{}{}", self.prefix, captured_at.format("%Y%m%d_%H%M%S"))
    }

    /// First free path for this stem; stills within the same second get `_1`, `_2`, ...
    async fn free_path(&self, stem: &str) -> PathBuf {
        let mut candidate = self.directory.join(format!("{}.jpg", stem));
        let mut suffix = 1;
        while fs::try_exists(&candidate).await.unwrap_or(false) {
            candidate = self.directory.join(format!("{}_{}.jpg", stem, suffix));
            suffix += 1;
        }
        candidate
    }
}

#[async_trait]
impl ImageSink for FileImageSink {
    async fn persist(&self, frame: &CapturedFrame) -> Result<String, CameraError> {
        if frame.data.is_empty() {
            return Err(CameraError::sink("captured image is empty"));
        }

        if !fs::try_exists(&self.directory).await.unwrap_or(false) {
            fs::create_dir_all(&self.directory).await.map_err(|e| {
                CameraError::sink(format!(
                    "Failed to create capture directory {}: {}",
                    self.directory.display(),
                    e
                ))
            })?;
            info!("Created capture directory: {}", self.directory.display());
        }

        let stem = self.file_stem(frame.captured_at.with_timezone(&Local));
        let path = self.free_path(&stem).await;

        fs::write(&path, &frame.data).await.map_err(|e| {
            CameraError::sink(format!("Failed to write {}: {}", path.display(), e))
        })?;

        debug!(
            "Saved capture {} ({} bytes) to {}",
            frame.request_id,
            frame.data.len(),
            path.display()
        );

        let canonical = fs::canonicalize(&path).await;
        let absolute = canonical.unwrap_or(path);
        Ok(format!("file://{}", absolute.display()))
    }
}

/// Keeps stills in memory; locations are `memory://<request id>`
#[derive(Clone, Default)]
pub struct MemoryImageSink {
    frames: Arc<Mutex<Vec<CapturedFrame>>>,
    fail_with: Arc<Mutex<Option<String>>>,
}

impl MemoryImageSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following persist fail with this message
    pub fn fail_with(&self, message: &str) {
        *self.fail_with.lock() = Some(message.to_string());
    }

    pub fn recover(&self) {
        self.fail_with.lock().take();
    }

    pub fn frames(&self) -> Vec<CapturedFrame> {
        self.frames.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }
}

#[async_trait]
impl ImageSink for MemoryImageSink {
    async fn persist(&self, frame: &CapturedFrame) -> Result<String, CameraError> {
        if let Some(message) = self.fail_with.lock().clone() {
            return Err(CameraError::sink(message));
        }
        self.frames.lock().push(frame.clone());
        Ok(format!("memory://{}", frame.request_id))
    }
}

mod coordinator;
mod sink;
#[cfg(test)]
mod tests;

pub use coordinator::{CaptureCoordinator, CaptureRequest, CaptureStats, CapturedFrame, CapturedImage};
pub use sink::{FileImageSink, ImageSink, MemoryImageSink};

pub mod camera;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod permissions;
pub mod recovery;
pub mod surface;

pub use camera::{
    CameraDevice, CameraHardware, MockCameraHardware, MockCameraStats, SessionController,
    SessionControllerBuilder, SessionState, SessionStatus,
};
pub use capture::{
    CaptureCoordinator, CaptureRequest, CaptureStats, CapturedFrame, CapturedImage, FileImageSink,
    ImageSink, MemoryImageSink,
};
pub use config::PreviewcamConfig;
pub use error::{CameraError, CaptureError, PreviewcamError, Result};
pub use events::{CameraEvent, EventBus, EventFilter, EventReceiver, EventSink};
pub use permissions::{PermissionProvider, PermissionStatus, SharedPermission, StaticPermission};
pub use recovery::{CooldownWindow, RecoveryAction, RetryBudget};
pub use surface::{SurfaceLifecycleTracker, SurfaceSize, SurfaceTarget, SurfaceTransition};

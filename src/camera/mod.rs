mod builder;
mod controller;
mod interface;
mod mock;
mod scheduler;
mod state;
mod worker;

pub use builder::SessionControllerBuilder;
pub use controller::SessionController;
pub use interface::{CameraDevice, CameraHardware};
pub use mock::{MockCameraHardware, MockCameraStats};
pub use state::{SessionState, SessionStatus};

pub(crate) use worker::SessionCommand;

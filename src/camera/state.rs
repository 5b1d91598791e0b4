use serde::Serialize;

/// Controller-wide session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Closed,
    Opening,
    Open,
    PreviewActive,
    Closing,
}

impl SessionState {
    /// States in which the hardware handle may be held
    pub fn may_hold_handle(self) -> bool {
        matches!(
            self,
            SessionState::Open | SessionState::PreviewActive | SessionState::Closing
        )
    }
}

/// Snapshot published by the session worker after every command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub has_handle: bool,
    pub surface_ready: bool,
    pub retry_attempts: u32,
    pub pending_attach: bool,
    pub pending_tasks: usize,
    pub captures_completed: u64,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Closed,
            has_handle: false,
            surface_ready: false,
            retry_attempts: 0,
            pending_attach: false,
            pending_tasks: 0,
            captures_completed: 0,
        }
    }
}

use crate::config::SessionConfig;
use crate::error::CameraError;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Recovery action to take after a failed open
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// Retry the open after a delay
    RetryAfterDelay(Duration),
    /// Give up and report the failure
    GiveUp,
}

/// Bounded allowance of automatic reattempts for transient open failures.
///
/// Backoff is linear: the Nth retry waits `N * base_delay`. The budget is
/// reset on every successful open and whenever the session returns to closed.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    max_retries: u32,
    base_delay: Duration,
    attempts: u32,
}

impl RetryBudget {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            attempts: 0,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.retry_limit, config.backoff_base())
    }

    /// Determine recovery action for an open failure
    pub fn handle_error(&mut self, error: &CameraError) -> RecoveryAction {
        if !error.is_transient() {
            warn!("Non-transient camera error ({}): {}", error.kind(), error);
            return RecoveryAction::GiveUp;
        }

        if self.attempts >= self.max_retries {
            error!(
                "Maximum retries ({}) exceeded for camera open: {}",
                self.max_retries, error
            );
            return RecoveryAction::GiveUp;
        }

        self.attempts += 1;
        let delay = self.delay_for(self.attempts);

        info!(
            "Scheduling camera open retry (attempt {}/{}) in {:?}: {}",
            self.attempts, self.max_retries, delay, error
        );

        RecoveryAction::RetryAfterDelay(delay)
    }

    /// Reset after a successful open or a return to closed
    pub fn reset(&mut self) {
        if self.attempts > 0 {
            info!("Camera retry budget reset after {} attempts", self.attempts);
        }
        self.attempts = 0;
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn remaining(&self) -> u32 {
        self.max_retries.saturating_sub(self.attempts)
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_retries
    }
}

/// Minimum elapsed time between a close and the next open.
#[derive(Debug, Clone)]
pub struct CooldownWindow {
    duration: Duration,
    last_close: Option<Instant>,
}

impl CooldownWindow {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            last_close: None,
        }
    }

    /// Record the moment the hardware handle was released
    pub fn mark_closed(&mut self) {
        self.last_close = Some(Instant::now());
    }

    /// Time left before an open may proceed, if any
    pub fn remaining(&self) -> Option<Duration> {
        let last_close = self.last_close?;
        let elapsed = last_close.elapsed();
        if elapsed >= self.duration {
            None
        } else {
            Some(self.duration - elapsed)
        }
    }
}

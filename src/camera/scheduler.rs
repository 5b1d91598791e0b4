use super::worker::SessionCommand;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Delayed self-posts onto the session worker queue.
///
/// Cancelling is best effort: a command that was already queued before the
/// cancel still arrives, so every deferred command also carries an epoch or
/// surface generation the worker checks before acting.
pub(crate) struct DeferredScheduler {
    commands: mpsc::UnboundedSender<SessionCommand>,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl DeferredScheduler {
    pub(crate) fn new(commands: mpsc::UnboundedSender<SessionCommand>) -> Self {
        Self {
            commands,
            token: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    pub(crate) fn schedule(&mut self, delay: Duration, command: SessionCommand, label: &'static str) {
        debug!("Scheduling deferred {} in {:?}", label, delay);

        let token = self.token.child_token();
        let commands = self.commands.clone();

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    trace!("Deferred {} cancelled", label);
                }
                _ = tokio::time::sleep(delay) => {
                    if commands.send(command).is_err() {
                        trace!("Deferred {} dropped; worker stopped", label);
                    }
                }
            }
        });

        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(task);
    }

    /// Cancel everything scheduled so far
    pub(crate) fn cancel_all(&mut self) {
        let outstanding = self.pending();
        if outstanding > 0 {
            debug!("Cancelling {} deferred session tasks", outstanding);
        }
        self.token.cancel();
        self.token = CancellationToken::new();
        self.tasks.clear();
    }

    pub(crate) fn pending(&mut self) -> usize {
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.len()
    }
}

impl Drop for DeferredScheduler {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

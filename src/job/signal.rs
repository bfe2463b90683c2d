//! Cancellation signal shared between the engine and the worker running a job.

use std::sync::Arc;

use tokio::sync::watch;

use super::state::JobCommand;

/// Carries a pause or stop request into the streaming loop.
///
/// The engine raises the signal after the command was accepted on the job
/// record; the worker selects on [`JobSignal::raised`] around every blocking
/// network call and checks [`JobSignal::current`] after every chunk write.
#[derive(Debug, Clone)]
pub struct JobSignal {
    tx: Arc<watch::Sender<Option<JobCommand>>>,
}

impl Default for JobSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl JobSignal {
    /// Creates a signal with nothing raised.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Raises `command`. A stop is never downgraded to a pause.
    pub fn raise(&self, command: JobCommand) {
        self.tx.send_modify(|current| {
            if *current != Some(JobCommand::Stop) {
                *current = Some(command);
            }
        });
    }

    /// Clears the signal before a new run starts.
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    /// Returns the raised command, if any.
    #[must_use]
    pub fn current(&self) -> Option<JobCommand> {
        *self.tx.borrow()
    }

    /// Resolves once a command is raised.
    pub async fn raised(&self) -> JobCommand {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(command) = *rx.borrow_and_update() {
                return command;
            }
            if rx.changed().await.is_err() {
                // The sender lives as long as `self`, so this is unreachable in practice.
                return std::future::pending().await;
            }
        }
    }
}

//! Job state machine.
//!
//! Legal transitions:
//!
//! ```text
//! queued  -> running            worker claims the job
//! running -> success | failed   transfer finished or gave up
//! running -> paused             pause observed at a checkpoint
//! paused  -> running            resume observed by the scheduler
//! queued | running | paused -> canceled
//! ```
//!
//! Commands that target a running job are recorded as *pending* and
//! committed later by the worker at a chunk boundary. Commands against a job
//! with no worker attached commit immediately. Only one command may be
//! pending at a time, so a second concurrent command is rejected with a
//! conflict instead of silently overriding the first.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::record::{JobId, JobRecord, JobStatus};

/// Operator command against a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobCommand {
    /// Park a running job at the next checkpoint.
    Pause,
    /// Hand a paused job back to the scheduler.
    Resume,
    /// Cancel the job.
    Stop,
}

impl JobCommand {
    /// Returns the lowercase command name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for JobCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected command or transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The job already reached a terminal state.
    #[error("conflict: job {id} is already {status}")]
    Terminal {
        /// Job the command targeted.
        id: JobId,
        /// Terminal status it is in.
        status: JobStatus,
    },

    /// Another command was accepted first and is still pending.
    #[error("conflict: job {id} already has a pending {pending} command")]
    PendingCommand {
        /// Job the command targeted.
        id: JobId,
        /// Command accepted earlier.
        pending: JobCommand,
    },

    /// The job left the state the caller expected before the change applied.
    #[error("conflict: job {id} is {actual}, expected {expected}")]
    StateChanged {
        /// Job the change targeted.
        id: JobId,
        /// State the caller expected.
        expected: JobStatus,
        /// State found.
        actual: JobStatus,
    },

    /// The command does not apply to the job's current state.
    #[error("invalid command: cannot {command} job {id} while it is {status}")]
    InvalidCommand {
        /// Job the command targeted.
        id: JobId,
        /// Rejected command.
        command: JobCommand,
        /// Current status.
        status: JobStatus,
    },

    /// The transition is not in the table.
    #[error("invalid transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        /// Job the transition targeted.
        id: JobId,
        /// Current status.
        from: JobStatus,
        /// Requested status.
        to: JobStatus,
    },
}

impl CommandError {
    /// Returns true for errors caused by a competing change rather than a bad request.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Terminal { .. } | Self::PendingCommand { .. } | Self::StateChanged { .. }
        )
    }
}

/// A committed status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Job that changed.
    pub job_id: JobId,
    /// Status before.
    pub from: JobStatus,
    /// Status after.
    pub to: JobStatus,
    /// Commit time.
    pub at: DateTime<Utc>,
}

/// Result of a command that was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandEffect {
    /// No worker was attached; the transition is already committed.
    Applied(Transition),
    /// Recorded on the job; a worker or the scheduler will commit it.
    Pending(JobCommand),
}

impl JobStatus {
    /// Returns true if `self -> next` is in the transition table.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Running, Self::Success | Self::Failed | Self::Paused)
                | (Self::Paused, Self::Running)
                | (Self::Queued | Self::Running | Self::Paused, Self::Canceled)
        )
    }
}

impl JobRecord {
    /// Commits `expected -> to`.
    ///
    /// `success` is only reachable through [`JobRecord::complete`] so the
    /// saved path is always set with it.
    ///
    /// # Errors
    ///
    /// A conflict when the job is no longer in `expected`, or
    /// [`CommandError::InvalidTransition`] when the pair is not legal.
    pub fn transition(
        &mut self,
        expected: JobStatus,
        to: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<Transition, CommandError> {
        self.expect_status(expected)?;
        if to == JobStatus::Success || !expected.can_transition_to(to) {
            return Err(CommandError::InvalidTransition {
                id: self.id,
                from: expected,
                to,
            });
        }
        Ok(self.commit(to, now))
    }

    /// Commits `running -> success` together with the final path.
    ///
    /// # Errors
    ///
    /// A conflict when the job is no longer running.
    pub fn complete(
        &mut self,
        saved_path: PathBuf,
        now: DateTime<Utc>,
    ) -> Result<Transition, CommandError> {
        self.expect_status(JobStatus::Running)?;
        let transition = self.commit(JobStatus::Success, now);
        self.saved_path = Some(saved_path);
        self.error_message = None;
        Ok(transition)
    }

    /// Commits `running -> failed` and records the reason.
    ///
    /// # Errors
    ///
    /// A conflict when the job is no longer running.
    pub fn fail(
        &mut self,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Transition, CommandError> {
        let transition = self.transition(JobStatus::Running, JobStatus::Failed, now)?;
        self.error_message = Some(message.into());
        Ok(transition)
    }

    /// Claims the job for a worker.
    ///
    /// Queued jobs and paused jobs with a pending resume are claimable.
    ///
    /// # Errors
    ///
    /// Any other state is rejected.
    pub fn claim(&mut self, now: DateTime<Utc>) -> Result<Transition, CommandError> {
        match (self.status, self.pending_command) {
            (JobStatus::Queued, _) | (JobStatus::Paused, Some(JobCommand::Resume)) => {
                let transition = self.commit(JobStatus::Running, now);
                self.attempts = 0;
                self.error_message = None;
                Ok(transition)
            }
            (status, _) if status.is_terminal() => Err(CommandError::Terminal {
                id: self.id,
                status,
            }),
            (status, _) => Err(CommandError::InvalidTransition {
                id: self.id,
                from: status,
                to: JobStatus::Running,
            }),
        }
    }

    /// Returns true if the scheduler may claim this job now.
    #[must_use]
    pub fn is_claimable(&self) -> bool {
        match self.status {
            JobStatus::Queued => true,
            JobStatus::Paused => self.pending_command == Some(JobCommand::Resume),
            _ => false,
        }
    }

    /// Applies an operator command.
    ///
    /// # Errors
    ///
    /// A conflict when the job is terminal or another command is pending,
    /// [`CommandError::InvalidCommand`] when the command does not apply.
    pub fn request(
        &mut self,
        command: JobCommand,
        now: DateTime<Utc>,
    ) -> Result<CommandEffect, CommandError> {
        if self.status.is_terminal() {
            return Err(CommandError::Terminal {
                id: self.id,
                status: self.status,
            });
        }

        match (command, self.status) {
            // Nothing is attached to a queued or paused job, so stop commits at once,
            // even over a resume that has not been picked up yet.
            (JobCommand::Stop, JobStatus::Queued | JobStatus::Paused) => {
                Ok(CommandEffect::Applied(self.commit(JobStatus::Canceled, now)))
            }
            (JobCommand::Stop | JobCommand::Pause, JobStatus::Running)
            | (JobCommand::Resume, JobStatus::Paused) => {
                if let Some(pending) = self.pending_command {
                    return Err(CommandError::PendingCommand {
                        id: self.id,
                        pending,
                    });
                }
                self.pending_command = Some(command);
                self.touch(now);
                Ok(CommandEffect::Pending(command))
            }
            (command, status) => Err(CommandError::InvalidCommand {
                id: self.id,
                command,
                status,
            }),
        }
    }

    /// Stop used by removal: overrides a pending pause instead of conflicting.
    ///
    /// # Errors
    ///
    /// Only when the job is already terminal.
    pub fn force_stop(&mut self, now: DateTime<Utc>) -> Result<CommandEffect, CommandError> {
        if self.status == JobStatus::Running {
            self.pending_command = Some(JobCommand::Stop);
            self.touch(now);
            return Ok(CommandEffect::Pending(JobCommand::Stop));
        }
        self.request(JobCommand::Stop, now)
    }

    fn expect_status(&self, expected: JobStatus) -> Result<(), CommandError> {
        if self.status == expected {
            return Ok(());
        }
        if self.status.is_terminal() {
            return Err(CommandError::Terminal {
                id: self.id,
                status: self.status,
            });
        }
        Err(CommandError::StateChanged {
            id: self.id,
            expected,
            actual: self.status,
        })
    }

    fn commit(&mut self, to: JobStatus, now: DateTime<Utc>) -> Transition {
        let from = self.status;
        self.status = to;
        self.pending_command = None;
        if to != JobStatus::Success {
            self.saved_path = None;
        }
        self.touch(now);
        Transition {
            job_id: self.id,
            from,
            to,
            at: self.updated_at,
        }
    }
}

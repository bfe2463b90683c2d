//! Job records and the state machine that governs them.
//!
//! - [`JobRecord`] - one download's identity, destination, progress and status
//! - [`JobStatus`] / [`NotifyStatus`] - lifecycle and rescan sub-state
//! - [`JobCommand`] / [`CommandError`] - operator commands and their rejections
//! - [`JobSignal`] - pause/stop signal observed by the worker

mod record;
mod signal;
mod state;

pub use record::{JobId, JobRecord, JobStatus, NotifyState, NotifyStatus, PARTIAL_SUFFIX};
pub use signal::JobSignal;
pub use state::{CommandEffect, CommandError, JobCommand, Transition};

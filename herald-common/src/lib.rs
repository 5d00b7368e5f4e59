//! Shared records for the herald dispatcher
//!
//! This crate holds the types every other herald crate speaks in:
//! - Validated job records ([`Target`], [`Message`], [`JobSpec`])
//! - The per-run job state ([`Job`], [`JobStatus`]) and its attempt history
//! - The classified [`Outcome`] of a single send
//! - Logging set-up and the event macros used across the workspace

pub mod error;
pub mod job;
pub mod logging;
pub mod outcome;

pub use error::JobError;
pub use job::{AttemptRecord, Job, JobId, JobSpec, JobStatus, Message, Target};
pub use outcome::Outcome;
pub use tracing;

/// Run-wide control signals broadcast from the front-end to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Stop accepting new work and let in-flight sends finish
    Shutdown,
}

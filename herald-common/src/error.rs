//! Error types for job record validation.

use thiserror::Error;

use crate::job::JobStatus;

/// Errors raised while building or mutating a job record.
///
/// Construction errors reject a record before it can enter a dispatch queue,
/// so a structurally invalid job is never sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// The target is not a `+` followed by 7 to 15 digits.
    #[error("Invalid target: {0:?}")]
    InvalidTarget(String),

    /// The message has no content once surrounding whitespace is removed.
    #[error("Message is empty")]
    EmptyMessage,

    /// The message is longer than the allowed number of characters.
    #[error("Message too long: {length} characters (limit {limit})")]
    MessageTooLong { length: usize, limit: usize },

    /// A job must request at least one send.
    #[error("Send count must be at least 1")]
    ZeroCount,

    /// The inter-send delay was negative or not a finite number.
    #[error("Invalid delay: {0}")]
    InvalidDelay(String),

    /// A status change would break the job lifecycle.
    #[error("Illegal status transition {from:?} -> {to:?}")]
    IllegalTransition { from: JobStatus, to: JobStatus },
}

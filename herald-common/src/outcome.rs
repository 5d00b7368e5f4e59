use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The classified result of one send attempt.
///
/// Transports classify raw protocol responses into one of these; the dispatch
/// engine never looks past this classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The message was accepted by the remote service.
    Success { latency: Duration },
    /// Network, timeout or server-side failure that may succeed on retry.
    TransientFailure(String),
    /// The remote service asked us to slow down, optionally saying for how long.
    RateLimited { retry_after: Option<Duration> },
    /// The remote service rejected the job itself; retrying cannot help.
    ValidationFailure(String),
}

impl Outcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Short lowercase label used in logs and reports.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::TransientFailure(_) => "transient_failure",
            Self::RateLimited { .. } => "rate_limited",
            Self::ValidationFailure(_) => "validation_failure",
        }
    }
}

//! Policy abstractions for dispatch operations.
//!
//! Policies are plain values with pure decision methods, kept apart from the
//! scheduler so their behaviour can be tested without running anything.
//!
//! - [`RetryPolicy`]: decides whether a finished attempt is retried, and when

pub mod retry;

pub use retry::{Backoff, Decision, RetryPolicy};

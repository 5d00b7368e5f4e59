//! The transport collaborator
//!
//! A [`Transport`] performs one send against the remote service and
//! classifies the response into an [`Outcome`]. The dispatch engine never
//! sees raw protocol responses.

use async_trait::async_trait;
use herald_common::{Message, Target};
pub use herald_common::Outcome;

use crate::error::DispatchError;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `message` to `target` once.
    ///
    /// The engine calls this exactly once per approved attempt and never
    /// aborts the returned future.
    async fn send(&self, target: &Target, message: &Message) -> Outcome;

    /// Check that the remote service is reachable.
    ///
    /// # Errors
    ///
    /// Returns a transient or system [`DispatchError`] describing why the
    /// service cannot be used.
    async fn health_check(&self) -> Result<(), DispatchError> {
        Ok(())
    }
}

//! Front-end orchestration: wires configuration, transport and shutdown
//! signals to a dispatch run.

use std::sync::{Arc, LazyLock};

use herald_common::{JobSpec, Signal, internal, tracing};
use herald_dispatch::{DispatchError, DispatchScheduler, RunReport, SystemError, Transport};
use tokio::sync::broadcast;

use crate::{
    config::HeraldConfig,
    transport::SimulatedTransport,
};

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(16);
    sender
});

/// Wait for CTRL+C or SIGTERM, then broadcast [`Signal::Shutdown`].
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be installed.
pub async fn shutdown() -> std::io::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            internal!(level = INFO, "CTRL+C entered, finishing in-flight sends");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate signal received, finishing in-flight sends");
        }
    }

    if SHUTDOWN_BROADCAST.send(Signal::Shutdown).is_err() {
        tracing::debug!("No run is listening for shutdown");
    }

    Ok(())
}

pub struct Herald {
    config: HeraldConfig,
    transport: Arc<dyn Transport>,
}

impl Herald {
    /// Build a front-end around the simulated transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport configuration is invalid.
    pub fn new(config: HeraldConfig) -> Result<Self, SystemError> {
        let transport = SimulatedTransport::new(config.transport.clone())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    #[must_use]
    pub fn with_transport(config: HeraldConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    #[must_use]
    pub const fn config(&self) -> &HeraldConfig {
        &self.config
    }

    /// Check that the transport can reach its service.
    ///
    /// # Errors
    ///
    /// Returns the transport's reason if it cannot.
    pub async fn check(&self) -> Result<(), DispatchError> {
        self.transport.health_check().await
    }

    /// Dispatch `jobs`, cancelling the run when `shutdown` delivers
    /// [`Signal::Shutdown`].
    ///
    /// # Errors
    ///
    /// Returns an error if the run could not start.
    pub async fn dispatch(
        &self,
        jobs: Vec<JobSpec>,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<RunReport, DispatchError> {
        let scheduler = Arc::new(DispatchScheduler::new(
            self.config.dispatch.clone(),
            Arc::clone(&self.transport),
        ));

        let watcher = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move {
                loop {
                    match shutdown.recv().await {
                        Ok(Signal::Shutdown) => {
                            scheduler.cancel();
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        };

        let report = scheduler
            .run(jobs, self.config.dispatch.max_concurrent)
            .await;
        watcher.abort();

        report
    }
}

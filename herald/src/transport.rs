//! Simulated transport
//!
//! Stands in for a real messaging service: every send sleeps for a random
//! latency and then succeeds, fails transiently or is throttled with the
//! configured probabilities. Targets on the reject list are refused as
//! invalid.

use std::time::Duration;

use async_trait::async_trait;
use herald_common::{Message, Target};
use herald_dispatch::{
    DispatchError, Outcome, SystemError, Transport, TransientError, ValidationError,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

mod defaults {
    pub const fn min_latency_ms() -> u64 {
        50
    }

    pub const fn max_latency_ms() -> u64 {
        250
    }
}

/// Behaviour of the [`SimulatedTransport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedTransportConfig {
    /// Shortest simulated send (in milliseconds)
    #[serde(default = "defaults::min_latency_ms")]
    pub min_latency_ms: u64,

    /// Longest simulated send (in milliseconds)
    #[serde(default = "defaults::max_latency_ms")]
    pub max_latency_ms: u64,

    /// Probability that a send fails transiently
    #[serde(default)]
    pub failure_rate: f64,

    /// Probability that a send is throttled
    #[serde(default)]
    pub rate_limit_rate: f64,

    /// `Retry-After` hint attached to throttled sends (in seconds)
    #[serde(default)]
    pub retry_after_secs: Option<u64>,

    /// Targets the service refuses outright
    #[serde(default)]
    pub rejected_targets: Vec<String>,
}

impl Default for SimulatedTransportConfig {
    fn default() -> Self {
        Self {
            min_latency_ms: defaults::min_latency_ms(),
            max_latency_ms: defaults::max_latency_ms(),
            failure_rate: 0.0,
            rate_limit_rate: 0.0,
            retry_after_secs: None,
            rejected_targets: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct SimulatedTransport {
    config: SimulatedTransportConfig,
}

impl SimulatedTransport {
    /// # Errors
    ///
    /// Returns [`SystemError::Configuration`] if the latency range is
    /// inverted or a probability lies outside `[0, 1]`, or the two
    /// probabilities together exceed 1.
    pub fn new(config: SimulatedTransportConfig) -> Result<Self, SystemError> {
        if config.min_latency_ms > config.max_latency_ms {
            return Err(SystemError::Configuration(
                "transport.min_latency_ms: must not exceed max_latency_ms".to_string(),
            ));
        }

        let probability = |p: f64| (0.0..=1.0).contains(&p);
        if !probability(config.failure_rate)
            || !probability(config.rate_limit_rate)
            || !probability(config.failure_rate + config.rate_limit_rate)
        {
            return Err(SystemError::Configuration(
                "transport: failure_rate and rate_limit_rate must be probabilities summing to at most 1"
                    .to_string(),
            ));
        }

        Ok(Self { config })
    }

    fn classify(&self, target: &Target, roll: f64) -> Result<(), DispatchError> {
        if self
            .config
            .rejected_targets
            .iter()
            .any(|rejected| rejected == target.as_str())
        {
            return Err(ValidationError::TargetRejected(target.to_string()).into());
        }

        if roll < self.config.rate_limit_rate {
            return Err(DispatchError::RateLimited {
                retry_after: self.config.retry_after_secs.map(Duration::from_secs),
            });
        }

        if roll < self.config.rate_limit_rate + self.config.failure_rate {
            return Err(TransientError::Server("simulated service error".to_string()).into());
        }

        Ok(())
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn send(&self, target: &Target, _message: &Message) -> Outcome {
        let (latency, roll) = {
            let mut rng = rand::rng();
            let latency_ms = rng.random_range(self.config.min_latency_ms..=self.config.max_latency_ms);
            (Duration::from_millis(latency_ms), rng.random::<f64>())
        };

        tokio::time::sleep(latency).await;

        match self.classify(target, roll) {
            Ok(()) => Outcome::Success { latency },
            Err(error) => error.into(),
        }
    }

    async fn health_check(&self) -> Result<(), DispatchError> {
        if self.config.failure_rate >= 1.0 {
            return Err(
                TransientError::ConnectionFailed("simulated service is unreachable".to_string())
                    .into(),
            );
        }

        Ok(())
    }
}

//! Scripted transport for dispatch scenarios
//!
//! The [`MockTransport`] answers each send from a per-target script of
//! outcomes, falling back to success once a script runs out. It records
//! every send and tracks how many were in flight at once.
#![allow(dead_code)] // Test utility module - not all helpers used in every test
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use herald_dispatch::{
    CooldownMode, DispatchConfig, JobSpec, Message, Outcome, RateLimitConfig, RetryPolicy, Target,
    Transport,
};
use parking_lot::Mutex;
use tokio::{
    sync::{Notify, Semaphore},
    time::Instant,
};

/// A send as the transport saw it
#[derive(Debug, Clone)]
pub struct SendCall {
    pub target: Target,
    pub started: Instant,
}

#[derive(Debug, Default)]
pub struct MockTransport {
    scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
    latency: Duration,
    gate: Option<Semaphore>,
    entered: Notify,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<SendCall>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send takes this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Sends block until [`open_gate`](Self::open_gate) is called.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Answer the next sends to `target` with `outcomes`, in order.
    pub fn with_script(self, target: &str, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.scripts
            .lock()
            .entry(target.to_string())
            .or_default()
            .extend(outcomes);
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Let every blocked and future send through.
    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    /// Wait until a send has started.
    pub async fn wait_for_send(&self) {
        self.entered.notified().await;
    }

    pub fn calls(&self) -> Vec<SendCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, target: &Target, _message: &Message) -> Outcome {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.calls.lock().push(SendCall {
            target: target.clone(),
            started: Instant::now(),
        });
        self.entered.notify_one();

        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await;
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = self
            .scripts
            .lock()
            .get_mut(target.as_str())
            .and_then(VecDeque::pop_front);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        scripted.unwrap_or(Outcome::Success {
            latency: self.latency,
        })
    }
}

/// Quotas high enough to stay out of the way, short cooldown and retries.
pub fn config() -> DispatchConfig {
    DispatchConfig {
        rate_limit: RateLimitConfig {
            max_requests_per_minute: 1000,
            max_requests_per_hour: 10_000,
            cooldown_secs: 2,
            cooldown_mode: CooldownMode::Reset,
        },
        retry: RetryPolicy {
            max_retries: 2,
            base_retry_delay_ms: 1000,
            ..Default::default()
        },
        max_concurrent: 2,
    }
}

pub fn spec(target: &str) -> JobSpec {
    JobSpec::new(target, "hello from herald", 1, Duration::ZERO).unwrap()
}

pub fn transient() -> Outcome {
    Outcome::TransientFailure("connection reset".to_string())
}

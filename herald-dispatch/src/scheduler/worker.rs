//! One worker of a run's pool

use std::{sync::Arc, time::Duration};

use herald_common::{Job, JobStatus, Outcome, internal, outgoing, tracing};
use tokio::time::Instant;

use super::RunContext;
use crate::{policy::Decision, queue::Dequeue, rate_limiter::Acquire};

/// Take jobs until the queue drains or the run is cancelled.
pub(super) async fn run(id: usize, context: Arc<RunContext>) {
    internal!(level = DEBUG, worker = id, "Worker started");

    loop {
        let job = match context.queue.next(&context.cancel).await {
            Dequeue::Job(job) => *job,
            Dequeue::Drained | Dequeue::Cancelled => break,
        };
        context.note_dequeue();

        if !acquire(&context).await {
            context.queue.put_back(job);
            break;
        }

        dispatch(&context, job).await;
    }

    internal!(level = DEBUG, worker = id, "Worker stopped");
}

/// Wait for the rate limiter's approval; `false` if cancelled while waiting.
async fn acquire(context: &RunContext) -> bool {
    loop {
        match context.limiter.try_acquire() {
            Acquire::Approved => return true,
            Acquire::Denied { retry_after } => {
                tokio::select! {
                    () = tokio::time::sleep(retry_after) => {}
                    () = context.cancel.cancelled() => return false,
                }
            }
        }
    }
}

/// Perform one approved send and route the job by its outcome.
async fn dispatch(context: &RunContext, mut job: Job) {
    if let Err(e) = job.advance(JobStatus::InFlight) {
        tracing::error!(job_id = %job.id, error = %e, "Job cannot be sent");
        context.finish(job);
        return;
    }

    let started = Instant::now();
    let outcome = context.transport.send(job.target(), &job.spec.message).await;

    let cooldown_wait = match &outcome {
        Outcome::RateLimited { retry_after } => context
            .limiter
            .record_rate_limit_signal(*retry_after)
            .saturating_duration_since(Instant::now()),
        _ => Duration::ZERO,
    };

    let attempt = job.attempt() + 1;
    let decision = context
        .policy
        .on_outcome(&outcome, attempt, context.limiter.config().cooldown());

    let (next, delay) = match decision {
        Decision::Finalize(JobStatus::Succeeded) if job.remaining() > 1 => {
            (JobStatus::Pending, Some(job.spec.delay))
        }
        Decision::Finalize(status) => (status, None),
        Decision::RetryAfter(delay) if outcome.is_rate_limited() => {
            (JobStatus::RateLimited, Some(delay.max(cooldown_wait)))
        }
        Decision::RetryAfter(delay) => (JobStatus::Pending, Some(delay)),
    };

    let record = job.record_attempt(outcome, attempt, started, delay);
    context.stats.record_attempt(&record);

    outgoing!(
        level = DEBUG,
        job_id = %job.id,
        target = %job.target(),
        send = record.send,
        attempt,
        retries_left = context.policy.remaining_retries(attempt),
        outcome = record.outcome.label(),
        latency_ms = u64::try_from(record.latency.as_millis()).unwrap_or(u64::MAX),
        delay_ms = delay.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        "Send attempt finished"
    );

    if let Err(e) = job.advance(next) {
        tracing::error!(job_id = %job.id, error = %e, "Unexpected job transition");
    }

    match delay {
        Some(delay) => context.queue.defer(job, delay, context.cancel.clone()),
        None => context.finish(job),
    }
}

impl RunContext {
    /// Hand a job that reached its final status to the run's results.
    fn finish(&self, job: Job) {
        let status = job.status();
        match status {
            JobStatus::Succeeded => {
                internal!(level = INFO, job_id = %job.id, delivered = job.delivered(), "Job succeeded");
            }
            JobStatus::Failed | JobStatus::Exhausted => tracing::warn!(
                job_id = %job.id,
                target = %job.target(),
                status = ?status,
                attempts = job.history().len(),
                "Job gave up"
            ),
            JobStatus::Pending | JobStatus::InFlight | JobStatus::RateLimited => {}
        }

        self.stats.record_job_finished(status);
        self.finished.lock().push(job);
        self.queue.complete();
    }
}

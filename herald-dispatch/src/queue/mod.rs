//! Dispatch queue management
//!
//! The queue is shared by every worker of a run: workers take jobs from it,
//! and hand back jobs that need another send after a delay. Delayed jobs are
//! re-inserted by a timer task, so the worker that deferred them is free
//! immediately.
//!
//! The queue also knows when a run has drained: nothing is ready, no timer
//! is pending and no worker holds a job.

pub mod retry;

use std::{collections::VecDeque, pin::pin, sync::Arc, time::Duration};

use herald_common::{Job, tracing};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Result of waiting for the next job.
#[derive(Debug)]
pub enum Dequeue {
    /// A job to send; the caller now holds it until it calls
    /// [`DispatchQueue::complete`], [`DispatchQueue::defer`] or
    /// [`DispatchQueue::put_back`].
    Job(Box<Job>),
    /// No job is ready and none ever will be.
    Drained,
    /// The run was cancelled.
    Cancelled,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Job>,
    /// Jobs waiting on a re-insertion timer
    delayed: usize,
    /// Jobs taken by a worker and not yet returned
    in_flight: usize,
    /// Jobs that have never been taken
    fresh: usize,
}

impl QueueState {
    fn is_drained(&self) -> bool {
        self.ready.is_empty() && self.delayed == 0 && self.in_flight == 0
    }
}

/// Multi-producer, multi-consumer job queue for one run
#[derive(Debug, Default)]
pub struct DispatchQueue {
    state: Mutex<QueueState>,
    changed: Notify,
}

impl DispatchQueue {
    /// Create a queue seeded with the jobs of a run, in submission order
    #[must_use]
    pub fn new(jobs: impl IntoIterator<Item = Job>) -> Self {
        let ready: VecDeque<Job> = jobs.into_iter().collect();
        let fresh = ready.len();

        Self {
            state: Mutex::new(QueueState {
                ready,
                fresh,
                ..Default::default()
            }),
            changed: Notify::new(),
        }
    }

    /// Wait for the next ready job.
    ///
    /// Cancellation is checked before anything is taken, so a cancelled run
    /// never starts another send.
    pub async fn next(&self, cancel: &CancellationToken) -> Dequeue {
        loop {
            if cancel.is_cancelled() {
                return Dequeue::Cancelled;
            }

            let mut changed = pin!(self.changed.notified());
            changed.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(job) = state.ready.pop_front() {
                    state.in_flight += 1;
                    if job.history().is_empty() {
                        state.fresh = state.fresh.saturating_sub(1);
                    }
                    return Dequeue::Job(Box::new(job));
                }

                if state.is_drained() {
                    return Dequeue::Drained;
                }
            }

            tokio::select! {
                () = &mut changed => {}
                () = cancel.cancelled() => return Dequeue::Cancelled,
            }
        }
    }

    /// Return a taken job to the front of the queue without sending it.
    pub fn put_back(&self, job: Job) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if job.history().is_empty() {
            state.fresh += 1;
        }
        state.ready.push_front(job);
        drop(state);

        self.changed.notify_waiters();
    }

    /// Release a taken job that has reached a terminal status.
    pub fn complete(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);

        self.changed.notify_waiters();
    }

    /// Re-insert a taken job once `delay` has passed.
    ///
    /// The job counts as delayed from this moment, so the queue never looks
    /// drained while the timer is pending. Cancellation fires the timer early;
    /// the job then lands back in the queue untouched.
    pub fn defer(self: &Arc<Self>, job: Job, delay: Duration, cancel: CancellationToken) {
        {
            let mut state = self.state.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            state.delayed += 1;
        }

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => {}
            }

            tracing::trace!(job_id = %job.id, "Re-inserting delayed job");
            queue.reinsert(job);
        });
    }

    fn reinsert(&self, job: Job) {
        let mut state = self.state.lock();
        state.delayed = state.delayed.saturating_sub(1);
        state.ready.push_back(job);
        drop(state);

        self.changed.notify_waiters();
    }

    /// Wait until no re-insertion timer is pending.
    pub async fn settled(&self) {
        loop {
            let mut changed = pin!(self.changed.notified());
            changed.as_mut().enable();

            if self.state.lock().delayed == 0 {
                return;
            }

            changed.await;
        }
    }

    /// Take every job still waiting in the queue.
    pub fn take_remaining(&self) -> Vec<Job> {
        self.state.lock().ready.drain(..).collect()
    }

    /// Number of jobs never handed to a worker.
    #[must_use]
    pub fn fresh(&self) -> usize {
        self.state.lock().fresh
    }

    /// Number of jobs ready to be taken right now.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().ready.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().ready.is_empty()
    }

    /// Number of jobs waiting on a re-insertion timer.
    #[must_use]
    pub fn delayed(&self) -> usize {
        self.state.lock().delayed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use herald_common::{JobId, JobSpec};

    use super::*;

    fn job(id: u64) -> Job {
        let spec = JobSpec::new("+15551234567", "hello", 1, Duration::ZERO).unwrap();
        Job::new(JobId(id), spec)
    }

    fn expect_job(dequeue: Dequeue) -> Job {
        match dequeue {
            Dequeue::Job(job) => *job,
            other => panic!("expected a job, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fifo_then_drained() {
        let queue = DispatchQueue::new([job(1), job(2)]);
        let cancel = CancellationToken::new();

        assert_eq!(queue.fresh(), 2);
        assert_eq!(expect_job(queue.next(&cancel).await).id, JobId(1));
        assert_eq!(expect_job(queue.next(&cancel).await).id, JobId(2));
        assert_eq!(queue.fresh(), 0);

        queue.complete();
        queue.complete();
        assert!(matches!(queue.next(&cancel).await, Dequeue::Drained));
    }

    #[tokio::test]
    async fn test_cancel_checked_before_dequeue() {
        let queue = DispatchQueue::new([job(1)]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(queue.next(&cancel).await, Dequeue::Cancelled));
        assert_eq!(queue.take_remaining().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_defer_reinserts_after_delay() {
        let queue = Arc::new(DispatchQueue::new([job(1)]));
        let cancel = CancellationToken::new();

        let taken = expect_job(queue.next(&cancel).await);
        let start = tokio::time::Instant::now();
        queue.defer(taken, Duration::from_secs(5), cancel.clone());
        assert_eq!(queue.delayed(), 1);

        // Not drained while the timer is pending
        let again = expect_job(queue.next(&cancel).await);
        assert_eq!(again.id, JobId(1));
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(queue.delayed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_wakes_waiting_consumer() {
        let queue = Arc::new(DispatchQueue::new([job(1)]));
        let cancel = CancellationToken::new();

        let taken = expect_job(queue.next(&cancel).await);
        queue.defer(taken, Duration::from_secs(3600), cancel.clone());

        let waiter = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.next(&cancel).await })
        };

        tokio::task::yield_now().await;
        cancel.cancel();

        assert!(matches!(waiter.await.unwrap(), Dequeue::Cancelled));
        queue.settled().await;
        assert_eq!(queue.take_remaining().len(), 1);
    }

    #[tokio::test]
    async fn test_put_back_restores_fresh_job() {
        let queue = DispatchQueue::new([job(1), job(2)]);
        let cancel = CancellationToken::new();

        let first = expect_job(queue.next(&cancel).await);
        queue.put_back(first);

        assert_eq!(queue.fresh(), 2);
        assert_eq!(queue.len(), 2);
        assert_eq!(expect_job(queue.next(&cancel).await).id, JobId(1));
    }
}

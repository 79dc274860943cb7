//! In-memory FIFO of pending notification jobs.
//!
//! The queue is strictly ordered by enqueue time and is never reordered.
//! Callers only append to the tail; the dispatcher is the only party that
//! touches the head. Every operation takes the lock briefly and never across
//! an `.await`, so the queue can be shared between request handlers and the
//! dispatcher task.
//!
//! Jobs live in memory only and are lost on restart. Once closed, the queue
//! refuses new jobs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::time::Instant;

use crate::notification::NotificationJob;

/// What the dispatcher finds at the head of the queue
#[derive(Debug)]
pub enum HeadState {
    /// Nothing queued
    Empty,
    /// The head job is still backing off until the given instant
    Waiting(Instant),
    /// The head job is eligible; its attempt counter was already incremented
    Ready(NotificationJob),
}

/// Result of recording a failed attempt on the head job
#[derive(Debug)]
pub enum FailOutcome {
    /// The job stays at the head and will be retried at `next_attempt_at`
    Retry { next_attempt_at: Instant },
    /// The job used its last attempt and was removed
    Exhausted(NotificationJob),
}

#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Mutex<VecDeque<NotificationJob>>,
    // Only written while `jobs` is locked
    closed: AtomicBool,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<NotificationJob>> {
        // A panic while holding the lock cannot leave the deque half-updated
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a job to the tail, returning the new queue length.
    ///
    /// Hands the job back if the queue has been closed.
    pub fn push_back(&self, job: NotificationJob) -> Result<usize, NotificationJob> {
        let mut jobs = self.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Err(job);
        }
        jobs.push_back(job);
        Ok(jobs.len())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Inspect the head and, if it is eligible at `now`, count a new attempt.
    ///
    /// Returns a snapshot of the head job; the job itself stays queued until
    /// [`complete_head`](Self::complete_head) or [`fail_head`](Self::fail_head).
    pub fn begin_attempt(&self, now: Instant) -> HeadState {
        let mut jobs = self.lock();
        let Some(head) = jobs.front_mut() else {
            return HeadState::Empty;
        };

        if now < head.next_attempt_at {
            return HeadState::Waiting(head.next_attempt_at);
        }

        head.attempts += 1;
        HeadState::Ready(head.clone())
    }

    /// Remove the head job after a successful delivery
    pub fn complete_head(&self) -> Option<NotificationJob> {
        self.lock().pop_front()
    }

    /// Record a failed attempt on the head job.
    ///
    /// Removes the job when it has used all its attempts, otherwise pushes its
    /// next eligible time out to `next_attempt_at` (never earlier than before).
    pub fn fail_head(&self, next_attempt_at: Instant) -> Option<FailOutcome> {
        let mut jobs = self.lock();
        let head = jobs.front_mut()?;

        if head.is_exhausted() {
            return jobs.pop_front().map(FailOutcome::Exhausted);
        }

        head.next_attempt_at = head.next_attempt_at.max(next_attempt_at);
        Some(FailOutcome::Retry {
            next_attempt_at: head.next_attempt_at,
        })
    }

    /// Refuse further jobs, then remove and return every queued one
    pub fn close(&self) -> Vec<NotificationJob> {
        let mut jobs = self.lock();
        self.closed.store(true, Ordering::SeqCst);
        jobs.drain(..).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

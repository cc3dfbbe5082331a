//! Retry scheduling
//!
//! The delivery task does not sleep or loop. When an attempt fails in a
//! retryable way it hands the same job back to a [`RetryScheduler`] together
//! with the next [`Invocation`], and returns. The queue owns the attempt
//! counter and decides when the job runs again.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DeliveryConfig;
use crate::delivery::{DeliveryJob, Outcome, Tracker};
use crate::error::{Error, Result};
use crate::transport::Transport;

/// Invocation context carried by the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Invocation {
    /// Number of earlier attempts for this job (0 on the first run)
    pub attempt: u32,
}

impl Invocation {
    pub fn first() -> Self {
        Self::default()
    }

    pub fn next(self) -> Self {
        Self {
            attempt: self.attempt + 1,
        }
    }
}

/// Fixed-delay, bounded retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay before each retry
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: config.retry_delay(),
        }
    }

    /// Whether a job that just failed during `invocation` may run again
    pub fn should_retry(&self, invocation: Invocation) -> bool {
        invocation.attempt < self.max_retries
    }
}

/// The task queue's "run this again later" primitive
pub trait RetryScheduler {
    fn enqueue(&self, job: DeliveryJob, invocation: Invocation, delay: Duration) -> Result<()>;
}

/// A job waiting in a [`MemoryQueue`]
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledJob {
    pub job: DeliveryJob,
    pub invocation: Invocation,
    pub delay: Duration,
}

/// In-process FIFO queue
///
/// Clones share the same underlying queue, so a tracker can hold one clone
/// while the caller drains another.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    entries: Arc<Mutex<VecDeque<ScheduledJob>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the jobs waiting to run
    pub fn pending(&self) -> Vec<ScheduledJob> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the next job off the queue
    pub fn pop(&self) -> Option<ScheduledJob> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    /// Run queued jobs until none are left.
    ///
    /// Each job waits out its delay before it runs. Jobs that schedule a retry
    /// are not reported; every other job contributes its final result, keyed
    /// by job id, in completion order.
    pub async fn run_until_idle<T, S>(&self, tracker: &Tracker<T, S>) -> Vec<(Uuid, Result<Outcome>)>
    where
        T: Transport,
        S: RetryScheduler,
    {
        let mut finished = Vec::new();

        while let Some(entry) = self.pop() {
            if !entry.delay.is_zero() {
                tracing::debug!(
                    job_id = %entry.job.id,
                    delay_secs = entry.delay.as_secs_f64(),
                    "Waiting before next attempt"
                );
                tokio::time::sleep(entry.delay).await;
            }

            match tracker.run(&entry.job, entry.invocation).await {
                Ok(Outcome::RetryScheduled { .. }) => {}
                result => finished.push((entry.job.id, result)),
            }
        }

        finished
    }
}

impl RetryScheduler for MemoryQueue {
    fn enqueue(&self, job: DeliveryJob, invocation: Invocation, delay: Duration) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::Scheduler("memory queue lock poisoned".to_string()))?;
        entries.push_back(ScheduledJob {
            job,
            invocation,
            delay,
        });
        Ok(())
    }
}

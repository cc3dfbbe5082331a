//! Delivery task
//!
//! A [`DeliveryJob`] holds the caller's original arguments. Each invocation of
//! [`Tracker::run`] rebuilds the envelope from those arguments, encodes it,
//! sends it once, and then either finishes or hands the job back to the
//! retry scheduler:
//!
//! ```text
//! disabled? ──yes──▶ Disabled
//!     │no
//! build ─▶ encode ─▶ send ──200 OK──▶ Delivered(body == "1")
//!   │         │        │
//!   └─ permanent error │transient
//!                      ├─ attempt < max_retries ─▶ RetryScheduled
//!                      └─ otherwise ────────────▶ Err(Exhausted)
//! ```

use std::borrow::Cow;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::Config;
use crate::encoder;
use crate::error::{Error, Result, TransientError};
use crate::event::{charge_timestamp, DeliveryOptions, EventFamily, ProfileOperation};
use crate::queue::{Invocation, MemoryQueue, RetryPolicy, RetryScheduler};
use crate::transport::{HttpTransport, Transport};

/// One logical delivery, replayed unchanged on every retry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryJob {
    /// Task id, stable across retries
    pub id: Uuid,
    #[serde(flatten)]
    pub family: EventFamily,
    /// Caller properties (or the name list for `unset`)
    #[serde(default)]
    pub properties: Option<Value>,
    #[serde(default)]
    pub options: DeliveryOptions,
}

impl DeliveryJob {
    fn new(family: EventFamily, properties: Option<Value>, options: DeliveryOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            family,
            properties,
            options,
        }
    }

    /// A standard event
    pub fn event(
        event: impl Into<String>,
        properties: Option<Value>,
        options: DeliveryOptions,
    ) -> Self {
        Self::new(
            EventFamily::Standard {
                event: event.into(),
            },
            properties,
            options,
        )
    }

    /// A funnel step
    pub fn funnel(
        funnel: impl Into<String>,
        step: impl Into<Value>,
        goal: impl Into<String>,
        properties: Option<Value>,
        options: DeliveryOptions,
    ) -> Self {
        Self::new(
            EventFamily::Funnel {
                funnel: funnel.into(),
                step: step.into(),
                goal: goal.into(),
            },
            properties,
            options,
        )
    }

    /// A profile operation.
    ///
    /// For `track_charge` the transaction time is captured here when the
    /// caller did not give one, so every retry sends the same `$time`.
    pub fn profile(
        operation: ProfileOperation,
        payload: Option<Value>,
        options: DeliveryOptions,
    ) -> Self {
        let mut job = Self::new(EventFamily::Profile { operation }, payload, options);
        job.capture_charge_time();
        job
    }

    fn needs_charge_time(&self) -> bool {
        matches!(
            self.family,
            EventFamily::Profile {
                operation: ProfileOperation::TrackCharge
            }
        ) && self.options.time.is_none()
    }

    /// Fix the `track_charge` transaction time if it is still open.
    ///
    /// [`Tracker::run`] applies this to every job it sees, so jobs built by
    /// hand or read back from a queue also keep one `$time` across retries.
    pub fn capture_charge_time(&mut self) {
        if self.needs_charge_time() {
            self.options.time = Some(Value::String(charge_timestamp()));
        }
    }

    fn with_charge_time(&self) -> Cow<'_, DeliveryJob> {
        if self.needs_charge_time() {
            let mut job = self.clone();
            job.capture_charge_time();
            Cow::Owned(job)
        } else {
            Cow::Borrowed(self)
        }
    }

    /// Short name for logs
    pub fn label(&self) -> String {
        self.family.label()
    }
}

/// Result of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The server answered `200 OK`; `true` if it recorded the event
    Delivered(bool),
    /// Kill-switch set, nothing sent
    Disabled,
    /// Attempt failed and the job was handed back to the scheduler
    RetryScheduled { attempt: u32, delay: Duration },
}

impl Outcome {
    /// Whether the remote API recorded the event
    pub fn recorded(&self) -> bool {
        matches!(self, Outcome::Delivered(true))
    }
}

/// Why an attempt did not deliver
enum Failure {
    Permanent(Error),
    Transient(TransientError),
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Failure::Permanent(err)
    }
}

/// Runs delivery jobs against the tracking API
pub struct Tracker<T, S> {
    config: Config,
    transport: T,
    scheduler: S,
    policy: RetryPolicy,
}

impl<S: RetryScheduler> Tracker<HttpTransport, S> {
    /// Create a tracker that talks HTTP to the configured server
    pub fn new(config: Config, scheduler: S) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config.api, config.delivery.timeout())?;
        Ok(Self::with_transport(config, transport, scheduler))
    }
}

impl<T: Transport, S: RetryScheduler> Tracker<T, S> {
    pub fn with_transport(config: Config, transport: T, scheduler: S) -> Self {
        let policy = RetryPolicy::from_config(&config.delivery);
        Self {
            config,
            transport,
            scheduler,
            policy,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Track a standard event now
    pub async fn track(
        &self,
        event: &str,
        properties: Option<Value>,
        options: DeliveryOptions,
    ) -> Result<Outcome> {
        let job = DeliveryJob::event(event, properties, options);
        self.run(&job, Invocation::first()).await
    }

    /// Track a funnel step now
    pub async fn track_funnel(
        &self,
        funnel: &str,
        step: Value,
        goal: &str,
        properties: Option<Value>,
        options: DeliveryOptions,
    ) -> Result<Outcome> {
        let job = DeliveryJob::funnel(funnel, step, goal, properties, options);
        self.run(&job, Invocation::first()).await
    }

    /// Send a profile operation now, parsing the operation name
    pub async fn people(
        &self,
        operation: &str,
        payload: Option<Value>,
        options: DeliveryOptions,
    ) -> Result<Outcome> {
        if self.config.api.disabled {
            tracing::info!(operation, "Mixpanel disabled; not recording profile update");
            return Ok(Outcome::Disabled);
        }
        let operation: ProfileOperation = operation.parse()?;
        let job = DeliveryJob::profile(operation, payload, options);
        self.run(&job, Invocation::first()).await
    }

    /// Put a job on the queue for its first attempt
    pub fn dispatch(&self, job: DeliveryJob) -> Result<()> {
        tracing::debug!(job_id = %job.id, event = %job.label(), "Dispatching job");
        self.scheduler
            .enqueue(job, Invocation::first(), Duration::ZERO)
    }

    /// Run one attempt of `job`.
    ///
    /// Validation and encoding errors are returned immediately. A transient
    /// failure schedules a retry while the policy allows it, and becomes
    /// [`Error::Exhausted`] once it does not.
    pub async fn run(&self, job: &DeliveryJob, invocation: Invocation) -> Result<Outcome> {
        let label = job.label();

        if self.config.api.disabled {
            tracing::info!(event = %label, "Mixpanel disabled; not recording event");
            return Ok(Outcome::Disabled);
        }

        let job = job.with_charge_time();

        tracing::info!(
            event = %label,
            job_id = %job.id,
            attempt = invocation.attempt,
            "Recording event"
        );

        let result = self.attempt(&job).await;
        match result {
            Ok(recorded) => {
                if recorded {
                    tracing::info!(event = %label, "Event recorded/logged");
                } else {
                    tracing::info!(event = %label, "Event ignored");
                }
                Ok(Outcome::Delivered(recorded))
            }
            Err(Failure::Permanent(err)) => {
                tracing::warn!(event = %label, error = %err, "Event rejected before sending");
                Err(err)
            }
            Err(Failure::Transient(err)) if self.policy.should_retry(invocation) => {
                let next = invocation.next();
                let delay = self.policy.delay;
                tracing::warn!(
                    event = %label,
                    attempt = invocation.attempt,
                    delay_secs = delay.as_secs(),
                    error = %err,
                    "Event failed. Retrying"
                );
                self.scheduler.enqueue(job.into_owned(), next, delay)?;
                Ok(Outcome::RetryScheduled {
                    attempt: next.attempt,
                    delay,
                })
            }
            Err(Failure::Transient(err)) => {
                let attempts = invocation.attempt + 1;
                tracing::error!(
                    event = %label,
                    attempts,
                    error = %err,
                    "Event failed; giving up"
                );
                Err(Error::Exhausted {
                    attempts,
                    last: err,
                })
            }
        }
    }

    /// Build, encode and send once
    async fn attempt(&self, job: &DeliveryJob) -> std::result::Result<bool, Failure> {
        let api = &self.config.api;

        let envelope = job
            .family
            .build(job.properties.as_ref(), &job.options, api)?;
        tracing::debug!(params = ?envelope, "Built params");

        let test = job.options.test.unwrap_or(api.test_mode);
        let query = encoder::encode(&envelope, test)?
            .query_string(&api.data_variable, &api.test_variable);
        tracing::debug!(encoded = %query, "Encoded params");

        self.transport
            .send(job.family.endpoint(api), &query)
            .await
            .map_err(Failure::Transient)
    }
}

/// Synchronous wrapper for Tracker
///
/// Provides blocking methods for use in synchronous worker code.
pub struct SyncTracker<T, S> {
    inner: Tracker<T, S>,
    runtime: tokio::runtime::Runtime,
}

impl<S: RetryScheduler> SyncTracker<HttpTransport, S> {
    /// Create a blocking tracker that talks HTTP to the configured server
    pub fn new(config: Config, scheduler: S) -> Result<Self> {
        Ok(Self {
            inner: Tracker::new(config, scheduler)?,
            runtime: current_thread_runtime()?,
        })
    }
}

impl<T: Transport, S: RetryScheduler> SyncTracker<T, S> {
    pub fn from_tracker(inner: Tracker<T, S>) -> Result<Self> {
        Ok(Self {
            inner,
            runtime: current_thread_runtime()?,
        })
    }

    pub fn tracker(&self) -> &Tracker<T, S> {
        &self.inner
    }

    /// Track a standard event (blocking)
    pub fn track(
        &self,
        event: &str,
        properties: Option<Value>,
        options: DeliveryOptions,
    ) -> Result<Outcome> {
        self.runtime
            .block_on(self.inner.track(event, properties, options))
    }

    /// Track a funnel step (blocking)
    pub fn track_funnel(
        &self,
        funnel: &str,
        step: Value,
        goal: &str,
        properties: Option<Value>,
        options: DeliveryOptions,
    ) -> Result<Outcome> {
        self.runtime
            .block_on(self.inner.track_funnel(funnel, step, goal, properties, options))
    }

    /// Send a profile operation (blocking)
    pub fn people(
        &self,
        operation: &str,
        payload: Option<Value>,
        options: DeliveryOptions,
    ) -> Result<Outcome> {
        self.runtime
            .block_on(self.inner.people(operation, payload, options))
    }

    /// Run one attempt of a job (blocking)
    pub fn run(&self, job: &DeliveryJob, invocation: Invocation) -> Result<Outcome> {
        self.runtime.block_on(self.inner.run(job, invocation))
    }

    /// Put a job on the queue for its first attempt
    pub fn dispatch(&self, job: DeliveryJob) -> Result<()> {
        self.inner.dispatch(job)
    }
}

impl<T: Transport> SyncTracker<T, MemoryQueue> {
    /// Drain the tracker's in-process queue (blocking)
    pub fn run_until_idle(&self) -> Vec<(Uuid, Result<Outcome>)> {
        let queue = self.inner.scheduler().clone();
        self.runtime.block_on(queue.run_until_idle(&self.inner))
    }
}

fn current_thread_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(Error::Io)
}

//! # mixpanel-relay-core
//!
//! Delivers analytics events to the Mixpanel HTTP API with bounded retries.
//!
//! This library provides:
//! - Property building and per-family shaping (standard, funnel, profile)
//! - The base64/JSON wire encoding
//! - An HTTP transport that classifies responses
//! - A delivery task that schedules retries through a task queue
//! - Configuration management and logging infrastructure
//!
//! ## Delivery semantics
//!
//! Delivery is at-least-once with a fixed number of retries. Invalid input
//! fails immediately and is never retried. Socket errors and non-`200 OK`
//! responses are retried after a fixed delay until the retry budget is spent.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mixpanel_relay_core::{Config, DeliveryOptions, MemoryQueue, SyncTracker};
//! use serde_json::json;
//!
//! let config = Config::load().expect("failed to load config");
//! let tracker = SyncTracker::new(config, MemoryQueue::new()).expect("failed to build tracker");
//!
//! let outcome = tracker
//!     .track("signup", Some(json!({"plan": "pro"})), DeliveryOptions::default())
//!     .expect("delivery failed");
//! println!("{:?}", outcome);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use delivery::{DeliveryJob, Outcome, SyncTracker, Tracker};
pub use encoder::{EncodedPayload, Envelope};
pub use error::{Error, Result, TransientError};
pub use event::{DeliveryOptions, EventFamily, ProfileOperation, Properties};
pub use queue::{Invocation, MemoryQueue, RetryPolicy, RetryScheduler};
pub use transport::{HttpTransport, Transport};

// Public modules
pub mod config;
pub mod delivery;
pub mod encoder;
pub mod error;
pub mod event;
pub mod logging;
pub mod queue;
pub mod transport;

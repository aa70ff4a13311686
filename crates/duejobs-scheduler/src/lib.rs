//! `duejobs-scheduler`: durable, poll-based job scheduler.
//!
//! # Overview
//!
//! Handlers are registered by name on a [`Scheduler`]. [`Scheduler::schedule`]
//! persists a job record (`due_at`, `type`, JSON `args`, `run_at = NULL`) through
//! a [`JobStore`]. A periodic sweep selects due records, claims each one with a
//! conditional update, then invokes its handler. Failures during a sweep never
//! reach a caller; they go to the configured error observer.
//!
//! | Situation at sweep time         | Record afterwards | Observer                            |
//! |---------------------------------|-------------------|-------------------------------------|
//! | handler succeeded               | claimed           | not called                          |
//! | handler failed or panicked      | claimed           | `HandlerFailure` / `HandlerPanicked` |
//! | stored args are not an array    | claimed           | `MalformedArgs`                     |
//! | type not registered             | still pending     | `UnregisteredJobType`               |
//! | claimed by an overlapping sweep | unchanged         | not called                          |

pub mod db;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod registry;
pub mod sqlite;
pub mod store;
pub mod types;

pub use engine::{ErrorObserver, Scheduler, SchedulerBuilder};
pub use error::{Result, SchedulerError, StoreError};
pub use registry::{JobHandler, JobRegistry};
pub use sqlite::SqliteJobStore;
pub use store::JobStore;
pub use types::{ClaimOutcome, JobId, JobRecord, SweepReport, TableName};

use thiserror::Error;

/// Failures of the durable job store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored row could not be mapped back into a job record.
    #[error("Corrupt job row: {0}")]
    Corrupt(String),

    /// A previous holder of the connection lock panicked.
    #[error("Job store connection lock poisoned")]
    Poisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur within the scheduler subsystem.
///
/// Setup and call-time variants are returned to the caller. Sweep-time
/// variants (`UnregisteredJobType`, `MalformedArgs`, `HandlerFailure`,
/// `HandlerPanicked`) only ever reach the error observer.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A required collaborator is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid interval: {0}ms (must be a non-negative number of milliseconds)")]
    InvalidInterval(i64),

    #[error("Job type already registered: {name}")]
    DuplicateRegistration { name: String },

    /// `schedule` was called with a type that has no handler. Nothing was persisted.
    #[error("Cannot schedule unregistered job: {job_type}")]
    UnregisteredJob { job_type: String },

    /// A due job's type has no handler at sweep time. The job stays pending.
    #[error("No registered job of type {job_type}")]
    UnregisteredJobType { job_type: String },

    /// Arguments passed to `schedule` did not serialize.
    #[error("Invalid job arguments: {0}")]
    InvalidArgs(#[source] serde_json::Error),

    /// Stored arguments are not a JSON array (or null).
    #[error("Malformed stored arguments: {0}")]
    MalformedArgs(String),

    #[error("Job handler {job_type} failed: {source}")]
    HandlerFailure {
        job_type: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Job handler {job_type} panicked: {message}")]
    HandlerPanicked { job_type: String, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// Store-assigned job identifier. Immutable for the lifetime of the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(JobId)
    }
}

/// A persisted job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    /// Earliest instant the job may run. Never mutated after insert.
    pub due_at: DateTime<Utc>,
    /// Registered handler name.
    #[serde(rename = "type")]
    pub job_type: String,
    /// JSON-encoded argument array, decoded only at dispatch.
    pub args: String,
    /// `None` while pending; set exactly once when a sweep claims the job.
    pub run_at: Option<DateTime<Utc>>,
}

/// Result of a conditional claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// `run_at` went from NULL to the claim timestamp.
    Claimed,
    /// `run_at` was already set (or the record is gone); the caller must not dispatch.
    AlreadyClaimed,
}

/// A validated SQL table identifier.
///
/// Table names cannot be bound as statement parameters, so they are restricted
/// to `[A-Za-z_][A-Za-z0-9_]*` before any store ever interpolates them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SchedulerError::Configuration(
                "scheduler requires a non-empty table name".to_string(),
            ));
        }
        let mut chars = name.chars();
        let head_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(SchedulerError::Configuration(format!(
                "invalid table name {name:?}: expected letters, digits and underscores"
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-sweep tally, returned by [`Scheduler::sweep`](crate::Scheduler::sweep).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Jobs returned by the due-job query.
    pub due: usize,
    /// Claimed and handed to their handler without error.
    pub dispatched: usize,
    /// Reported to the error observer (unregistered type, claim error, bad args, handler failure).
    pub failed: usize,
    /// Lost the claim to an overlapping sweep.
    pub skipped: usize,
}

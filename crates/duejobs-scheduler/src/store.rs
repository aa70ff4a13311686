use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::StoreError,
    types::{ClaimOutcome, JobId, JobRecord, TableName},
};

/// Durable table of job records the scheduler reads and writes.
///
/// Implementations must be safe to call concurrently from the sweep loop and
/// from application code, and must bind every value as a statement parameter.
/// `claim` is the only serialization point between overlapping sweeps, so it
/// has to be a single conditional update.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert one pending record (`run_at` NULL) and return its new id.
    async fn insert(
        &self,
        table: &TableName,
        due_at: DateTime<Utc>,
        job_type: &str,
        encoded_args: &str,
    ) -> Result<JobId, StoreError>;

    /// Records with `run_at IS NULL AND due_at < now`.
    async fn select_due(
        &self,
        table: &TableName,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobRecord>, StoreError>;

    /// Set `run_at` only if it is still NULL.
    async fn claim(
        &self,
        table: &TableName,
        job_id: JobId,
        run_at: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError>;

    /// Remove a record. Absent ids are not an error.
    async fn delete(&self, table: &TableName, job_id: JobId) -> Result<(), StoreError>;

    /// Records with `run_at IS NULL`, in store order.
    async fn select_active(&self, table: &TableName) -> Result<Vec<JobRecord>, StoreError>;

    async fn select_by_id(
        &self,
        table: &TableName,
        job_id: JobId,
    ) -> Result<Option<JobRecord>, StoreError>;
}

//! Storage provider contract.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::{JobExecutionError, JobStorageRecord, PendingJobSearchParams, StaleJobSearchParams};

/// Durable storage for job records.
///
/// The dispatcher calls these methods concurrently from several tasks and
/// never locks around them, so implementations must be safe to share.
/// Errors from `get_next_batch`, `on_handler_execution_failure` and
/// `mark_complete` are retried indefinitely; errors from `store` reach the
/// caller that enqueued the job.
pub trait JobStorageProvider<R: JobStorageRecord>: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persist a new record.
    fn store(
        &self,
        record: R,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Fetch up to `params.limit()` records matching the pending predicate,
    /// in the order they should be dispatched.
    fn get_next_batch(
        &self,
        params: PendingJobSearchParams,
    ) -> impl Future<Output = Result<Vec<R>, Self::Error>> + Send;

    /// Called once per failed execution, after the handler errored or was
    /// cancelled by its time limit. The record is left incomplete.
    fn on_handler_execution_failure(
        &self,
        record: &R,
        error: &JobExecutionError,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Persist a record that has been flagged complete.
    fn mark_complete(
        &self,
        record: &R,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Delete (or archive) every record matching the staleness predicate.
    fn purge_stale(
        &self,
        params: StaleJobSearchParams,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

//! In-memory storage provider for tests and single-process use.

use std::sync::{Mutex, MutexGuard};

use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;

use crate::{
    JobExecutionError, JobId, JobRecord, JobStorageProvider, PendingJobSearchParams,
    StaleJobSearchParams,
};

/// Errors from [`MemoryStorage`].
#[derive(Debug, thiserror::Error)]
pub enum MemoryStorageError {
    #[error("storage lock poisoned")]
    Poisoned,

    #[error("Job not found: {0}")]
    NotFound(JobId),
}

/// A failure report captured by [`MemoryStorage`].
#[derive(Debug, Clone, PartialEq)]
pub struct FailureReport {
    pub job_id: JobId,
    pub error: JobExecutionError,
}

/// Storage provider that keeps records in insertion order in memory.
///
/// A failed execution is recorded and the record is rescheduled
/// `retry_delay` (one minute by default) into the future.
#[derive(Debug)]
pub struct MemoryStorage {
    records: Mutex<Vec<JobRecord>>,
    failures: Mutex<Vec<FailureReport>>,
    retry_delay: Duration,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            retry_delay: Duration::minutes(1),
        }
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn records_lock(&self) -> Result<MutexGuard<'_, Vec<JobRecord>>, MemoryStorageError> {
        self.records.lock().map_err(|_| MemoryStorageError::Poisoned)
    }

    /// Snapshot of all stored records.
    pub fn records(&self) -> Vec<JobRecord> {
        self.records_lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Get a record by ID.
    pub fn get(&self, id: JobId) -> Option<JobRecord> {
        self.records_lock()
            .ok()
            .and_then(|r| r.iter().find(|rec| rec.id == id).cloned())
    }

    /// Apply a change to a stored record, e.g. to reschedule it.
    pub fn update<F>(&self, id: JobId, change: F) -> Result<JobRecord, MemoryStorageError>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut records = self.records_lock()?;
        let record = records
            .iter_mut()
            .find(|rec| rec.id == id)
            .ok_or(MemoryStorageError::NotFound(id))?;
        change(record);
        Ok(record.clone())
    }

    /// Failure reports received so far.
    pub fn failures(&self) -> Vec<FailureReport> {
        self.failures
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records_lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobStorageProvider<JobRecord> for MemoryStorage {
    type Error = MemoryStorageError;

    async fn store(&self, record: JobRecord, _cancel: CancellationToken) -> Result<(), Self::Error> {
        self.records_lock()?.push(record);
        Ok(())
    }

    async fn get_next_batch(
        &self,
        params: PendingJobSearchParams,
    ) -> Result<Vec<JobRecord>, Self::Error> {
        let records = self.records_lock()?;
        Ok(records
            .iter()
            .filter(|rec| params.matches(*rec))
            .take(params.limit())
            .cloned()
            .collect())
    }

    async fn on_handler_execution_failure(
        &self,
        record: &JobRecord,
        error: &JobExecutionError,
        _cancel: CancellationToken,
    ) -> Result<(), Self::Error> {
        if let Some(stored) = self.records_lock()?.iter_mut().find(|rec| rec.id == record.id) {
            stored.execute_after = Utc::now() + self.retry_delay;
        }

        self.failures
            .lock()
            .map_err(|_| MemoryStorageError::Poisoned)?
            .push(FailureReport {
                job_id: record.id,
                error: error.clone(),
            });
        Ok(())
    }

    async fn mark_complete(
        &self,
        record: &JobRecord,
        _cancel: CancellationToken,
    ) -> Result<(), Self::Error> {
        let mut records = self.records_lock()?;
        let stored = records
            .iter_mut()
            .find(|rec| rec.id == record.id)
            .ok_or(MemoryStorageError::NotFound(record.id))?;
        stored.is_complete = record.is_complete;
        stored.execute_at = record.execute_at;
        Ok(())
    }

    async fn purge_stale(&self, params: StaleJobSearchParams) -> Result<(), Self::Error> {
        self.records_lock()?.retain(|rec| !params.matches(rec));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JobStorageRecord, QueueId};
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn pending(queue: &QueueId) -> JobRecord {
        let now = Utc::now();
        JobRecord::create(queue.clone(), json!({}), now - Duration::seconds(1), now + Duration::hours(1))
    }

    #[tokio::test]
    async fn next_batch_honors_limit_and_order() {
        let storage = MemoryStorage::new();
        let queue = QueueId::from_job_type("batch");
        let mut ids = Vec::new();
        for _ in 0..5 {
            let rec = pending(&queue);
            ids.push(rec.id);
            storage.store(rec, CancellationToken::new()).await.unwrap();
        }

        let params = PendingJobSearchParams::new(queue, "batch", 3, CancellationToken::new());
        let batch = storage.get_next_batch(params).await.unwrap();
        let got: Vec<_> = batch.iter().map(|r| r.id).collect();
        assert_eq!(got, ids[..3].to_vec());
    }

    #[tokio::test]
    async fn purge_keeps_pending_records() {
        let storage = MemoryStorage::new();
        let queue = QueueId::from_job_type("purge");

        let keep = pending(&queue);
        let mut done = pending(&queue);
        done.mark_complete(Utc::now());
        let keep_id = keep.id;

        storage.store(keep, CancellationToken::new()).await.unwrap();
        storage.store(done, CancellationToken::new()).await.unwrap();

        storage
            .purge_stale(StaleJobSearchParams::new(CancellationToken::new()))
            .await
            .unwrap();

        let left = storage.records();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, keep_id);
    }

    #[tokio::test]
    async fn failure_hook_reschedules_record() {
        let storage = MemoryStorage::new().with_retry_delay(Duration::minutes(5));
        let queue = QueueId::from_job_type("retry");
        let rec = pending(&queue);
        let id = rec.id;
        storage.store(rec.clone(), CancellationToken::new()).await.unwrap();

        storage
            .on_handler_execution_failure(&rec, &JobExecutionError::Cancelled, CancellationToken::new())
            .await
            .unwrap();

        let stored = storage.get(id).unwrap();
        assert!(!stored.is_complete);
        assert!(stored.execute_after > Utc::now() + Duration::minutes(4));
        assert_eq!(
            storage.failures(),
            vec![FailureReport { job_id: id, error: JobExecutionError::Cancelled }]
        );

        let params = PendingJobSearchParams::new(queue, "retry", 10, CancellationToken::new());
        assert!(storage.get_next_batch(params).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_complete_unknown_record_fails() {
        let storage = MemoryStorage::new();
        let rec = pending(&QueueId::from_job_type("missing"));
        let result = storage.mark_complete(&rec, CancellationToken::new()).await;
        assert!(matches!(result, Err(MemoryStorageError::NotFound(_))));
    }
}

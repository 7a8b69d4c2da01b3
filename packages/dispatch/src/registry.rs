//! Registry of dispatchers, keyed by job type.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use jobqueue_core::{Job, JobStorageProvider, JobStorageRecord, QueueError};
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;

/// Maps each registered job type to its dispatcher.
///
/// Enqueue goes through here so callers never hold a dispatcher directly.
pub struct QueueRegistry<R, S> {
    dispatchers: RwLock<HashMap<&'static str, Arc<Dispatcher<R, S>>>>,
}

impl<R, S> QueueRegistry<R, S>
where
    R: JobStorageRecord,
    S: JobStorageProvider<R>,
{
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            dispatchers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a dispatcher under its job type.
    pub fn register(&self, dispatcher: Arc<Dispatcher<R, S>>) -> Result<(), QueueError> {
        let mut dispatchers = self
            .dispatchers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let job_type = dispatcher.job_type();
        if dispatchers.contains_key(job_type) {
            return Err(QueueError::DuplicateJobType(job_type.to_string()));
        }

        dispatchers.insert(job_type, dispatcher);
        Ok(())
    }

    /// Get the dispatcher for a job type.
    pub fn get(&self, job_type: &str) -> Option<Arc<Dispatcher<R, S>>> {
        self.dispatchers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_type)
            .cloned()
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.dispatchers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(job_type)
    }

    /// List all registered job types.
    pub fn job_types(&self) -> Vec<&'static str> {
        self.dispatchers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// Route a job to the dispatcher for its type.
    ///
    /// Fails with [`QueueError::NotRegistered`] when no dispatcher exists for
    /// `J`. Nothing is stored in that case.
    pub async fn enqueue<J: Job>(
        &self,
        job: &J,
        execute_after: Option<DateTime<Utc>>,
        expire_on: Option<DateTime<Utc>>,
        cancel: CancellationToken,
    ) -> Result<(), QueueError> {
        let dispatcher = self
            .get(J::job_type())
            .ok_or_else(|| QueueError::NotRegistered(J::job_type().to_string()))?;

        let job_data = serde_json::to_value(job)?;
        dispatcher
            .store(job_data, execute_after, expire_on, cancel)
            .await
    }
}

impl<R, S> Default for QueueRegistry<R, S>
where
    R: JobStorageRecord,
    S: JobStorageProvider<R>,
{
    fn default() -> Self {
        Self::new()
    }
}

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jobqueue::{
    CancellationToken, Job, JobExecutionError, JobRecord, JobStorageProvider, MemoryStorage,
    MemoryStorageError, PendingJobSearchParams, StaleJobSearchParams,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ping {
    pub n: u32,
}

impl Job for Ping {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slow {
    pub millis: u64,
}

impl Job for Slow {}

#[derive(Debug, thiserror::Error)]
pub enum TestStorageError {
    #[error("injected {0} failure")]
    Injected(&'static str),

    #[error(transparent)]
    Memory(#[from] MemoryStorageError),
}

/// Memory storage that counts calls and fails a configurable number of times.
#[derive(Default)]
pub struct TestStorage {
    pub inner: MemoryStorage,
    fetch_failures: AtomicUsize,
    hook_failures: AtomicUsize,
    mark_failures: AtomicUsize,
    purge_fails: AtomicBool,
    fetches: Mutex<Vec<Instant>>,
    hook_calls: AtomicUsize,
    mark_calls: AtomicUsize,
    purge_calls: AtomicUsize,
}

impl TestStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_fetches(&self, times: usize) {
        self.fetch_failures.store(times, Ordering::SeqCst);
    }

    pub fn fail_hooks(&self, times: usize) {
        self.hook_failures.store(times, Ordering::SeqCst);
    }

    pub fn fail_marks(&self, times: usize) {
        self.mark_failures.store(times, Ordering::SeqCst);
    }

    pub fn fail_purges(&self) {
        self.purge_fails.store(true, Ordering::SeqCst);
    }

    /// Tokio instants at which `get_next_batch` was called.
    pub fn fetches(&self) -> Vec<Instant> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub fn hook_calls(&self) -> usize {
        self.hook_calls.load(Ordering::SeqCst)
    }

    pub fn mark_calls(&self) -> usize {
        self.mark_calls.load(Ordering::SeqCst)
    }

    pub fn purge_calls(&self) -> usize {
        self.purge_calls.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.inner.records().iter().filter(|r| r.is_complete).count()
    }
}

/// Consume one injected failure if any remain.
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl JobStorageProvider<JobRecord> for TestStorage {
    type Error = TestStorageError;

    async fn store(&self, record: JobRecord, cancel: CancellationToken) -> Result<(), Self::Error> {
        Ok(self.inner.store(record, cancel).await?)
    }

    async fn get_next_batch(
        &self,
        params: PendingJobSearchParams,
    ) -> Result<Vec<JobRecord>, Self::Error> {
        self.fetches.lock().unwrap().push(Instant::now());
        if take_failure(&self.fetch_failures) {
            return Err(TestStorageError::Injected("fetch"));
        }
        Ok(self.inner.get_next_batch(params).await?)
    }

    async fn on_handler_execution_failure(
        &self,
        record: &JobRecord,
        error: &JobExecutionError,
        cancel: CancellationToken,
    ) -> Result<(), Self::Error> {
        self.hook_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.hook_failures) {
            return Err(TestStorageError::Injected("failure hook"));
        }
        Ok(self
            .inner
            .on_handler_execution_failure(record, error, cancel)
            .await?)
    }

    async fn mark_complete(
        &self,
        record: &JobRecord,
        cancel: CancellationToken,
    ) -> Result<(), Self::Error> {
        self.mark_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.mark_failures) {
            return Err(TestStorageError::Injected("mark complete"));
        }
        Ok(self.inner.mark_complete(record, cancel).await?)
    }

    async fn purge_stale(&self, params: StaleJobSearchParams) -> Result<(), Self::Error> {
        self.purge_calls.fetch_add(1, Ordering::SeqCst);
        if self.purge_fails.load(Ordering::SeqCst) {
            return Err(TestStorageError::Injected("purge"));
        }
        Ok(self.inner.purge_stale(params).await?)
    }
}

/// Sleep in small steps until `check` passes or `limit` elapses.
pub async fn wait_until(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

//! Per job type dispatcher: polls storage, executes batches and reports outcomes.

use std::any::Any;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream;
use futures_util::{FutureExt, StreamExt};
use jobqueue_core::{
    JobExecutionError, JobStorageProvider, JobStorageRecord, PendingJobSearchParams, QueueError,
    QueueId, default_expiry,
};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::handler::ErasedHandler;

/// Delay between retries of a failed storage operation.
pub const STORAGE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// How long an idle dispatcher that has stored jobs waits before re-polling.
///
/// Picks up records whose `execute_after` was moved into the past by
/// something other than a new enqueue.
pub const IDLE_REPOLL_INTERVAL: Duration = Duration::from_secs(60);

/// Owns the lifecycle of one job type's records, from eligibility to completion.
///
/// Inert until [`Dispatcher::set_execution_limits`] starts its poll loop.
pub struct Dispatcher<R, S> {
    job_type: &'static str,
    queue_id: QueueId,
    storage: Arc<S>,
    handler: Arc<dyn ErasedHandler>,
    /// Released by `store` so an idle loop re-polls right away.
    wake: Notify,
    /// Set once the first job has been stored.
    in_use: AtomicBool,
    started: AtomicBool,
    shutdown: CancellationToken,
    _record: PhantomData<fn() -> R>,
}

impl<R, S> Dispatcher<R, S>
where
    R: JobStorageRecord,
    S: JobStorageProvider<R>,
{
    pub(crate) fn new(
        job_type: &'static str,
        storage: Arc<S>,
        handler: Arc<dyn ErasedHandler>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            job_type,
            queue_id: QueueId::from_job_type(job_type),
            storage,
            handler,
            wake: Notify::new(),
            in_use: AtomicBool::new(false),
            started: AtomicBool::new(false),
            shutdown,
            _record: PhantomData,
        }
    }

    /// Name of the job type this dispatcher serves.
    pub fn job_type(&self) -> &'static str {
        self.job_type
    }

    pub fn queue_id(&self) -> &QueueId {
        &self.queue_id
    }

    /// Whether the poll loop has been started.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Persist a new record for this job type and wake the poll loop.
    ///
    /// `execute_after` defaults to now and `expire_on` to now plus one day.
    /// Storage errors are returned to the caller.
    pub async fn store(
        &self,
        job_data: serde_json::Value,
        execute_after: Option<DateTime<Utc>>,
        expire_on: Option<DateTime<Utc>>,
        cancel: CancellationToken,
    ) -> Result<(), QueueError> {
        self.in_use.store(true, Ordering::Release);

        let now = Utc::now();
        let record = R::create(
            self.queue_id.clone(),
            job_data,
            execute_after.unwrap_or(now),
            expire_on.unwrap_or(now + default_expiry()),
        );

        self.storage
            .store(record, cancel)
            .await
            .map_err(QueueError::storage)?;

        tracing::debug!(queue_id = %self.queue_id, job_type = self.job_type, "Job stored");
        self.wake.notify_one();
        Ok(())
    }

    /// Apply execution limits and start the poll loop.
    ///
    /// May only be called once per dispatcher.
    pub fn set_execution_limits(
        self: &Arc<Self>,
        max_concurrency: usize,
        execution_time_limit: Option<Duration>,
    ) -> Result<JoinHandle<()>, QueueError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(QueueError::AlreadyStarted(self.job_type.to_string()));
        }

        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            this.run(max_concurrency.max(1), execution_time_limit).await;
        }))
    }

    async fn run(&self, max_concurrency: usize, execution_time_limit: Option<Duration>) {
        let batch_size = max_concurrency * 2;

        tracing::info!(
            "Job queue started for [queue-id:{}]({}) with max_concurrency={}, time_limit={:?}",
            self.queue_id,
            self.job_type,
            max_concurrency,
            execution_time_limit
        );

        while !self.shutdown.is_cancelled() {
            let params = PendingJobSearchParams::new(
                self.queue_id.clone(),
                self.job_type,
                batch_size,
                self.shutdown.clone(),
            );

            let records = match self.storage.get_next_batch(params).await {
                Ok(records) => records,
                Err(e) => {
                    tracing::error!(
                        queue_id = %self.queue_id,
                        job_type = self.job_type,
                        "Job storage 'get-next-batch' error for [queue-id:{}]({}): {}. Retrying in 5 seconds...",
                        self.queue_id,
                        self.job_type,
                        e
                    );
                    self.backoff().await;
                    continue;
                }
            };

            if records.is_empty() {
                self.wait_for_work().await;
                continue;
            }

            tracing::debug!(
                queue_id = %self.queue_id,
                job_type = self.job_type,
                "Executing batch of {}",
                records.len()
            );

            stream::iter(records)
                .for_each_concurrent(max_concurrency, |record| {
                    self.execute(record, execution_time_limit)
                })
                .await;
        }

        tracing::info!(
            "Job queue stopped for [queue-id:{}]({})",
            self.queue_id,
            self.job_type
        );
    }

    /// Block until a new job is stored, or the re-poll interval passes if
    /// this dispatcher has ever stored a job.
    async fn wait_for_work(&self) {
        if self.in_use.load(Ordering::Acquire) {
            tokio::select! {
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(IDLE_REPOLL_INTERVAL) => {}
                _ = self.shutdown.cancelled() => {}
            }
        } else {
            tokio::select! {
                _ = self.wake.notified() => {}
                _ = self.shutdown.cancelled() => {}
            }
        }
    }

    async fn backoff(&self) {
        tokio::select! {
            _ = tokio::time::sleep(STORAGE_RETRY_DELAY) => {}
            _ = self.shutdown.cancelled() => {}
        }
    }

    async fn execute(&self, mut record: R, execution_time_limit: Option<Duration>) {
        if self.shutdown.is_cancelled() {
            return;
        }

        if let Err(error) = self.invoke_handler(&record, execution_time_limit).await {
            tracing::error!(
                critical = true,
                queue_id = %self.queue_id,
                job_type = self.job_type,
                "Job [{}] 'execution' error: [{}]",
                self.job_type,
                error
            );

            while !self.shutdown.is_cancelled() {
                match self
                    .storage
                    .on_handler_execution_failure(&record, &error, self.shutdown.clone())
                    .await
                {
                    Ok(()) => break,
                    Err(e) => {
                        tracing::error!(
                            queue_id = %self.queue_id,
                            job_type = self.job_type,
                            "Job storage 'on-execution-failure' error for [queue-id:{}]({}): {}. Retrying in 5 seconds...",
                            self.queue_id,
                            self.job_type,
                            e
                        );
                        self.backoff().await;
                    }
                }
            }

            return;
        }

        while !self.shutdown.is_cancelled() {
            record.mark_complete(Utc::now());

            match self
                .storage
                .mark_complete(&record, self.shutdown.clone())
                .await
            {
                Ok(()) => break,
                Err(e) => {
                    tracing::error!(
                        queue_id = %self.queue_id,
                        job_type = self.job_type,
                        "Job storage 'mark-as-complete' error for [queue-id:{}]({}): {}. Retrying in 5 seconds...",
                        self.queue_id,
                        self.job_type,
                        e
                    );
                    self.backoff().await;
                }
            }
        }
    }

    /// Run the handler under the execution time limit.
    ///
    /// When the limit elapses the handler's token fires and its future is
    /// dropped. A panic in the handler becomes [`JobExecutionError::Panicked`].
    async fn invoke_handler(
        &self,
        record: &R,
        execution_time_limit: Option<Duration>,
    ) -> Result<(), JobExecutionError> {
        let cancel = CancellationToken::new();
        let started = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.handler.execute(record.job_data(), cancel.clone())
        }));
        let execution = match started {
            Ok(execution) => execution?,
            Err(payload) => return Err(JobExecutionError::Panicked(panic_message(&*payload))),
        };

        let execution = AssertUnwindSafe(execution)
            .catch_unwind()
            .map(|outcome| match outcome {
                Ok(result) => result.map_err(JobExecutionError::Handler),
                Err(payload) => Err(JobExecutionError::Panicked(panic_message(&*payload))),
            });

        let Some(limit) = execution_time_limit else {
            return execution.await;
        };

        tokio::select! {
            biased;
            result = execution => result,
            _ = tokio::time::sleep(limit) => {
                cancel.cancel();
                Err(JobExecutionError::Cancelled)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

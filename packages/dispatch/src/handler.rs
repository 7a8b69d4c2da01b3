//! Job handler trait and the type-erased adapter the dispatcher runs.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use jobqueue_core::{Job, JobExecutionError};
use tokio_util::sync::CancellationToken;

/// Result type for job handlers.
pub type HandlerResult = Result<(), String>;

/// Future type for async job handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Trait for job handlers.
///
/// Implement this trait to define how jobs of type `J` are processed. The
/// cancellation token fires when the execution time limit configured for the
/// job type elapses.
pub trait JobHandler<J: Job>: Send + Sync + 'static {
    /// Process a job.
    fn handle(&self, job: J, cancel: CancellationToken) -> HandlerFuture;
}

/// A simple function-based job handler.
pub struct FnHandler<J, F> {
    handler: F,
    _job: PhantomData<fn(J)>,
}

impl<J, F> FnHandler<J, F>
where
    J: Job,
    F: Fn(J, CancellationToken) -> HandlerFuture + Send + Sync + 'static,
{
    /// Create a new function-based handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _job: PhantomData,
        }
    }
}

impl<J, F> JobHandler<J> for FnHandler<J, F>
where
    J: Job,
    F: Fn(J, CancellationToken) -> HandlerFuture + Send + Sync + 'static,
{
    fn handle(&self, job: J, cancel: CancellationToken) -> HandlerFuture {
        (self.handler)(job, cancel)
    }
}

/// Helper macro for creating job handlers from async blocks.
///
/// ```ignore
/// let handler = job_handler!(|job: SendEmail, cancel| {
///     mailer.send(&job.to).await.map_err(|e| e.to_string())
/// });
/// ```
#[macro_export]
macro_rules! job_handler {
    (|$job:ident : $ty:ty, $cancel:ident| $body:expr) => {
        $crate::FnHandler::new(
            move |$job: $ty, $cancel: $crate::CancellationToken| -> $crate::HandlerFuture {
                Box::pin(async move { $body })
            },
        )
    };
}

/// Resolves a handler instance for one execution.
type Resolver<J> = Box<dyn Fn() -> Arc<dyn JobHandler<J>> + Send + Sync>;

/// Handler with the job type erased, as held by a dispatcher.
pub(crate) trait ErasedHandler: Send + Sync + 'static {
    /// Decode the payload and start the handler on it.
    fn execute(
        &self,
        job_data: &serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<HandlerFuture, JobExecutionError>;
}

/// Decodes payloads into `J` and runs a freshly resolved handler for each record.
pub(crate) struct TypedHandler<J: Job> {
    resolve: Resolver<J>,
}

impl<J: Job> TypedHandler<J> {
    /// One handler instance shared by every execution.
    pub(crate) fn shared<H: JobHandler<J>>(handler: H) -> Self {
        let handler: Arc<dyn JobHandler<J>> = Arc::new(handler);
        Self {
            resolve: Box::new(move || handler.clone()),
        }
    }

    /// A new handler instance per execution, dropped once it finishes.
    pub(crate) fn scoped<H, F>(factory: F) -> Self
    where
        H: JobHandler<J>,
        F: Fn() -> H + Send + Sync + 'static,
    {
        Self {
            resolve: Box::new(move || Arc::new(factory()) as Arc<dyn JobHandler<J>>),
        }
    }
}

impl<J: Job> ErasedHandler for TypedHandler<J> {
    fn execute(
        &self,
        job_data: &serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<HandlerFuture, JobExecutionError> {
        let job: J = serde_json::from_value(job_data.clone())
            .map_err(|e| JobExecutionError::Decode(e.to_string()))?;

        let handler = (self.resolve)();
        let execution = handler.handle(job, cancel);

        Ok(Box::pin(async move {
            let result = execution.await;
            drop(handler);
            result
        }))
    }
}

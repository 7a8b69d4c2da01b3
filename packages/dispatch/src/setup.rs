//! Startup wiring: registers job types, applies limits and spawns the purger.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jobqueue_core::{Job, JobStorageProvider, JobStorageRecord, QueueError, QueueOptions};
use ractor::{Actor, ActorRef};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;
use crate::handler::{ErasedHandler, JobHandler, TypedHandler};
use crate::messages::PurgerMessage;
use crate::purger::{DEFAULT_PURGE_INTERVAL, PurgerArgs, StalePurger};
use crate::registry::QueueRegistry;

/// Collects handlers and options before the queues start.
pub struct JobQueuesBuilder<R, S> {
    storage: Arc<S>,
    options: QueueOptions,
    purge_interval: Duration,
    handlers: Vec<(&'static str, Arc<dyn ErasedHandler>)>,
    _record: PhantomData<fn() -> R>,
}

impl<R, S> JobQueuesBuilder<R, S>
where
    R: JobStorageRecord,
    S: JobStorageProvider<R>,
{
    /// Register a handler instance shared by every execution of `J`.
    pub fn register<J: Job>(mut self, handler: impl JobHandler<J>) -> Self {
        let handler: Arc<dyn ErasedHandler> = Arc::new(TypedHandler::<J>::shared(handler));
        self.handlers.push((J::job_type(), handler));
        self
    }

    /// Register a factory that builds a fresh handler for each execution of `J`.
    pub fn register_scoped<J, H>(mut self, factory: impl Fn() -> H + Send + Sync + 'static) -> Self
    where
        J: Job,
        H: JobHandler<J>,
    {
        let handler: Arc<dyn ErasedHandler> = Arc::new(TypedHandler::<J>::scoped(factory));
        self.handlers.push((J::job_type(), handler));
        self
    }

    pub fn options(mut self, options: QueueOptions) -> Self {
        self.options = options;
        self
    }

    /// Time between stale record purges. Defaults to one hour.
    pub fn purge_interval(mut self, interval: Duration) -> Self {
        self.purge_interval = interval;
        self
    }

    /// Create a dispatcher per registered job type, start each with its
    /// resolved limits, then spawn the purger.
    ///
    /// Every dispatcher is registered before any is started. Cancelling
    /// `shutdown` stops all of them.
    pub async fn start(self, shutdown: CancellationToken) -> Result<JobQueues<R, S>, QueueError> {
        if self.handlers.is_empty() {
            return Err(QueueError::NoJobTypes);
        }

        let shutdown = shutdown.child_token();
        let registry = Arc::new(QueueRegistry::new());
        let mut dispatchers = Vec::with_capacity(self.handlers.len());

        for (job_type, handler) in self.handlers {
            let dispatcher = Arc::new(Dispatcher::new(
                job_type,
                self.storage.clone(),
                handler,
                shutdown.clone(),
            ));
            registry.register(dispatcher.clone())?;
            dispatchers.push(dispatcher);
        }

        let mut handles = Vec::with_capacity(dispatchers.len());
        for dispatcher in &dispatchers {
            let limits = self.options.resolve(dispatcher.job_type());
            handles.push(
                dispatcher
                    .set_execution_limits(limits.max_concurrency, limits.execution_time_limit())?,
            );
        }

        let args = PurgerArgs {
            storage: self.storage,
            interval: self.purge_interval,
            shutdown: shutdown.clone(),
        };
        let (purger, purger_handle) = Actor::spawn(None, StalePurger::<R, S>::new(), args)
            .await
            .map_err(|e| QueueError::Actor(format!("Failed to spawn purger: {}", e)))?;

        tracing::info!("Job queues started for {} job types", dispatchers.len());

        Ok(JobQueues {
            registry,
            purger,
            purger_handle,
            handles,
            shutdown,
        })
    }
}

/// Running job queues.
pub struct JobQueues<R, S> {
    registry: Arc<QueueRegistry<R, S>>,
    purger: ActorRef<PurgerMessage>,
    purger_handle: JoinHandle<()>,
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl<R, S> JobQueues<R, S>
where
    R: JobStorageRecord,
    S: JobStorageProvider<R>,
{
    pub fn builder(storage: Arc<S>) -> JobQueuesBuilder<R, S> {
        JobQueuesBuilder {
            storage,
            options: QueueOptions::default(),
            purge_interval: DEFAULT_PURGE_INTERVAL,
            handlers: Vec::new(),
            _record: PhantomData,
        }
    }

    /// The registry routing jobs to dispatchers.
    pub fn registry(&self) -> Arc<QueueRegistry<R, S>> {
        self.registry.clone()
    }

    /// Enqueue a job. See [`QueueRegistry::enqueue`].
    pub async fn enqueue<J: Job>(
        &self,
        job: &J,
        execute_after: Option<DateTime<Utc>>,
        expire_on: Option<DateTime<Utc>>,
        cancel: CancellationToken,
    ) -> Result<(), QueueError> {
        self.registry
            .enqueue(job, execute_after, expire_on, cancel)
            .await
    }

    /// Run a purge pass outside the regular schedule.
    ///
    /// Returns whether storage reported success.
    pub async fn purge_now(&self) -> Result<bool, QueueError> {
        let result =
            ractor::rpc::call(&self.purger, |reply| PurgerMessage::PurgeNow { reply }, None).await;

        match result {
            Ok(ractor::rpc::CallResult::Success(purged)) => Ok(purged),
            Ok(ractor::rpc::CallResult::Timeout) => Err(QueueError::Actor("Purge timed out".into())),
            Ok(ractor::rpc::CallResult::SenderError) => {
                Err(QueueError::Actor("Purger dropped the reply".into()))
            }
            Err(e) => Err(QueueError::Actor(format!("Failed to reach purger: {}", e))),
        }
    }

    /// Stop every dispatcher and the purger, and wait for them to finish.
    ///
    /// Handlers already running are allowed to finish, but their outcome is
    /// not written back, so those records run again after restart.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down job queues");
        self.shutdown.cancel();

        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!("Dispatcher task ended abnormally: {}", e);
            }
        }

        if let Err(e) = self.purger_handle.await {
            tracing::warn!("Purger task ended abnormally: {}", e);
        }
    }
}

//! Background job dispatch.
//!
//! One dispatcher per registered job type polls storage for eligible
//! records, runs them with bounded concurrency and an optional time limit,
//! and writes the outcome back. A Ractor actor purges stale records.
//!
//! # Architecture
//!
//! - `Dispatcher` - Poll loop, batch execution and storage retries for one job type
//! - `QueueRegistry` - Routes enqueued jobs to their dispatcher
//! - `StalePurger` - Actor that deletes complete and expired records
//! - `JobQueues` - Startup wiring and shutdown
//!
//! # Usage
//!
//! ```ignore
//! use jobqueue::{CancellationToken, JobQueues, MemoryStorage, job_handler};
//!
//! let shutdown = CancellationToken::new();
//! let queues = JobQueues::builder(Arc::new(MemoryStorage::new()))
//!     .register(job_handler!(|job: SendEmail, _cancel| {
//!         mailer.send(&job.to).await.map_err(|e| e.to_string())
//!     }))
//!     .start(shutdown.clone())
//!     .await?;
//!
//! queues.enqueue(&SendEmail { to }, None, None, CancellationToken::new()).await?;
//! ```

mod dispatcher;
mod handler;
mod messages;
mod purger;
mod registry;
mod setup;

pub use dispatcher::{Dispatcher, IDLE_REPOLL_INTERVAL, STORAGE_RETRY_DELAY};
pub use handler::{FnHandler, HandlerFuture, HandlerResult, JobHandler};
pub use messages::PurgerMessage;
pub use purger::{DEFAULT_PURGE_INTERVAL, PurgerArgs, PurgerState, StalePurger};
pub use registry::QueueRegistry;
pub use setup::{JobQueues, JobQueuesBuilder};

pub use jobqueue_core::*;

/// Re-export the cancellation token handed to handlers and storage.
pub use tokio_util::sync::CancellationToken;

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort};

//! Core types for the job queue.
//!
//! This crate contains the pieces shared by the dispatcher and by storage
//! providers:
//! - Job, JobId and QueueId for typed work and its partitioning
//! - JobStorageRecord and JobRecord for the durable representation
//! - Search parameters and the JobStorageProvider contract
//! - QueueOptions for execution limits
//! - MemoryStorage, an in-process provider

mod error;
mod job;
mod memory;
mod options;
mod params;
mod queue;
mod record;
mod storage;

pub use error::{BoxError, JobExecutionError, QueueError};
pub use job::{Job, JobId};
pub use memory::{FailureReport, MemoryStorage, MemoryStorageError};
pub use options::{QueueLimits, QueueOptions};
pub use params::{PendingJobSearchParams, StaleJobSearchParams};
pub use queue::QueueId;
pub use record::{JobRecord, JobStorageRecord, default_expiry};
pub use storage::JobStorageProvider;

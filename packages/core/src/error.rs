//! Error types shared by the queue packages.

/// Boxed storage provider error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced to callers of the queue API and startup code.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("A job queue has not been registered for [{0}]")]
    NotRegistered(String),

    #[error("A job queue is already registered for [{0}]")]
    DuplicateJobType(String),

    #[error("No job types have been registered")]
    NoJobTypes,

    #[error("Execution limits already set for [{0}]")]
    AlreadyStarted(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(BoxError),

    #[error("Actor error: {0}")]
    Actor(String),
}

impl QueueError {
    /// Wrap a storage provider error.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage(Box::new(err))
    }
}

/// Why a job execution failed. Handed to the storage failure hook.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobExecutionError {
    /// The handler returned an error.
    #[error("{0}")]
    Handler(String),

    /// The stored payload could not be decoded into the job type.
    #[error("Failed to decode job data: {0}")]
    Decode(String),

    /// The handler panicked.
    #[error("Handler panicked: {0}")]
    Panicked(String),

    /// The execution time limit elapsed before the handler finished.
    #[error("The operation was canceled")]
    Cancelled,
}

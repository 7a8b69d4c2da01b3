//! Job domain types: the typed unit of work and its record identifier.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use ulid::Ulid;

use crate::QueueId;

/// Unique identifier for a stored job record, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A typed unit of deferred work.
///
/// Every job type gets its own dispatcher, concurrency budget and queue
/// identifier. The payload is serialized to JSON when stored and decoded
/// back into the concrete type right before its handler runs.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct SendWelcomeEmail { user_id: u64 }
///
/// impl Job for SendWelcomeEmail {
///     fn job_type() -> &'static str { "accounts.send_welcome_email" }
/// }
/// ```
pub trait Job: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name used to route and partition jobs of this type.
    ///
    /// Defaults to the fully-qualified type name. Override it when records
    /// must survive the type being moved or renamed.
    fn job_type() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue identifier derived from [`Job::job_type`].
    fn queue_id() -> QueueId {
        QueueId::from_job_type(Self::job_type())
    }
}

//! Durable representation of a queued job.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, QueueId};

/// How long a job stays eligible when the caller gives no expiry.
pub fn default_expiry() -> Duration {
    Duration::days(1)
}

/// Record type a storage provider persists.
///
/// Providers may bring their own record type (extra columns, native ids) as
/// long as it exposes the scheduling fields the dispatcher needs.
pub trait JobStorageRecord: Clone + Send + Sync + 'static {
    /// Build a fresh, not yet complete record.
    fn create(
        queue_id: QueueId,
        job_data: serde_json::Value,
        execute_after: DateTime<Utc>,
        expire_on: DateTime<Utc>,
    ) -> Self;

    fn queue_id(&self) -> &QueueId;

    fn job_data(&self) -> &serde_json::Value;

    /// The record is not eligible before this instant.
    fn execute_after(&self) -> DateTime<Utc>;

    /// The record is stale after this instant.
    fn expire_on(&self) -> DateTime<Utc>;

    /// When execution completed, if it has.
    fn execute_at(&self) -> Option<DateTime<Utc>>;

    fn is_complete(&self) -> bool;

    /// Flag the record as complete as of `at`.
    fn mark_complete(&mut self, at: DateTime<Utc>);

    /// Eligible iff not complete and `execute_after <= now <= expire_on`.
    fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        !self.is_complete() && self.execute_after() <= now && now <= self.expire_on()
    }

    /// Stale iff complete or `now > expire_on`.
    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.is_complete() || now > self.expire_on()
    }
}

/// Default record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique identifier for this record.
    pub id: JobId,
    /// Queue of the job type this record belongs to.
    pub queue_id: QueueId,
    /// Job payload as JSON.
    pub job_data: serde_json::Value,
    pub execute_after: DateTime<Utc>,
    pub expire_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_complete: bool,
}

impl JobStorageRecord for JobRecord {
    fn create(
        queue_id: QueueId,
        job_data: serde_json::Value,
        execute_after: DateTime<Utc>,
        expire_on: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            queue_id,
            job_data,
            execute_after,
            expire_on,
            execute_at: None,
            is_complete: false,
        }
    }

    fn queue_id(&self) -> &QueueId {
        &self.queue_id
    }

    fn job_data(&self) -> &serde_json::Value {
        &self.job_data
    }

    fn execute_after(&self) -> DateTime<Utc> {
        self.execute_after
    }

    fn expire_on(&self) -> DateTime<Utc> {
        self.expire_on
    }

    fn execute_at(&self) -> Option<DateTime<Utc>> {
        self.execute_at
    }

    fn is_complete(&self) -> bool {
        self.is_complete
    }

    fn mark_complete(&mut self, at: DateTime<Utc>) {
        self.is_complete = true;
        self.execute_at = Some(at);
    }
}

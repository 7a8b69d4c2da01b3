//! Search parameters handed to storage providers.
//!
//! The predicates are fixed: providers translate them into their native query
//! language (or call [`PendingJobSearchParams::matches`] directly) but cannot
//! change them, since every field is private.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::{JobStorageRecord, QueueId};

/// Parameters for fetching the next batch of pending records.
///
/// A record matches when
/// `record.queue_id == queue_id && !record.is_complete && execute_after <= now <= expire_on`.
#[derive(Debug, Clone)]
pub struct PendingJobSearchParams {
    queue_id: QueueId,
    job_type: &'static str,
    limit: usize,
    now: DateTime<Utc>,
    cancel: CancellationToken,
}

impl PendingJobSearchParams {
    pub fn new(
        queue_id: QueueId,
        job_type: &'static str,
        limit: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue_id,
            job_type,
            limit,
            now: Utc::now(),
            cancel,
        }
    }

    /// Queue to fetch records for.
    pub fn queue_id(&self) -> &QueueId {
        &self.queue_id
    }

    /// Name of the job type behind the queue.
    pub fn job_type(&self) -> &'static str {
        self.job_type
    }

    /// Maximum number of records to return.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Instant the eligibility window is evaluated at.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Evaluate the pending predicate against a record.
    pub fn matches<R: JobStorageRecord>(&self, record: &R) -> bool {
        record.queue_id() == &self.queue_id && record.is_eligible(self.now)
    }
}

/// Parameters for purging stale records.
///
/// A record matches when `record.is_complete || now > record.expire_on`.
#[derive(Debug, Clone)]
pub struct StaleJobSearchParams {
    now: DateTime<Utc>,
    cancel: CancellationToken,
}

impl StaleJobSearchParams {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            now: Utc::now(),
            cancel,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Evaluate the staleness predicate against a record.
    pub fn matches<R: JobStorageRecord>(&self, record: &R) -> bool {
        record.is_stale(self.now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JobRecord;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn pending_params_respect_queue_id() {
        let now = Utc::now();
        let ours = QueueId::from_job_type("ours");
        let theirs = QueueId::from_job_type("theirs");
        let params = PendingJobSearchParams::new(ours.clone(), "ours", 4, CancellationToken::new());

        let mine = JobRecord::create(ours, json!(1), now - Duration::seconds(1), now + Duration::hours(1));
        let other = JobRecord::create(theirs, json!(2), now - Duration::seconds(1), now + Duration::hours(1));

        assert!(params.matches(&mine));
        assert!(!params.matches(&other));
        assert_eq!(params.limit(), 4);
        assert_eq!(params.job_type(), "ours");
    }

    #[test]
    fn stale_params_match_complete_and_expired_only() {
        let params = StaleJobSearchParams::new(CancellationToken::new());
        let now = params.now();
        let queue = QueueId::from_job_type("q");

        let mut complete = JobRecord::create(queue.clone(), json!(null), now, now + Duration::hours(1));
        complete.mark_complete(now);
        let expired = JobRecord::create(queue.clone(), json!(null), now - Duration::hours(2), now - Duration::hours(1));
        let pending = JobRecord::create(queue, json!(null), now, now + Duration::hours(1));

        assert!(params.matches(&complete));
        assert!(params.matches(&expired));
        assert!(!params.matches(&pending));
    }
}

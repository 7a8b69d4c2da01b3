//! Job record repository, the SurrealDB storage provider.

use chrono::{DateTime, Duration, Utc};
use jobqueue_core::{
    JobExecutionError, JobId, JobRecord, JobStorageProvider, PendingJobSearchParams, QueueId,
    StaleJobSearchParams,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{Database, DbError};

/// Repository for job record persistence.
///
/// Implements [`JobStorageProvider`] so it can back a job queue directly.
/// A failed execution pushes the record's `execute_after` forward by
/// `retry_delay` (one minute by default).
#[derive(Clone)]
pub struct JobRepository {
    db: Database,
    retry_delay: Duration,
}

/// Row layout stored in the `job_record` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobRow {
    job_id: String,
    queue_id: String,
    job_data: serde_json::Value,
    execute_after_ms: i64,
    expire_on_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    execute_at_ms: Option<i64>,
    #[serde(default)]
    is_complete: bool,
    #[serde(default)]
    failure_count: i64,
}

impl JobRow {
    fn from_record(record: &JobRecord) -> Self {
        Self {
            job_id: record.id.to_string(),
            queue_id: record.queue_id.to_string(),
            job_data: record.job_data.clone(),
            execute_after_ms: record.execute_after.timestamp_millis(),
            expire_on_ms: record.expire_on.timestamp_millis(),
            execute_at_ms: record.execute_at.map(|t| t.timestamp_millis()),
            is_complete: record.is_complete,
            failure_count: 0,
        }
    }

    fn into_record(self) -> Result<JobRecord, DbError> {
        let id = JobId::parse(&self.job_id)
            .map_err(|e| DbError::Serialization(format!("Invalid job id {}: {}", self.job_id, e)))?;

        Ok(JobRecord {
            id,
            queue_id: QueueId::from_raw(self.queue_id),
            job_data: self.job_data,
            execute_after: from_millis(self.execute_after_ms)?,
            expire_on: from_millis(self.expire_on_ms)?,
            execute_at: self.execute_at_ms.map(from_millis).transpose()?,
            is_complete: self.is_complete,
        })
    }
}

/// Columns returned for record reads. Leaves out the SurrealDB record id.
const ROW_FIELDS: &str =
    "job_id, queue_id, job_data, execute_after_ms, expire_on_ms, execute_at_ms, is_complete, failure_count";

#[derive(Debug, Deserialize)]
struct Touched {
    #[allow(dead_code)]
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: i64,
}

/// Failure details recorded by the failure hook.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FailureInfo {
    pub failure_count: i64,
    pub last_error: Option<String>,
    pub failed_at_ms: Option<i64>,
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| DbError::Serialization(format!("Timestamp out of range: {}", ms)))
}

impl JobRepository {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            retry_delay: Duration::minutes(1),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Create a new job record.
    pub async fn create(&self, record: &JobRecord) -> Result<(), DbError> {
        self.db
            .query("CREATE type::thing($table, $id) CONTENT $row")
            .bind(("table", crate::JOB_RECORD_TABLE))
            .bind(("id", record.id.to_string()))
            .bind(("row", JobRow::from_record(record)))
            .await?
            .check()?;

        Ok(())
    }

    /// Get a job record by ID.
    pub async fn get(&self, id: JobId) -> Result<JobRecord, DbError> {
        let query = format!("SELECT {} FROM type::thing($table, $id)", ROW_FIELDS);
        let mut response = self
            .db
            .query(query)
            .bind(("table", crate::JOB_RECORD_TABLE))
            .bind(("id", id.to_string()))
            .await?;

        let rows: Vec<JobRow> = response.take(0)?;

        rows.into_iter()
            .next()
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))?
            .into_record()
    }

    /// Get eligible records for a queue, oldest eligibility first.
    pub async fn get_pending_for_queue(
        &self,
        queue_id: &QueueId,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRecord>, DbError> {
        let query = format!(
            r#"
            SELECT {} FROM job_record
            WHERE queue_id = $queue_id
                AND is_complete = false
                AND execute_after_ms <= $now
                AND expire_on_ms >= $now
            ORDER BY execute_after_ms ASC
            LIMIT $limit
            "#,
            ROW_FIELDS
        );

        let mut response = self
            .db
            .query(query)
            .bind(("queue_id", queue_id.to_string()))
            .bind(("now", now.timestamp_millis()))
            .bind(("limit", limit as i64))
            .await?;

        let rows: Vec<JobRow> = response.take(0)?;

        rows.into_iter().map(JobRow::into_record).collect()
    }

    /// Flag a record complete.
    pub async fn set_complete(&self, id: JobId, at: DateTime<Utc>) -> Result<(), DbError> {
        let mut response = self
            .db
            .query(
                "UPDATE type::thing($table, $id) SET is_complete = true, execute_at_ms = $at RETURN job_id",
            )
            .bind(("table", crate::JOB_RECORD_TABLE))
            .bind(("id", id.to_string()))
            .bind(("at", at.timestamp_millis()))
            .await?;

        let touched: Vec<Touched> = response.take(0)?;
        if touched.is_empty() {
            return Err(DbError::NotFound(format!("Job not found: {}", id)));
        }

        Ok(())
    }

    /// Record a failed execution and reschedule it. The record stays incomplete.
    pub async fn record_failure(&self, id: JobId, error: &str) -> Result<(), DbError> {
        let now = Utc::now();
        let mut response = self
            .db
            .query(
                r#"
                UPDATE type::thing($table, $id)
                SET last_error = $error,
                    failed_at_ms = $now,
                    failure_count += 1,
                    execute_after_ms = $retry_at
                RETURN job_id
                "#,
            )
            .bind(("table", crate::JOB_RECORD_TABLE))
            .bind(("id", id.to_string()))
            .bind(("error", error.to_string()))
            .bind(("now", now.timestamp_millis()))
            .bind(("retry_at", (now + self.retry_delay).timestamp_millis()))
            .await?;

        let touched: Vec<Touched> = response.take(0)?;
        if touched.is_empty() {
            return Err(DbError::NotFound(format!("Job not found: {}", id)));
        }

        Ok(())
    }

    /// Failure details for a record.
    pub async fn failure_info(&self, id: JobId) -> Result<FailureInfo, DbError> {
        let mut response = self
            .db
            .query("SELECT failure_count, last_error, failed_at_ms FROM type::thing($table, $id)")
            .bind(("table", crate::JOB_RECORD_TABLE))
            .bind(("id", id.to_string()))
            .await?;

        let rows: Vec<FailureInfo> = response.take(0)?;

        rows.into_iter()
            .next()
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))
    }

    /// Delete every complete or expired record. Returns how many were removed.
    pub async fn delete_stale(&self, now: DateTime<Utc>) -> Result<u64, DbError> {
        let mut response = self
            .db
            .query(
                r#"
                DELETE job_record
                WHERE is_complete = true OR expire_on_ms < $now
                RETURN BEFORE
                "#,
            )
            .bind(("now", now.timestamp_millis()))
            .await?;

        let removed: Vec<Touched> = response.take(0)?;

        Ok(removed.len() as u64)
    }

    /// Count all records in a queue.
    pub async fn count_for_queue(&self, queue_id: &QueueId) -> Result<u64, DbError> {
        let mut response = self
            .db
            .query("SELECT count() AS count FROM job_record WHERE queue_id = $queue_id GROUP ALL")
            .bind(("queue_id", queue_id.to_string()))
            .await?;

        let counts: Vec<CountRow> = response.take(0)?;

        Ok(counts.first().map_or(0, |c| c.count.max(0) as u64))
    }
}

impl JobStorageProvider<JobRecord> for JobRepository {
    type Error = DbError;

    async fn store(&self, record: JobRecord, _cancel: CancellationToken) -> Result<(), DbError> {
        self.create(&record).await
    }

    async fn get_next_batch(
        &self,
        params: PendingJobSearchParams,
    ) -> Result<Vec<JobRecord>, DbError> {
        let mut records = self
            .get_pending_for_queue(params.queue_id(), params.now(), params.limit())
            .await?;
        // Guard against rounding at the millisecond boundary.
        records.retain(|r| params.matches(r));
        Ok(records)
    }

    async fn on_handler_execution_failure(
        &self,
        record: &JobRecord,
        error: &JobExecutionError,
        _cancel: CancellationToken,
    ) -> Result<(), DbError> {
        self.record_failure(record.id, &error.to_string()).await
    }

    async fn mark_complete(
        &self,
        record: &JobRecord,
        _cancel: CancellationToken,
    ) -> Result<(), DbError> {
        let at = record.execute_at.unwrap_or_else(Utc::now);
        self.set_complete(record.id, at).await
    }

    async fn purge_stale(&self, params: StaleJobSearchParams) -> Result<(), DbError> {
        let removed = self.delete_stale(params.now()).await?;
        tracing::debug!("Purged {} stale job records", removed);
        Ok(())
    }
}

//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Table holding job records.
pub const JOB_RECORD_TABLE: &str = "job_record";

/// Initialize the database schema.
///
/// This creates the job record table and its indexes.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.query(JOB_RECORD_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Job record table schema.
///
/// Schemaless so that job payloads keep their full shape. Timestamps are
/// epoch milliseconds to keep range comparisons numeric.
const JOB_RECORD_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job_record SCHEMALESS;

DEFINE FIELD IF NOT EXISTS job_id ON job_record TYPE string;
DEFINE FIELD IF NOT EXISTS queue_id ON job_record TYPE string;
DEFINE FIELD IF NOT EXISTS execute_after_ms ON job_record TYPE int;
DEFINE FIELD IF NOT EXISTS expire_on_ms ON job_record TYPE int;
DEFINE FIELD IF NOT EXISTS execute_at_ms ON job_record TYPE option<int>;
DEFINE FIELD IF NOT EXISTS is_complete ON job_record TYPE bool DEFAULT false;
DEFINE FIELD IF NOT EXISTS failure_count ON job_record TYPE int DEFAULT 0;
DEFINE FIELD IF NOT EXISTS last_error ON job_record TYPE option<string>;
DEFINE FIELD IF NOT EXISTS failed_at_ms ON job_record TYPE option<int>;

-- Compound index for queue polling (pending records by eligibility)
DEFINE INDEX IF NOT EXISTS job_record_pending ON job_record FIELDS queue_id, is_complete, execute_after_ms;
DEFINE INDEX IF NOT EXISTS job_record_expiry ON job_record FIELDS expire_on_ms;
"#;

use jobqueue_db::{DbConfig, DbError, JobRepository};

/// Fresh in-memory database with the schema applied.
pub async fn setup_repo() -> Result<JobRepository, DbError> {
    jobqueue_db::init(DbConfig::memory()).await
}

//! SurrealDB storage provider for the job queue.
//!
//! This crate provides database connectivity and a repository that
//! implements the job storage contract.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod schema;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError, connect};
pub use repositories::JobRepository;
pub use schema::{JOB_RECORD_TABLE, init_schema};

/// Connect, initialize the schema and return a ready storage provider.
///
/// This should be called once at application startup.
pub async fn init(config: DbConfig) -> Result<JobRepository, DbError> {
    let db = connect(&config).await?;
    init_schema(&db).await?;
    Ok(JobRepository::new(db))
}

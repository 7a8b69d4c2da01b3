#![allow(clippy::disallowed_methods)]

mod common;

use std::time::Duration;

use chrono::Utc;
use common::{Ping, TestStorage};
use jobqueue::{CancellationToken, JobQueues, JobRecord, job_handler};

async fn start(
    storage: &std::sync::Arc<TestStorage>,
    interval: Duration,
) -> JobQueues<JobRecord, TestStorage> {
    JobQueues::<JobRecord, TestStorage>::builder(storage.clone())
        .register(job_handler!(|_job: Ping, _cancel| { Ok(()) }))
        .purge_interval(interval)
        .start(CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_periodic_purge_removes_completed_records() {
    let storage = TestStorage::new();
    let queues = start(&storage, Duration::from_secs(10 * 60)).await;

    queues
        .enqueue(&Ping { n: 1 }, None, None, CancellationToken::new())
        .await
        .unwrap();
    let later = Utc::now() + chrono::Duration::hours(1);
    queues
        .enqueue(&Ping { n: 2 }, Some(later), None, CancellationToken::new())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(storage.completed(), 1);
    assert_eq!(storage.purge_calls(), 0);

    tokio::time::sleep(Duration::from_secs(10 * 60)).await;

    assert_eq!(storage.purge_calls(), 1);
    let left = storage.inner.records();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].execute_after, later);
    queues.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_default_interval_is_one_hour() {
    let storage = TestStorage::new();
    let queues = JobQueues::<JobRecord, TestStorage>::builder(storage.clone())
        .register(job_handler!(|_job: Ping, _cancel| { Ok(()) }))
        .start(CancellationToken::new())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(59 * 60)).await;
    assert_eq!(storage.purge_calls(), 0);

    tokio::time::sleep(Duration::from_secs(2 * 60)).await;
    assert_eq!(storage.purge_calls(), 1);
    queues.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_purge_now_runs_immediately() {
    let storage = TestStorage::new();
    let queues = start(&storage, Duration::from_secs(60 * 60)).await;

    queues
        .enqueue(&Ping { n: 1 }, None, None, CancellationToken::new())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(storage.inner.len(), 1);

    assert!(queues.purge_now().await.unwrap());
    assert!(storage.inner.is_empty());
    queues.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_purge_errors_are_swallowed() {
    let storage = TestStorage::new();
    storage.fail_purges();
    let queues = start(&storage, Duration::from_secs(60)).await;

    assert!(!queues.purge_now().await.unwrap());

    tokio::time::sleep(Duration::from_secs(150)).await;
    assert_eq!(storage.purge_calls(), 3);

    // Still alive after failing.
    assert!(!queues.purge_now().await.unwrap());
    assert_eq!(storage.purge_calls(), 4);
    queues.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_purging() {
    let storage = TestStorage::new();
    let shutdown = CancellationToken::new();
    let _queues = JobQueues::<JobRecord, TestStorage>::builder(storage.clone())
        .register(job_handler!(|_job: Ping, _cancel| { Ok(()) }))
        .purge_interval(Duration::from_secs(60))
        .start(shutdown.clone())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(90)).await;
    assert_eq!(storage.purge_calls(), 1);

    shutdown.cancel();
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(storage.purge_calls(), 1);
}

//! Integration tests for the distributed lock.
//!
//! Every test runs with tokio's clock paused; polling and lease expiry are
//! driven by auto-advance.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use latchwork::lock::{LockOptions, LOCKED_VALUE};
use latchwork::store::{FailOn, MemoryStore, StoreError, StoreOp, StoreOperation};
use latchwork::telemetry::{RecordingLogger, RecordingMetrics};
use latchwork::{Coordinator, ErrorKind, TrackedError};

fn coordinator(store: &MemoryStore, logger: &RecordingLogger) -> Coordinator {
    Coordinator::builder()
        .store(Arc::new(store.clone()))
        .logger(Arc::new(logger.clone()))
        .metrics(Arc::new(RecordingMetrics::new()))
        .build()
}

fn options() -> LockOptions {
    LockOptions::new(Duration::from_secs(5), Duration::from_secs(60))
}

fn dels(store: &MemoryStore) -> Vec<String> {
    store
        .operations()
        .into_iter()
        .filter_map(|op| match op {
            StoreOperation::Del { key } => Some(key),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn releases_once_after_success() {
    let store = MemoryStore::new();
    let coordinator = coordinator(&store, &RecordingLogger::new());

    let value = coordinator
        .with_distributed_lock("m1-r1", || async { Ok("sent") }, &options())
        .await
        .unwrap();

    assert_eq!(value, "sent");
    assert_eq!(dels(&store), vec!["lock:m1-r1"]);
    assert_eq!(
        store.operations()[0],
        StoreOperation::SetNx {
            key: "lock:m1-r1".into(),
            value: LOCKED_VALUE.into(),
            ttl: Duration::from_secs(60),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn releases_once_after_failure() {
    let store = MemoryStore::new();
    let coordinator = coordinator(&store, &RecordingLogger::new());

    let err = coordinator
        .with_distributed_lock(
            "m1-r1",
            || async { Err::<(), _>(TrackedError::integration("boom", "500", Some(500))) },
            &options(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.message(), "boom");
    assert_eq!(dels(&store), vec!["lock:m1-r1"]);
    assert_eq!(store.peek("lock:m1-r1"), None);
}

#[tokio::test(start_paused = true)]
async fn serializes_concurrent_holders() {
    let store = MemoryStore::new();
    let coordinator = coordinator(&store, &RecordingLogger::new());
    let in_flight = Arc::new(AtomicU32::new(0));
    let overlaps = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let coordinator = coordinator.clone();
        let in_flight = Arc::clone(&in_flight);
        let overlaps = Arc::clone(&overlaps);
        handles.push(tokio::spawn(async move {
            let options = LockOptions::new(Duration::from_secs(30), Duration::from_secs(60))
                .with_retry_interval(Duration::from_millis(100));
            coordinator
                .with_distributed_lock(
                    "shared",
                    move || async move {
                        if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        tokio::time::sleep(Duration::from_millis(250)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    },
                    &options,
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(dels(&store).len(), 5);
}

#[tokio::test(start_paused = true)]
async fn timeout_never_computes() {
    let store = MemoryStore::new();
    store.insert("lock:m1-r1", LOCKED_VALUE);
    let coordinator = coordinator(&store, &RecordingLogger::new());
    let calls = AtomicU32::new(0);
    let started = tokio::time::Instant::now();

    let err = coordinator
        .with_distributed_lock(
            "m1-r1",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            &options(),
        )
        .await
        .unwrap_err();

    match err.kind() {
        ErrorKind::LockTimeout { key, waited_ms } => {
            assert_eq!(key, "m1-r1");
            assert!(*waited_ms >= 5000);
        }
        other => panic!("expected lock timeout, got {:?}", other),
    }
    assert!(err.is_retryable());
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(dels(&store).is_empty());
    assert_eq!(store.peek("lock:m1-r1").as_deref(), Some(LOCKED_VALUE));
}

#[tokio::test(start_paused = true)]
async fn acquire_error_never_computes() {
    let store = MemoryStore::new().fail_on(FailOn::always(
        StoreOp::SetNx,
        StoreError::Connection("connection reset".into()),
    ));
    let logger = RecordingLogger::new();
    let coordinator = coordinator(&store, &logger);
    let calls = AtomicU32::new(0);

    let err = coordinator
        .with_distributed_lock(
            "m1-r1",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            &options(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err.kind(), ErrorKind::LockAcquire { .. }));
    assert!(err.is_retryable());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.count(StoreOp::SetNx), 1);
    assert!(dels(&store).is_empty());
    assert!(logger.contains("lock_acquire_error"));
}

#[tokio::test(start_paused = true)]
async fn release_error_is_swallowed() {
    let store = MemoryStore::new().fail_on(FailOn::always(
        StoreOp::Del,
        StoreError::Timeout("del".into()),
    ));
    let logger = RecordingLogger::new();
    let coordinator = coordinator(&store, &logger);

    let value = coordinator
        .with_distributed_lock("m1-r1", || async { Ok(1) }, &options())
        .await
        .unwrap();

    assert_eq!(value, 1);
    assert!(logger.contains("lock_release_error"));
}

#[tokio::test]
async fn store_without_locking_is_bypassed() {
    let store = MemoryStore::new().with_locking(false);
    let coordinator = coordinator(&store, &RecordingLogger::new());

    let value = coordinator
        .with_distributed_lock("m1-r1", || async { Ok(3) }, &options())
        .await
        .unwrap();

    assert_eq!(value, 3);
    assert!(store.operations().is_empty());
}

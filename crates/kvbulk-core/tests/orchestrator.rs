//! End-to-end orchestrator behaviour against test writers and the memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kvbulk_core::{
    BulkOrchestrator, Chunk, ChunkWriter, FailureKind, JobProgress, MemoryStore,
    OrchestratorConfig, Record, StoreChunkWriter, StoreError, WriteOutcome,
};

fn users(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            Record::new()
                .with("id", format!("gen_{i}"))
                .with("sk", "METADATA")
                .with("email", format!("user{i}@example.com"))
                .with("name", format!("User {i}"))
        })
        .collect()
}

fn config(chunk_size: usize, concurrency_limit: usize) -> OrchestratorConfig {
    OrchestratorConfig {
        chunk_size,
        concurrency_limit,
        ..Default::default()
    }
}

/// Hands back chunk `bad` in full on every attempt, accepts everything else.
struct StuckChunk {
    bad: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl ChunkWriter for StuckChunk {
    async fn write_chunk(&self, _collection: &str, chunk: &Chunk) -> WriteOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if chunk.index() == self.bad {
            WriteOutcome::PartiallyPersisted(chunk.records().to_vec())
        } else {
            WriteOutcome::AllPersisted
        }
    }
}

/// Tracks how many writes are open at once; each write holds its slot briefly.
#[derive(Default)]
struct Probe {
    current: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl ChunkWriter for Probe {
    async fn write_chunk(&self, _collection: &str, _chunk: &Chunk) -> WriteOutcome {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        WriteOutcome::AllPersisted
    }
}

/// Fails chunk `bad` with a validation error.
struct Rejects {
    bad: usize,
}

#[async_trait]
impl ChunkWriter for Rejects {
    async fn write_chunk(&self, _collection: &str, chunk: &Chunk) -> WriteOutcome {
        if chunk.index() == self.bad {
            WriteOutcome::Failed(StoreError::Validation("item exceeds size limit".into()))
        } else {
            WriteOutcome::AllPersisted
        }
    }
}

#[tokio::test(start_paused = true)]
async fn stuck_chunk_is_reported_and_the_rest_persist() {
    let writer = Arc::new(StuckChunk { bad: 3, calls: AtomicUsize::new(0) });
    let orch = BulkOrchestrator::new(writer.clone(), config(25, 20)).unwrap();

    let report = orch.submit("users", users(1000)).await.unwrap();

    assert_eq!(report.total_items, 1000);
    assert_eq!(report.succeeded_items, 975);
    assert_eq!(report.failed_items, 25);
    assert_eq!(report.chunks, 40);
    assert_eq!(report.batch_errors.len(), 1);
    let failure = &report.batch_errors[0];
    assert_eq!(failure.kind, FailureKind::RetriesExhausted);
    assert_eq!(failure.item_count, 25);
    assert_eq!(failure.chunk_index, Some(3));
    assert!(failure.error.starts_with("RetriesExhausted"));
    // 39 single writes plus 9 attempts for the stuck chunk.
    assert_eq!(writer.calls.load(Ordering::SeqCst), 48);
    assert_eq!(report.write_attempts, 48);
}

#[tokio::test(start_paused = true)]
async fn concurrent_writes_never_exceed_limit() {
    let probe = Arc::new(Probe::default());
    let orch = BulkOrchestrator::new(probe.clone(), config(10, 4)).unwrap();

    let report = orch.submit("users", users(200)).await.unwrap();

    assert!(report.is_success());
    assert_eq!(probe.calls.load(Ordering::SeqCst), 20);
    assert_eq!(probe.peak.load(Ordering::SeqCst), 4);
    assert_eq!(orch.gate().in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn gate_is_shared_across_jobs() {
    let probe = Arc::new(Probe::default());
    let orch = Arc::new(BulkOrchestrator::new(probe.clone(), config(5, 3)).unwrap());

    let a = orch.spawn("users", users(100)).unwrap();
    let b = orch.spawn("audit", users(100)).unwrap();
    let (a, b) = (a.join().await.unwrap(), b.join().await.unwrap());

    assert_eq!(a.succeeded_items + b.succeeded_items, 200);
    assert!(probe.peak.load(Ordering::SeqCst) <= 3);
}

#[tokio::test(start_paused = true)]
async fn progress_reported_after_each_batch() {
    let seen: Arc<Mutex<Vec<JobProgress>>> = Arc::default();
    let sink = seen.clone();
    let orch = BulkOrchestrator::new(Arc::new(Probe::default()), config(25, 20))
        .unwrap()
        .on_progress(move |p| sink.lock().unwrap().push(p));

    orch.submit("users", users(1000)).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            JobProgress { processed: 500, total: 1000 },
            JobProgress { processed: 1000, total: 1000 },
        ]
    );
}

#[tokio::test]
async fn non_transient_failure_does_not_stop_the_job() {
    let orch = BulkOrchestrator::new(Arc::new(Rejects { bad: 2 }), config(25, 20)).unwrap();
    let report = orch.submit("users", users(110)).await.unwrap();

    assert_eq!(report.succeeded_items, 85);
    assert_eq!(report.failed_items, 25);
    assert_eq!(report.batch_errors[0].kind, FailureKind::NonTransient);
    assert!(report.batch_errors[0].error.contains("item exceeds size limit"));
    assert_eq!(report.write_attempts, 5);
}

#[tokio::test(start_paused = true)]
async fn throttled_memory_store_converges() {
    let store = Arc::new(MemoryStore::new().throttle_every(3));
    let writer = Arc::new(StoreChunkWriter::new(store.clone()));
    let orch = BulkOrchestrator::new(writer, OrchestratorConfig::default()).unwrap();

    let report = orch.submit("users", users(500)).await.unwrap();

    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.succeeded_items, 500);
    assert_eq!(store.len("users"), 500);
    assert!(report.write_attempts > report.chunks as u64);
}

#[tokio::test(start_paused = true)]
async fn spawned_job_reports_through_handle() {
    let orch = Arc::new(BulkOrchestrator::new(Arc::new(Probe::default()), config(25, 2)).unwrap());
    let handle = orch.spawn("users", users(120)).unwrap();
    let mut progress = handle.progress();

    let report = handle.join().await.unwrap();
    assert_eq!(report.succeeded_items, 120);
    assert_eq!(*progress.borrow_and_update(), JobProgress { processed: 120, total: 120 });
}

#[tokio::test]
async fn spawn_validates_before_starting() {
    let orch = Arc::new(BulkOrchestrator::new(Arc::new(Probe::default()), config(25, 2)).unwrap());
    assert!(orch.spawn("", users(10)).is_err());
}

#[tokio::test(start_paused = true)]
async fn cancel_before_start_fails_everything_as_cancelled() {
    let probe = Arc::new(Probe::default());
    let orch = Arc::new(BulkOrchestrator::new(probe.clone(), config(25, 1)).unwrap());

    let handle = orch.spawn("users", users(100)).unwrap();
    handle.cancel();
    let report = handle.join().await.unwrap();

    assert_eq!(report.succeeded_items, 0);
    assert_eq!(report.failed_items, 100);
    assert_eq!(report.batch_errors.len(), 1);
    assert_eq!(report.batch_errors[0].kind, FailureKind::Cancelled);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_job_keeps_counts_balanced() {
    let orch = Arc::new(BulkOrchestrator::new(Arc::new(Probe::default()), config(25, 1)).unwrap());

    let handle = orch.spawn("users", users(100)).unwrap();
    let mut progress = handle.progress();
    progress.changed().await.unwrap();
    handle.cancel();
    let report = handle.join().await.unwrap();

    assert!(report.succeeded_items >= 25);
    assert!(report.failed_items > 0);
    assert_eq!(report.succeeded_items + report.failed_items, 100);
    assert_eq!(report.succeeded_items % 25, 0);
    assert_eq!(
        report.batch_errors.last().map(|e| e.kind),
        Some(FailureKind::Cancelled)
    );
}

#[tokio::test(start_paused = true)]
async fn detached_job_still_completes() {
    let store = Arc::new(MemoryStore::new());
    let writer = Arc::new(StoreChunkWriter::new(store.clone()));
    let orch = Arc::new(BulkOrchestrator::new(writer, OrchestratorConfig::default()).unwrap());

    orch.spawn("users", users(300)).unwrap().detach();

    while store.len("users") < 300 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.len("users"), 300);
}

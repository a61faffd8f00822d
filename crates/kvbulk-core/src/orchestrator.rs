//! `BulkOrchestrator` — chunked, concurrent, retrying bulk writes.
//!
//! A job is split into chunks of `chunk_size` records. Chunks are admitted in
//! batches of `concurrency_limit`: every chunk of a batch starts its own
//! lineage (behind the shared [`ConcurrencyGate`]) and the whole batch must
//! settle before the next one is admitted. Lineage results flow back to the
//! single awaiting loop, which owns the report, so counters are never shared.
//!
//! Backend failures never abort a job; they end up in the [`JobReport`].
//! Only a malformed call returns [`BulkError`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::chunker::{self, Chunks};
use crate::error::BulkError;
use crate::lineage::{run_lineage, LineageOutcome};
use crate::policy::{ConcurrencyGate, RetryConfig, RetryPolicy};
use crate::record::{Chunk, Record, MAX_BATCH_WRITE_ITEMS};
use crate::report::{FailureKind, JobProgress, JobReport, ReportBuilder};
use crate::writer::{ChunkWriter, WriteOutcome};

/// Progress observer, called after each admission batch settles.
pub type ProgressCallback = Arc<dyn Fn(JobProgress) + Send + Sync>;

/// Configuration for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Records per chunk write (at most [`MAX_BATCH_WRITE_ITEMS`]).
    pub chunk_size: usize,
    /// Lineages allowed to run at once, also the admission batch size.
    pub concurrency_limit: usize,
    pub retry: RetryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chunk_size: MAX_BATCH_WRITE_ITEMS,
            concurrency_limit: 20,
            retry: RetryConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<(), BulkError> {
        if self.chunk_size == 0 || self.chunk_size > MAX_BATCH_WRITE_ITEMS {
            return Err(BulkError::invalid(format!(
                "chunk size must be between 1 and {MAX_BATCH_WRITE_ITEMS}, got {}",
                self.chunk_size
            )));
        }
        if self.concurrency_limit == 0 {
            return Err(BulkError::invalid("concurrency limit must be positive"));
        }
        Ok(())
    }
}

/// Per-job signals shared between the job task and its [`JobHandle`].
#[derive(Default)]
struct JobControl {
    progress: Option<watch::Sender<JobProgress>>,
    cancelled: Arc<AtomicBool>,
}

impl JobControl {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Bulk write engine.
pub struct BulkOrchestrator {
    writer: Arc<dyn ChunkWriter>,
    config: OrchestratorConfig,
    policy: Arc<RetryPolicy>,
    gate: ConcurrencyGate,
    on_progress: Option<ProgressCallback>,
}

impl BulkOrchestrator {
    pub fn new(
        writer: Arc<dyn ChunkWriter>,
        config: OrchestratorConfig,
    ) -> Result<Self, BulkError> {
        config.validate()?;
        let gate = ConcurrencyGate::new(config.concurrency_limit)?;
        Ok(Self {
            writer,
            policy: Arc::new(RetryPolicy::new(config.retry.clone())),
            config,
            gate,
            on_progress: None,
        })
    }

    /// Register a progress observer.
    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(JobProgress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The admission gate. Shared by every job this orchestrator runs.
    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Write `records` to `collection` and wait for every lineage to settle.
    pub async fn submit(
        &self,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<JobReport, BulkError> {
        let chunks = self.prepare(collection, records)?;
        Ok(self.run(Arc::from(collection), chunks, JobControl::default()).await)
    }

    /// Start the job on a Tokio task and return a handle to it immediately.
    ///
    /// Input is validated before the task starts. The caller may await the
    /// report through [`JobHandle::join`] or [`JobHandle::detach`] it.
    pub fn spawn(
        self: &Arc<Self>,
        collection: impl Into<String>,
        records: Vec<Record>,
    ) -> Result<JobHandle, BulkError> {
        let collection: Arc<str> = Arc::from(collection.into());
        let total = records.len();
        let chunks = self.prepare(&collection, records)?;

        let (tx, rx) = watch::channel(JobProgress { processed: 0, total });
        let cancelled = Arc::new(AtomicBool::new(false));
        let control = JobControl {
            progress: Some(tx),
            cancelled: cancelled.clone(),
        };

        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.run(collection, chunks, control).await });
        Ok(JobHandle {
            task,
            progress: rx,
            cancelled,
        })
    }

    fn prepare(&self, collection: &str, records: Vec<Record>) -> Result<Chunks, BulkError> {
        if collection.trim().is_empty() {
            return Err(BulkError::invalid("collection name must not be empty"));
        }
        chunker::chunk(records, self.config.chunk_size)
    }

    async fn run(
        &self,
        collection: Arc<str>,
        mut chunks: Chunks,
        control: JobControl,
    ) -> JobReport {
        let total_items = chunks.remaining_records();
        let mut report = ReportBuilder::new(total_items, chunks.len());
        if total_items == 0 {
            return report.finish();
        }

        info!(
            collection = %collection,
            total_items,
            chunks = chunks.len(),
            chunk_size = self.config.chunk_size,
            concurrency_limit = self.config.concurrency_limit,
            "bulk write started"
        );

        let mut batch_no = 0usize;
        loop {
            if control.is_cancelled() {
                let remaining = chunks.remaining_records();
                if remaining > 0 {
                    warn!(collection = %collection, remaining, "bulk write cancelled");
                    report.record_unadmitted(
                        FailureKind::Cancelled,
                        format!("Cancelled: {remaining} items never admitted"),
                        remaining,
                    );
                }
                break;
            }

            let batch: Vec<_> = chunks.by_ref().take(self.config.concurrency_limit).collect();
            if batch.is_empty() {
                break;
            }
            batch_no += 1;

            let batch_items: usize = batch.iter().map(|c| c.len()).sum();
            let mut settled_items = 0usize;
            let mut lineages = JoinSet::new();
            for chunk in batch {
                lineages.spawn(self.lineage_task(collection.clone(), chunk));
            }

            while let Some(joined) = lineages.join_next().await {
                match joined {
                    Ok(outcome) => {
                        settled_items += outcome.submitted;
                        report.record(outcome);
                    }
                    Err(e) => warn!(collection = %collection, error = %e, "lineage task lost"),
                }
            }

            // Tasks torn down by the runtime never report; keep the totals whole.
            if settled_items < batch_items {
                report.record_unadmitted(
                    FailureKind::Aborted,
                    "Aborted: lineage task did not complete".into(),
                    batch_items - settled_items,
                );
            }

            let progress = report.progress();
            debug!(
                collection = %collection,
                batch = batch_no,
                processed = progress.processed,
                total = progress.total,
                "admission batch settled"
            );
            if let Some(cb) = &self.on_progress {
                cb(progress);
            }
            if let Some(tx) = &control.progress {
                let _ = tx.send(progress);
            }
        }

        let report = report.finish();
        info!(
            collection = %collection,
            total_items = report.total_items,
            succeeded_items = report.succeeded_items,
            failed_items = report.failed_items,
            write_attempts = report.write_attempts,
            elapsed_ms = report.elapsed_ms,
            "bulk write finished"
        );
        report
    }

    /// One lineage: wait for a gate slot, then retry the chunk to a terminal state.
    fn lineage_task(
        &self,
        collection: Arc<str>,
        chunk: Chunk,
    ) -> impl std::future::Future<Output = LineageOutcome> + Send + 'static {
        let writer = CountingWriter {
            inner: Arc::clone(&self.writer),
            writes: AtomicU32::new(0),
        };
        let policy = Arc::clone(&self.policy);
        let gate = self.gate.clone();
        async move {
            let (index, size) = (chunk.index(), chunk.len());
            let _permit = match gate.acquire().await {
                Ok(permit) => permit,
                Err(e) => return LineageOutcome::aborted(index, size, 0, e.to_string()),
            };
            AssertUnwindSafe(run_lineage(&writer, &collection, chunk, &policy))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    let writes = writer.writes.load(Ordering::SeqCst);
                    LineageOutcome::aborted(index, size, writes, panic_message(&*panic))
                })
        }
    }
}

/// Counts the writes of one lineage so a panicking lineage still reports them.
struct CountingWriter {
    inner: Arc<dyn ChunkWriter>,
    writes: AtomicU32,
}

#[async_trait]
impl ChunkWriter for CountingWriter {
    async fn write_chunk(&self, collection: &str, chunk: &Chunk) -> WriteOutcome {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_chunk(collection, chunk).await
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let msg = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into());
    format!("lineage panicked: {msg}")
}

impl std::fmt::Debug for BulkOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkOrchestrator")
            .field("config", &self.config)
            .field("in_flight", &self.gate.in_flight())
            .finish()
    }
}

/// Handle to a job started with [`BulkOrchestrator::spawn`].
#[derive(Debug)]
pub struct JobHandle {
    task: JoinHandle<JobReport>,
    progress: watch::Receiver<JobProgress>,
    cancelled: Arc<AtomicBool>,
}

impl JobHandle {
    /// Wait for the job to finish and return its report.
    pub async fn join(self) -> Result<JobReport, BulkError> {
        self.task
            .await
            .map_err(|e| BulkError::Aborted(e.to_string()))
    }

    /// Let the job run to completion in the background.
    pub fn detach(self) {
        drop(self.task);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Progress updates, one per settled admission batch.
    pub fn progress(&self) -> watch::Receiver<JobProgress> {
        self.progress.clone()
    }

    /// Stop admitting further batches. Lineages already running finish
    /// normally; never-admitted records are reported as `Cancelled`.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

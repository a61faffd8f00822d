//! Retry Scheduler — drives one chunk through bounded retries.
//!
//! A lineage starts with the records of one chunk and, after each write,
//! keeps only what the backend reported unprocessed. The loop state is held
//! in [`LineageState`] so the transitions can be checked without any I/O:
//!
//! - `AllPersisted` → done
//! - `PartiallyPersisted(rest)` → retry `rest` after a backoff, or give up
//!   with `RetriesExhausted` once the retry budget is spent
//! - `Failed(e)` → give up immediately (`NonTransient`)

use std::time::Duration;

use tracing::{error, warn};

use crate::error::{LineageError, StoreError};
use crate::policy::RetryPolicy;
use crate::record::{Chunk, Record};
use crate::writer::{ChunkWriter, WriteOutcome};

/// What the lineage loop should do after observing a write outcome.
#[derive(Debug)]
pub enum LineageStep {
    /// Every record of the lineage is persisted.
    Done,
    /// Sleep for `delay`, then write the pending records again.
    Retry { delay: Duration },
    /// Records are still pending but the retry budget is spent.
    Exhausted,
    /// The backend returned a non-capacity error.
    Fatal(StoreError),
}

/// Loop state of one lineage: attempt counter, working set, tallies.
#[derive(Debug)]
pub struct LineageState {
    index: usize,
    submitted: usize,
    attempt: u32,
    writes: u32,
    persisted: usize,
    pending: Vec<Record>,
}

impl LineageState {
    pub fn new(chunk: Chunk) -> Self {
        let index = chunk.index();
        let records = chunk.into_records();
        Self {
            index,
            submitted: records.len(),
            attempt: 0,
            writes: 0,
            persisted: 0,
            pending: records,
        }
    }

    /// 0-based retry attempt the next write belongs to.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Records not yet confirmed.
    pub fn pending(&self) -> &[Record] {
        &self.pending
    }

    /// Records confirmed so far across all attempts.
    pub fn persisted(&self) -> usize {
        self.persisted
    }

    /// Move the working set into a chunk for the next write.
    pub fn next_chunk(&mut self) -> Chunk {
        Chunk::from_parts(self.index, std::mem::take(&mut self.pending))
    }

    /// Fold the outcome of writing `sent` into the state.
    pub fn observe(
        &mut self,
        sent: Chunk,
        outcome: WriteOutcome,
        policy: &RetryPolicy,
    ) -> LineageStep {
        self.writes += 1;
        match outcome {
            WriteOutcome::AllPersisted => {
                self.persisted += sent.len();
                LineageStep::Done
            }
            WriteOutcome::PartiallyPersisted(unprocessed) => {
                if unprocessed.len() > sent.len() {
                    let err = StoreError::Backend(format!(
                        "backend reported {} unprocessed items for a request of {}",
                        unprocessed.len(),
                        sent.len()
                    ));
                    self.pending = sent.into_records();
                    return LineageStep::Fatal(err);
                }
                // Anything the backend did not hand back was persisted.
                self.persisted += sent.len() - unprocessed.len();
                self.pending = unprocessed;
                if self.pending.is_empty() {
                    return LineageStep::Done;
                }
                match policy.next_delay(self.attempt) {
                    Some(delay) => {
                        self.attempt += 1;
                        LineageStep::Retry { delay }
                    }
                    None => LineageStep::Exhausted,
                }
            }
            WriteOutcome::Failed(err) => {
                self.pending = sent.into_records();
                LineageStep::Fatal(err)
            }
        }
    }

    /// Close the lineage. On failure the remaining working set counts as failed.
    pub fn finish(self, error: Option<LineageError>) -> LineageOutcome {
        let failed = if error.is_some() { self.pending.len() } else { 0 };
        LineageOutcome {
            chunk_index: self.index,
            submitted: self.submitted,
            persisted: self.persisted,
            failed,
            attempts: self.writes,
            error,
        }
    }
}

/// Terminal result of one lineage.
#[derive(Debug)]
pub struct LineageOutcome {
    pub chunk_index: usize,
    /// Size of the original chunk.
    pub submitted: usize,
    /// Records confirmed across all attempts.
    pub persisted: usize,
    /// Records still pending when the lineage failed.
    pub failed: usize,
    /// Number of chunk writes issued.
    pub attempts: u32,
    pub error: Option<LineageError>,
}

impl LineageOutcome {
    /// A lineage that never completed; all of its records count as failed.
    /// `attempts` is the number of writes issued before it died.
    pub fn aborted(
        chunk_index: usize,
        submitted: usize,
        attempts: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            chunk_index,
            submitted,
            persisted: 0,
            failed: submitted,
            attempts,
            error: Some(LineageError::Aborted(reason.into())),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Run one chunk to a terminal state.
pub async fn run_lineage(
    writer: &dyn ChunkWriter,
    collection: &str,
    chunk: Chunk,
    policy: &RetryPolicy,
) -> LineageOutcome {
    let mut state = LineageState::new(chunk);
    loop {
        let sent = state.next_chunk();
        let outcome = writer.write_chunk(collection, &sent).await;
        match state.observe(sent, outcome, policy) {
            LineageStep::Done => return state.finish(None),
            LineageStep::Retry { delay } => {
                warn!(
                    collection,
                    chunk = state.index,
                    attempt = state.attempt,
                    unprocessed = state.pending.len(),
                    delay_ms = delay.as_millis() as u64,
                    "retrying unprocessed items"
                );
                tokio::time::sleep(delay).await;
            }
            LineageStep::Exhausted => {
                error!(
                    collection,
                    chunk = state.index,
                    attempts = state.writes,
                    unprocessed = state.pending.len(),
                    "max retries exceeded"
                );
                let err = LineageError::RetriesExhausted {
                    remaining: state.pending.len(),
                    attempts: state.writes,
                };
                return state.finish(Some(err));
            }
            LineageStep::Fatal(e) => {
                error!(
                    collection,
                    chunk = state.index,
                    attempt = state.attempt,
                    error = %e,
                    "chunk write failed"
                );
                return state.finish(Some(LineageError::NonTransient(e)));
            }
        }
    }
}

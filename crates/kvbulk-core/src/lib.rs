//! kvbulk-core — bulk write orchestration for batch-limited key-value stores.
//!
//! # Overview
//!
//! Stores like DynamoDB accept at most 25 items per batch write and may hand
//! part of a batch back as "unprocessed" when they are under load. This crate
//! turns an arbitrary-sized input into a job that respects those limits:
//!
//! - [`chunker`] — splits records into store-sized [`Chunk`]s
//! - [`ChunkWriter`] — one batch write attempt, reporting unprocessed items
//! - [`lineage`] — bounded retry of the unprocessed subset with backoff + jitter
//! - [`policy`] module — retry policy and the concurrency gate
//! - [`BulkOrchestrator`] — drives the pipeline and builds a [`JobReport`]
//! - [`ItemStore`] — the storage collaborator, with an in-memory [`MemoryStore`]
//!
//! ```text
//! records → Chunker → [ConcurrencyGate] → [RetryPolicy(ChunkWriter)] → JobReport
//! ```

pub mod chunker;
pub mod error;
pub mod lineage;
pub mod memory;
pub mod orchestrator;
pub mod policy;
pub mod record;
pub mod report;
pub mod store;
pub mod writer;

pub use error::{BulkError, LineageError, StoreError};
pub use memory::MemoryStore;
pub use orchestrator::{BulkOrchestrator, JobHandle, OrchestratorConfig};
pub use policy::{ConcurrencyGate, RetryConfig, RetryPolicy};
pub use record::{Chunk, ItemKey, Record, MAX_BATCH_WRITE_ITEMS};
pub use report::{BatchError, FailureKind, JobProgress, JobReport};
pub use store::{ItemStore, UpdateRequest};
pub use writer::{ChunkWriter, StoreChunkWriter, WriteOutcome};

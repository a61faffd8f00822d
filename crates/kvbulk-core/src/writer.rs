//! Chunk Writer — a single batch write attempt.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::record::{Chunk, Record};
use crate::store::ItemStore;

/// Result of one chunk write attempt.
#[derive(Debug)]
pub enum WriteOutcome {
    /// The backend confirmed every item.
    AllPersisted,
    /// The backend handed back a non-empty subset it did not persist.
    PartiallyPersisted(Vec<Record>),
    /// Any other error. Not retried.
    Failed(StoreError),
}

impl WriteOutcome {
    pub fn is_all_persisted(&self) -> bool {
        matches!(self, Self::AllPersisted)
    }
}

/// Writes one chunk with no retry logic of its own.
#[async_trait]
pub trait ChunkWriter: Send + Sync + 'static {
    async fn write_chunk(&self, collection: &str, chunk: &Chunk) -> WriteOutcome;
}

/// [`ChunkWriter`] backed by an [`ItemStore`]'s batch put.
#[derive(Clone)]
pub struct StoreChunkWriter {
    store: Arc<dyn ItemStore>,
}

impl StoreChunkWriter {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ItemStore> {
        &self.store
    }
}

#[async_trait]
impl ChunkWriter for StoreChunkWriter {
    async fn write_chunk(&self, collection: &str, chunk: &Chunk) -> WriteOutcome {
        match self.store.batch_put(collection, chunk.records().to_vec()).await {
            Ok(unprocessed) if unprocessed.is_empty() => WriteOutcome::AllPersisted,
            Ok(unprocessed) => {
                tracing::debug!(
                    store = self.store.name(),
                    chunk = chunk.index(),
                    submitted = chunk.len(),
                    unprocessed = unprocessed.len(),
                    "batch partially persisted"
                );
                WriteOutcome::PartiallyPersisted(unprocessed)
            }
            Err(e) => WriteOutcome::Failed(e),
        }
    }
}

impl std::fmt::Debug for StoreChunkWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreChunkWriter")
            .field("store", &self.store.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn chunk(n: usize) -> Chunk {
        let records = (0..n)
            .map(|i| Record::new().with("id", format!("u{i}")).with("sk", "METADATA"))
            .collect();
        Chunk::new(0, records).unwrap()
    }

    #[tokio::test]
    async fn all_persisted() {
        let store = Arc::new(MemoryStore::new());
        let writer = StoreChunkWriter::new(store.clone());
        let outcome = writer.write_chunk("users", &chunk(5)).await;
        assert!(outcome.is_all_persisted());
        assert_eq!(store.len("users"), 5);
    }

    #[tokio::test]
    async fn throttled_batch_reports_unprocessed() {
        let store = Arc::new(MemoryStore::new().throttle_every(1));
        let writer = StoreChunkWriter::new(store.clone());
        match writer.write_chunk("users", &chunk(10)).await {
            WriteOutcome::PartiallyPersisted(rest) => assert_eq!(rest.len(), 5),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(store.len("users"), 5);
    }

    #[tokio::test]
    async fn store_error_is_failed() {
        let store = Arc::new(MemoryStore::new());
        let writer = StoreChunkWriter::new(store);
        let bad = Chunk::new(0, vec![Record::new().with("email", "no-key")]).unwrap();
        let outcome = writer.write_chunk("users", &bad).await;
        assert!(matches!(outcome, WriteOutcome::Failed(StoreError::Validation(_))));
    }
}

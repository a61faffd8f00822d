//! The `ItemStore` trait — the key-value backend the orchestrator writes to.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::record::{ItemKey, Record, MAX_BATCH_WRITE_ITEMS};

/// A `SET`-style update of a single item.
///
/// `expression` uses `:placeholder` values and optional `#placeholder`
/// attribute names (for reserved words like `name`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateRequest {
    pub key: ItemKey,
    /// e.g. `"SET email = :e"`
    pub expression: String,
    /// e.g. `{":e": "test@test.com"}`
    pub values: Map<String, Value>,
    /// e.g. `{"#n": "name"}`
    pub names: HashMap<String, String>,
}

impl UpdateRequest {
    pub fn new(key: ItemKey, expression: impl Into<String>) -> Self {
        Self {
            key,
            expression: expression.into(),
            ..Default::default()
        }
    }

    pub fn value(mut self, placeholder: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(placeholder.into(), value.into());
        self
    }

    pub fn name(mut self, placeholder: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.names.insert(placeholder.into(), attribute.into());
        self
    }
}

/// The storage backend.
///
/// Implementations are stateless request issuers and are shared across all
/// concurrent lineages, so they must be `Send + Sync`. The trait is object
/// safe and is normally held as `Arc<dyn ItemStore>`.
#[async_trait]
pub trait ItemStore: Send + Sync + 'static {
    /// Write (overwrite) a single item.
    async fn put(&self, collection: &str, item: Record) -> Result<(), StoreError>;

    /// Write up to [`MAX_BATCH_WRITE_ITEMS`] items in one request.
    ///
    /// Returns the items the backend did not persist. Default implementation
    /// puts them one by one and never reports unprocessed items; override for
    /// true batching.
    async fn batch_put(
        &self,
        collection: &str,
        items: Vec<Record>,
    ) -> Result<Vec<Record>, StoreError> {
        check_batch_len(items.len())?;
        for item in items {
            self.put(collection, item).await?;
        }
        Ok(Vec::new())
    }

    /// Fetch a single item by key.
    async fn get(&self, collection: &str, key: &ItemKey) -> Result<Option<Record>, StoreError>;

    /// Apply an update and return the item's new attributes.
    async fn update(
        &self,
        collection: &str,
        req: UpdateRequest,
    ) -> Result<Option<Record>, StoreError>;

    /// Return every item in the collection.
    async fn scan(&self, collection: &str) -> Result<Vec<Record>, StoreError>;

    /// The store's identifier (endpoint or name), used in logs.
    fn name(&self) -> &str;
}

/// Reject batches above the backend's per-request cap.
pub fn check_batch_len(len: usize) -> Result<(), StoreError> {
    if len > MAX_BATCH_WRITE_ITEMS {
        return Err(StoreError::Validation(format!(
            "batch of {len} items exceeds the limit of {MAX_BATCH_WRITE_ITEMS}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        puts: AtomicUsize,
    }

    #[async_trait]
    impl ItemStore for CountingStore {
        async fn put(&self, _collection: &str, _item: Record) -> Result<(), StoreError> {
            self.puts.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        async fn get(&self, _c: &str, _k: &ItemKey) -> Result<Option<Record>, StoreError> {
            Ok(None)
        }
        async fn update(&self, _c: &str, _r: UpdateRequest) -> Result<Option<Record>, StoreError> {
            Ok(None)
        }
        async fn scan(&self, _c: &str) -> Result<Vec<Record>, StoreError> {
            Ok(vec![])
        }
        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn default_batch_put_is_sequential() {
        let store = CountingStore { puts: AtomicUsize::new(0) };
        let items = (0..10).map(|i| Record::new().with("id", i)).collect();
        let unprocessed = store.batch_put("t", items).await.unwrap();
        assert!(unprocessed.is_empty());
        assert_eq!(store.puts.load(Ordering::Relaxed), 10);
    }

    #[tokio::test]
    async fn oversized_batch_rejected() {
        let store = CountingStore { puts: AtomicUsize::new(0) };
        let items = (0..26).map(|i| Record::new().with("id", i)).collect();
        let err = store.batch_put("t", items).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.puts.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn update_request_builder() {
        let mut key = ItemKey::new();
        key.insert("id".into(), "u1".into());
        let req = UpdateRequest::new(key, "SET #n = :n")
            .value(":n", "Ada")
            .name("#n", "name");
        assert_eq!(req.values[":n"], Value::from("Ada"));
        assert_eq!(req.names["#n"], "name");
    }
}

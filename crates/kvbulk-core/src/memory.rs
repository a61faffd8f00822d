//! In-memory `ItemStore` for tests, demos and ephemeral jobs.
//!
//! Items are keyed by a configurable set of key fields (default `id` + `sk`)
//! with put-overwrite semantics. A throttle plan can make every N-th batch
//! call leave the tail half of the batch unprocessed, which exercises the
//! retry path without a real backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::record::{ItemKey, Record};
use crate::store::{check_batch_len, ItemStore, UpdateRequest};

type Table = BTreeMap<String, Record>;

/// In-memory key-value store.
pub struct MemoryStore {
    key_fields: Vec<String>,
    tables: Mutex<HashMap<String, Table>>,
    throttle_every: Option<u64>,
    batch_calls: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_key_fields(["id", "sk"])
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store keyed by the given attribute names.
    pub fn with_key_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key_fields: fields.into_iter().map(Into::into).collect(),
            tables: Mutex::new(HashMap::new()),
            throttle_every: None,
            batch_calls: AtomicU64::new(0),
        }
    }

    /// Every `n`-th batch call persists only the head half of its items and
    /// reports the rest unprocessed. `n == 1` throttles every call.
    pub fn throttle_every(mut self, n: u64) -> Self {
        self.throttle_every = (n > 0).then_some(n);
        self
    }

    /// Number of items in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.tables
            .lock()
            .unwrap()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Number of `batch_put` calls served so far.
    pub fn batch_calls(&self) -> u64 {
        self.batch_calls.load(Ordering::Relaxed)
    }

    fn storage_key(
        &self,
        attrs: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, StoreError> {
        let mut parts = Vec::with_capacity(self.key_fields.len());
        for field in &self.key_fields {
            let value = attrs.get(field).ok_or_else(|| {
                StoreError::Validation(format!("missing key attribute '{field}'"))
            })?;
            parts.push(serde_json::to_string(value)?);
        }
        Ok(parts.join("|"))
    }

    /// Key every item up front so a bad item rejects the whole request.
    fn keyed(&self, items: Vec<Record>) -> Result<Vec<(String, Record)>, StoreError> {
        items
            .into_iter()
            .map(|item| Ok((self.storage_key(item.as_map())?, item)))
            .collect()
    }

    fn insert_keyed(&self, collection: &str, keyed: Vec<(String, Record)>) {
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(collection.to_string()).or_default();
        table.extend(keyed);
    }

    fn apply_update(&self, item: &mut Record, req: &UpdateRequest) -> Result<(), StoreError> {
        let expression = req.expression.trim();
        let assignments = expression
            .get(..4)
            .filter(|head| head.eq_ignore_ascii_case("set "))
            .map(|_| &expression[4..])
            .ok_or_else(|| {
                StoreError::Validation(format!("unsupported update expression: {expression}"))
            })?;

        for clause in assignments.split(',') {
            let (lhs, rhs) = clause.split_once('=').ok_or_else(|| {
                StoreError::Validation(format!("malformed SET clause: {}", clause.trim()))
            })?;
            let lhs = lhs.trim();
            let attribute = if lhs.starts_with('#') {
                req.names.get(lhs).cloned().ok_or_else(|| {
                    StoreError::Validation(format!("undefined attribute name {lhs}"))
                })?
            } else {
                lhs.to_string()
            };
            if self.key_fields.contains(&attribute) {
                return Err(StoreError::Validation(format!(
                    "cannot update key attribute '{attribute}'"
                )));
            }
            let placeholder = rhs.trim();
            let value = req.values.get(placeholder).ok_or_else(|| {
                StoreError::Validation(format!("undefined value placeholder {placeholder}"))
            })?;
            item.insert(attribute, value.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn put(&self, collection: &str, item: Record) -> Result<(), StoreError> {
        let keyed = self.keyed(vec![item])?;
        self.insert_keyed(collection, keyed);
        Ok(())
    }

    async fn batch_put(
        &self,
        collection: &str,
        items: Vec<Record>,
    ) -> Result<Vec<Record>, StoreError> {
        check_batch_len(items.len())?;
        let mut keyed = self.keyed(items)?;
        let call = self.batch_calls.fetch_add(1, Ordering::Relaxed) + 1;
        let throttled = self.throttle_every.is_some_and(|n| call % n == 0);
        let unprocessed = if throttled {
            keyed
                .split_off(keyed.len() / 2)
                .into_iter()
                .map(|(_, item)| item)
                .collect()
        } else {
            Vec::new()
        };
        self.insert_keyed(collection, keyed);
        Ok(unprocessed)
    }

    async fn get(&self, collection: &str, key: &ItemKey) -> Result<Option<Record>, StoreError> {
        let key = self.storage_key(key)?;
        let tables = self.tables.lock().unwrap();
        Ok(tables.get(collection).and_then(|t| t.get(&key)).cloned())
    }

    async fn update(
        &self,
        collection: &str,
        req: UpdateRequest,
    ) -> Result<Option<Record>, StoreError> {
        let key = self.storage_key(&req.key)?;
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(collection.to_string()).or_default();
        // Updates upsert: a missing item starts from its key attributes.
        let mut item = table
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Record::from(req.key.clone()));
        self.apply_update(&mut item, &req)?;
        table.insert(key, item.clone());
        Ok(Some(item))
    }

    async fn scan(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(collection)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(id: &str) -> Record {
        Record::new()
            .with("id", id)
            .with("sk", "METADATA")
            .with("name", format!("User {id}"))
    }

    fn key(id: &str) -> ItemKey {
        user(id).key(&["id", "sk"]).unwrap()
    }

    #[tokio::test]
    async fn put_overwrites() {
        let store = MemoryStore::new();
        store.put("users", user("a")).await.unwrap();
        store
            .put("users", user("a").with("email", "a@example.com"))
            .await
            .unwrap();
        assert_eq!(store.len("users"), 1);
        let got = store.get("users", &key("a")).await.unwrap().unwrap();
        assert_eq!(got.get("email"), Some(&json!("a@example.com")));
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let store = MemoryStore::new();
        store.put("a", user("1")).await.unwrap();
        assert!(store.is_empty("b"));
        assert!(store.get("b", &key("1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn batch_with_missing_key_persists_nothing() {
        let store = MemoryStore::new();
        let items = vec![user("a"), Record::new().with("id", "b")];
        let err = store.batch_put("users", items).await.unwrap_err();
        assert!(err.is_validation());
        assert!(store.is_empty("users"));
    }

    #[tokio::test]
    async fn throttle_plan_applies_to_every_nth_call() {
        let store = MemoryStore::new().throttle_every(2);
        let batch = |p: &str| (0..4).map(|i| user(&format!("{p}{i}"))).collect::<Vec<_>>();
        assert!(store.batch_put("users", batch("x")).await.unwrap().is_empty());
        let rest = store.batch_put("users", batch("y")).await.unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].get("id"), Some(&json!("y2")));
        assert_eq!(store.len("users"), 6);
        assert_eq!(store.batch_calls(), 2);
    }

    #[tokio::test]
    async fn throttled_batch_with_bad_tail_key_persists_nothing() {
        let store = MemoryStore::new().throttle_every(1);
        let items = vec![user("a"), user("b"), user("c"), Record::new().with("id", "bad")];
        let err = store.batch_put("users", items).await.unwrap_err();
        assert!(err.is_validation());
        assert!(store.is_empty("users"));
    }

    #[tokio::test]
    async fn update_sets_attributes_with_names() {
        let store = MemoryStore::new();
        store.put("users", user("a")).await.unwrap();
        let req = UpdateRequest::new(key("a"), "SET email = :e, #n = :n")
            .value(":e", "new@example.com")
            .value(":n", "Ada")
            .name("#n", "name");
        let updated = store.update("users", req).await.unwrap().unwrap();
        assert_eq!(updated.get("email"), Some(&json!("new@example.com")));
        assert_eq!(updated.get("name"), Some(&json!("Ada")));
        assert_eq!(updated.get("id"), Some(&json!("a")));
    }

    #[tokio::test]
    async fn update_rejects_key_and_unknown_placeholders() {
        let store = MemoryStore::new();
        let req = UpdateRequest::new(key("a"), "SET id = :v").value(":v", "b");
        assert!(store.update("users", req).await.unwrap_err().is_validation());

        let req = UpdateRequest::new(key("a"), "SET email = :missing");
        assert!(store.update("users", req).await.unwrap_err().is_validation());

        let req = UpdateRequest::new(key("a"), "REMOVE email");
        assert!(store.update("users", req).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn scan_returns_everything() {
        let store = MemoryStore::new();
        for id in ["a", "b", "c"] {
            store.put("users", user(id)).await.unwrap();
        }
        assert_eq!(store.scan("users").await.unwrap().len(), 3);
        assert!(store.scan("other").await.unwrap().is_empty());
    }
}

//! User records on top of an [`ItemStore`].

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use kvbulk_core::{ItemKey, ItemStore, Record, StoreError, UpdateRequest};
use kvbulk_dynamo::{PARTITION_KEY, SORT_KEY};
use serde::{Deserialize, Serialize};

/// Sort key value of a user's profile item.
pub const METADATA_SK: &str = "METADATA";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// Build the stored item for `user`.
pub fn user_record(user: &NewUser, created_at: DateTime<Utc>) -> Record {
    Record::new()
        .with(PARTITION_KEY, user.id.as_str())
        .with(SORT_KEY, METADATA_SK)
        .with("email", user.email.as_str())
        .with("name", user.name.as_str())
        .with(
            "createdAt",
            created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
}

/// `count` generated users with ids unique to `now`.
pub fn mock_users(count: usize, now: DateTime<Utc>) -> Vec<Record> {
    let millis = now.timestamp_millis();
    (0..count)
        .map(|i| {
            let user = NewUser {
                id: format!("gen_{millis}_{i}"),
                email: format!("user{i}@example.com"),
                name: format!("User {i}"),
            };
            user_record(&user, now)
        })
        .collect()
}

fn user_key(id: &str) -> ItemKey {
    let mut key = ItemKey::new();
    key.insert(PARTITION_KEY.into(), id.into());
    key.insert(SORT_KEY.into(), METADATA_SK.into());
    key
}

/// Single-item user operations against one table.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn ItemStore>,
    table: String,
}

impl UserService {
    pub fn new(store: Arc<dyn ItemStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn store(&self) -> &Arc<dyn ItemStore> {
        &self.store
    }

    pub async fn register(&self, user: &NewUser) -> Result<Record, StoreError> {
        if user.id.trim().is_empty() {
            return Err(StoreError::Validation("user id must not be empty".into()));
        }
        let record = user_record(user, Utc::now());
        self.store.put(&self.table, record.clone()).await?;
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Record>, StoreError> {
        self.store.get(&self.table, &user_key(id)).await
    }

    pub async fn update_email(&self, id: &str, email: &str) -> Result<Option<Record>, StoreError> {
        let req = UpdateRequest::new(user_key(id), "SET email = :e").value(":e", email);
        self.store.update(&self.table, req).await
    }

    /// Full table scan.
    pub async fn list(&self) -> Result<Vec<Record>, StoreError> {
        self.store.scan(&self.table).await
    }
}

//! kvbulk-dynamo — DynamoDB backend for kvbulk.
//!
//! - [`DynamoConfig`] — region, endpoint and static credentials from the environment
//! - [`DynamoStore`] — [`ItemStore`](kvbulk_core::ItemStore) over `aws-sdk-dynamodb`
//! - [`provision`] — table creation (`id` hash key, `sk` range key, on-demand billing)

pub mod config;
pub mod error;
pub mod provision;
pub mod store;

pub use config::DynamoConfig;
pub use error::DynamoError;
pub use provision::{create_table, TableStatus};
pub use store::DynamoStore;

/// Partition key attribute of kvbulk tables.
pub const PARTITION_KEY: &str = "id";

/// Sort key attribute of kvbulk tables.
pub const SORT_KEY: &str = "sk";

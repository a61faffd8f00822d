//! `ItemStore` implementation backed by `aws-sdk-dynamodb`.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::{Credentials, Region};
use aws_sdk_dynamodb::operation::batch_write_item::BatchWriteItemOutput;
use aws_sdk_dynamodb::types::{AttributeValue, PutRequest, ReturnValue, WriteRequest};
use aws_sdk_dynamodb::Client;
use serde::Serialize;

use kvbulk_core::store::check_batch_len;
use kvbulk_core::{ItemKey, ItemStore, Record, StoreError, UpdateRequest};

use crate::config::DynamoConfig;
use crate::error::DynamoError;

type Item = HashMap<String, AttributeValue>;

/// DynamoDB-backed item store. Cheap to share: the SDK client is reference counted.
#[derive(Clone, Debug)]
pub struct DynamoStore {
    client: Client,
    name: String,
}

impl DynamoStore {
    /// Build a client with static credentials and the configured endpoint.
    pub async fn connect(config: &DynamoConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "kvbulk-static",
        );
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let sdk_config = loader.load().await;

        let name = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("dynamodb.{}", config.region));
        tracing::debug!(store = %name, region = %config.region, "DynamoDB client ready");
        Self::from_client(Client::new(&sdk_config), name)
    }

    /// Wrap an existing SDK client.
    pub fn from_client(client: Client, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

fn to_item<T: Serialize>(value: T) -> Result<Item, DynamoError> {
    Ok(serde_dynamo::to_item(value)?)
}

fn to_record(item: Item) -> Result<Record, DynamoError> {
    Ok(serde_dynamo::from_item(item)?)
}

/// Put requests the service handed back, as records. Deletes are never sent.
fn unprocessed_records(output: BatchWriteItemOutput) -> Result<Vec<Record>, DynamoError> {
    let mut unprocessed = Vec::new();
    for requests in output.unprocessed_items.unwrap_or_default().into_values() {
        for request in requests {
            if let Some(put) = request.put_request {
                unprocessed.push(to_record(put.item)?);
            }
        }
    }
    Ok(unprocessed)
}

#[async_trait]
impl ItemStore for DynamoStore {
    async fn put(&self, collection: &str, item: Record) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(collection)
            .set_item(Some(to_item(item)?))
            .send()
            .await
            .map_err(|e| DynamoError::sdk("PutItem", e))?;
        Ok(())
    }

    async fn batch_put(
        &self,
        collection: &str,
        items: Vec<Record>,
    ) -> Result<Vec<Record>, StoreError> {
        check_batch_len(items.len())?;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let mut requests = Vec::with_capacity(items.len());
        for item in items {
            let put = PutRequest::builder()
                .set_item(Some(to_item(item)?))
                .build()
                .map_err(DynamoError::from)?;
            requests.push(WriteRequest::builder().put_request(put).build());
        }

        let output = self
            .client
            .batch_write_item()
            .request_items(collection, requests)
            .send()
            .await
            .map_err(|e| DynamoError::sdk("BatchWriteItem", e))?;
        Ok(unprocessed_records(output)?)
    }

    async fn get(&self, collection: &str, key: &ItemKey) -> Result<Option<Record>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(collection)
            .set_key(Some(to_item(key)?))
            .send()
            .await
            .map_err(|e| DynamoError::sdk("GetItem", e))?;
        Ok(output.item.map(to_record).transpose()?)
    }

    async fn update(
        &self,
        collection: &str,
        req: UpdateRequest,
    ) -> Result<Option<Record>, StoreError> {
        let values = if req.values.is_empty() {
            None
        } else {
            Some(to_item(&req.values)?)
        };
        // DynamoDB rejects an empty ExpressionAttributeNames map.
        let names = (!req.names.is_empty()).then_some(req.names);

        let output = self
            .client
            .update_item()
            .table_name(collection)
            .set_key(Some(to_item(&req.key)?))
            .update_expression(req.expression)
            .set_expression_attribute_values(values)
            .set_expression_attribute_names(names)
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| DynamoError::sdk("UpdateItem", e))?;
        Ok(output.attributes.map(to_record).transpose()?)
    }

    async fn scan(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let mut records = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let output = self
                .client
                .scan()
                .table_name(collection)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| DynamoError::sdk("Scan", e))?;

            for item in output.items.unwrap_or_default() {
                records.push(to_record(item)?);
            }
            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }
        Ok(records)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

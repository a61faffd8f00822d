//! Table provisioning.

use aws_sdk_dynamodb::operation::create_table::CreateTableError;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType,
};
use aws_sdk_dynamodb::Client;

use crate::error::DynamoError;
use crate::{PARTITION_KEY, SORT_KEY};

/// Result of [`create_table`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableStatus {
    Created { arn: Option<String> },
    AlreadyExists,
}

/// Create `table` with a string `id` hash key and string `sk` range key,
/// billed on demand. An existing table is not an error.
pub async fn create_table(client: &Client, table: &str) -> Result<TableStatus, DynamoError> {
    let mut request = client
        .create_table()
        .table_name(table)
        .billing_mode(BillingMode::PayPerRequest);

    for (name, key_type) in [(PARTITION_KEY, KeyType::Hash), (SORT_KEY, KeyType::Range)] {
        request = request
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(name)
                    .attribute_type(ScalarAttributeType::S)
                    .build()?,
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(name)
                    .key_type(key_type)
                    .build()?,
            );
    }

    match request.send().await {
        Ok(output) => {
            let arn = output.table_description.and_then(|d| d.table_arn);
            tracing::info!(table, arn = arn.as_deref().unwrap_or("-"), "table created");
            Ok(TableStatus::Created { arn })
        }
        Err(err) => match err.into_service_error() {
            CreateTableError::ResourceInUseException(_) => {
                tracing::info!(table, "table already exists");
                Ok(TableStatus::AlreadyExists)
            }
            other => Err(DynamoError::sdk("CreateTable", other)),
        },
    }
}

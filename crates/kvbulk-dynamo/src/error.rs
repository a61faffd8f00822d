//! DynamoDB error types.

use aws_sdk_dynamodb::error::{BuildError, DisplayErrorContext};
use kvbulk_core::StoreError;
use thiserror::Error;

/// Errors from the DynamoDB backend.
#[derive(Debug, Error)]
pub enum DynamoError {
    /// The SDK call failed (service error, network, credentials).
    #[error("DynamoDB {operation} failed: {message}")]
    Sdk {
        operation: &'static str,
        message: String,
    },

    /// A request could not be built (missing required field).
    #[error("request build error: {0}")]
    Build(#[from] BuildError),

    /// An item could not be converted to or from DynamoDB attributes.
    #[error("attribute conversion error: {0}")]
    Conversion(#[from] serde_dynamo::Error),
}

impl DynamoError {
    /// Wrap an SDK error, keeping the full error chain in the message.
    pub fn sdk<E>(operation: &'static str, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Sdk {
            operation,
            message: DisplayErrorContext(err).to_string(),
        }
    }
}

impl From<DynamoError> for StoreError {
    fn from(err: DynamoError) -> Self {
        match err {
            DynamoError::Sdk { .. } => StoreError::Backend(err.to_string()),
            DynamoError::Build(_) | DynamoError::Conversion(_) => {
                StoreError::Validation(err.to_string())
            }
        }
    }
}

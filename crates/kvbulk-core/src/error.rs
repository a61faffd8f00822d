//! Error types for bulk writes.

use thiserror::Error;

use crate::report::FailureKind;

/// Errors raised to the caller of the orchestrator or the chunker.
///
/// Backend failures never show up here; they are captured per chunk in the
/// [`JobReport`](crate::JobReport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BulkError {
    /// Malformed call: empty collection name, zero chunk size, bad config.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A spawned job task died before producing its report.
    #[error("job aborted: {0}")]
    Aborted(String),
}

impl BulkError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Errors returned by an [`ItemStore`](crate::ItemStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request was rejected as malformed (missing key, oversized batch, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// The backend failed the request (permissions, network, service error).
    #[error("backend error: {0}")]
    Backend(String),

    /// An item could not be converted to or from its stored form.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns `true` if the backend rejected the request itself.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Terminal failure of one chunk lineage.
#[derive(Debug, Error)]
pub enum LineageError {
    /// The backend kept reporting unprocessed items until the retry bound.
    #[error("RetriesExhausted: {remaining} items still unprocessed after {attempts} attempts")]
    RetriesExhausted { remaining: usize, attempts: u32 },

    /// The backend returned an error that is not a capacity signal.
    #[error("NonTransient: {0}")]
    NonTransient(#[source] StoreError),

    /// The lineage task never ran to completion (panic, closed gate).
    #[error("Aborted: {0}")]
    Aborted(String),
}

impl LineageError {
    /// Classification used in the job report.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RetriesExhausted { .. } => FailureKind::RetriesExhausted,
            Self::NonTransient(_) => FailureKind::NonTransient,
            Self::Aborted(_) => FailureKind::Aborted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lineage_error_kinds() {
        let exhausted = LineageError::RetriesExhausted { remaining: 25, attempts: 9 };
        assert_eq!(exhausted.kind(), FailureKind::RetriesExhausted);
        assert!(exhausted.to_string().starts_with("RetriesExhausted"));

        let fatal = LineageError::NonTransient(StoreError::Validation("bad item".into()));
        assert_eq!(fatal.kind(), FailureKind::NonTransient);
        assert!(fatal.to_string().contains("bad item"));
    }
}

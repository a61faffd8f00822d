//! Job report and progress types.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::lineage::LineageOutcome;

/// Why a chunk (or group of records) ended up in `failed_items`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Unprocessed items remained after the last allowed retry.
    RetriesExhausted,
    /// The backend returned a non-capacity error.
    NonTransient,
    /// The job was cancelled before these records were admitted.
    Cancelled,
    /// The lineage task died before reaching a terminal state.
    Aborted,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RetriesExhausted => write!(f, "RetriesExhausted"),
            Self::NonTransient => write!(f, "NonTransient"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Aborted => write!(f, "Aborted"),
        }
    }
}

/// One failed chunk (or cancelled remainder) in a job report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchError {
    /// Index of the originating chunk; `None` for records never chunked-in.
    pub chunk_index: Option<usize>,
    pub kind: FailureKind,
    pub error: String,
    pub item_count: usize,
}

/// Aggregate result of one orchestrator invocation.
///
/// `succeeded_items + failed_items == total_items` always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub total_items: usize,
    pub succeeded_items: usize,
    pub failed_items: usize,
    /// Number of chunks the input was split into.
    pub chunks: usize,
    /// Chunk writes issued, retries included.
    pub write_attempts: u64,
    /// Failures in completion order.
    pub batch_errors: Vec<BatchError>,
    pub elapsed_ms: u64,
}

impl JobReport {
    /// Returns `true` if every submitted item was persisted.
    pub fn is_success(&self) -> bool {
        self.failed_items == 0
    }
}

/// Items processed so far, emitted after each admission batch settles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub processed: usize,
    pub total: usize,
}

/// Accumulates lineage outcomes into a [`JobReport`].
///
/// Owned by the single task that awaits lineages, so no locking is needed.
pub(crate) struct ReportBuilder {
    report: JobReport,
    started: Instant,
}

impl ReportBuilder {
    pub(crate) fn new(total_items: usize, chunks: usize) -> Self {
        Self {
            report: JobReport {
                total_items,
                chunks,
                ..Default::default()
            },
            started: Instant::now(),
        }
    }

    pub(crate) fn record(&mut self, outcome: LineageOutcome) {
        self.report.succeeded_items += outcome.persisted;
        self.report.failed_items += outcome.failed;
        self.report.write_attempts += u64::from(outcome.attempts);
        if let Some(err) = outcome.error {
            self.report.batch_errors.push(BatchError {
                chunk_index: Some(outcome.chunk_index),
                kind: err.kind(),
                error: err.to_string(),
                item_count: outcome.failed,
            });
        }
    }

    pub(crate) fn record_unadmitted(
        &mut self,
        kind: FailureKind,
        error: String,
        item_count: usize,
    ) {
        if item_count == 0 {
            return;
        }
        self.report.failed_items += item_count;
        self.report.batch_errors.push(BatchError {
            chunk_index: None,
            kind,
            error,
            item_count,
        });
    }

    pub(crate) fn progress(&self) -> JobProgress {
        JobProgress {
            processed: self.report.succeeded_items + self.report.failed_items,
            total: self.report.total_items,
        }
    }

    pub(crate) fn finish(mut self) -> JobReport {
        self.report.elapsed_ms = self.started.elapsed().as_millis() as u64;
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LineageError;

    fn outcome(
        index: usize,
        persisted: usize,
        failed: usize,
        error: Option<LineageError>,
    ) -> LineageOutcome {
        LineageOutcome {
            chunk_index: index,
            submitted: persisted + failed,
            persisted,
            failed,
            attempts: 1,
            error,
        }
    }

    #[test]
    fn counts_always_balance() {
        let mut b = ReportBuilder::new(60, 3);
        b.record(outcome(0, 25, 0, None));
        b.record(outcome(
            1,
            5,
            20,
            Some(LineageError::RetriesExhausted { remaining: 20, attempts: 9 }),
        ));
        b.record_unadmitted(FailureKind::Cancelled, "job cancelled".into(), 10);
        let report = b.finish();

        assert_eq!(report.succeeded_items, 30);
        assert_eq!(report.failed_items, 30);
        assert_eq!(report.succeeded_items + report.failed_items, report.total_items);
        assert_eq!(report.batch_errors.len(), 2);
        assert_eq!(report.batch_errors[0].kind, FailureKind::RetriesExhausted);
        assert_eq!(report.batch_errors[0].item_count, 20);
        assert_eq!(report.batch_errors[1].chunk_index, None);
        assert!(!report.is_success());
    }

    #[test]
    fn report_serializes_camel_case() {
        let json = serde_json::to_value(JobReport::default()).unwrap();
        assert!(json.get("succeededItems").is_some());
        assert!(json.get("batchErrors").is_some());
    }
}

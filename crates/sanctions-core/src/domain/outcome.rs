//! Outcome model: per-batch results and the per-run summary.
//!
//! A `BatchOutcome` is produced by one worker, consumed by the aggregator and
//! then discarded. A `ProcessingSummary` is the immutable result of one run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{ErrorKind, RemoteError};
use super::ids::{RunId, SanctionId};

/// Why a single item was not processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub id: SanctionId,
    pub reason: String,
    /// `None` when the failure did not come from the remote store (e.g. a
    /// panicked batch).
    #[serde(skip)]
    pub kind: Option<ErrorKind>,
}

impl ItemFailure {
    pub fn from_remote(id: SanctionId, err: &RemoteError) -> Self {
        Self {
            id,
            reason: err.to_string(),
            kind: Some(err.kind()),
        }
    }

    pub fn other(id: SanctionId, reason: impl Into<String>) -> Self {
        Self {
            id,
            reason: reason.into(),
            kind: None,
        }
    }

    /// User-facing line: `"{short id}: {reason}"`.
    pub fn display_line(&self) -> String {
        format!("{}: {}", self.id.short(), self.reason)
    }
}

/// The comment written to one record, so the caller's copy can be updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedComment {
    pub id: SanctionId,
    pub comment: String,
}

/// Result of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Position of the batch in submission order.
    pub batch_index: usize,
    pub applied: Vec<AppliedComment>,
    pub failures: Vec<ItemFailure>,
}

impl BatchOutcome {
    pub fn new(batch_index: usize) -> Self {
        Self {
            batch_index,
            ..Self::default()
        }
    }

    pub fn record_success(&mut self, id: SanctionId, comment: String) {
        self.applied.push(AppliedComment { id, comment });
    }

    pub fn record_failure(&mut self, failure: ItemFailure) {
        self.failures.push(failure);
    }

    pub fn succeeded(&self) -> usize {
        self.applied.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn processed(&self) -> usize {
        self.succeeded() + self.failed()
    }

    /// Every item of the batch failed for the same reason.
    pub fn all_failed(batch_index: usize, ids: &[SanctionId], reason: &str) -> Self {
        Self {
            batch_index,
            applied: Vec::new(),
            failures: ids
                .iter()
                .map(|id| ItemFailure::other(id.clone(), reason))
                .collect(),
        }
    }
}

/// Result of one processing run.
///
/// Conservation: `succeeded + failed + already_claimed + not_dispatched == total`.
/// Without cancellation `not_dispatched` is zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingSummary {
    pub run_id: Option<RunId>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub already_claimed: usize,
    pub not_dispatched: usize,
    /// The availability check failed and the run proceeded fail-open.
    pub validation_degraded: bool,
    /// Display sample, capped.
    pub errors: Vec<String>,
    /// Full failure list, for logging and export.
    pub failures: Vec<ItemFailure>,
    pub applied: Vec<AppliedComment>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl ProcessingSummary {
    /// Summary for a run where nothing was dispatched.
    pub fn nothing_dispatched(total: usize, already_claimed: usize, elapsed: Duration) -> Self {
        Self {
            run_id: None,
            total,
            succeeded: 0,
            failed: 0,
            already_claimed,
            not_dispatched: total.saturating_sub(already_claimed),
            validation_degraded: false,
            errors: Vec::new(),
            failures: Vec::new(),
            applied: Vec::new(),
            elapsed,
        }
    }

    pub fn is_conserved(&self) -> bool {
        self.succeeded + self.failed + self.already_claimed + self.not_dispatched == self.total
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_line_uses_short_id() {
        let failure = ItemFailure::from_remote(
            SanctionId::new("0f8fad5b-d9cb-469f-a165-70867728950e"),
            &RemoteError::Rejected {
                status: 403,
                body: "denied".into(),
            },
        );
        assert_eq!(
            failure.display_line(),
            "0f8fad5b: rejected with status 403: denied"
        );
        assert_eq!(failure.kind, Some(ErrorKind::Rejection));
    }

    #[test]
    fn batch_outcome_counts() {
        let mut outcome = BatchOutcome::new(0);
        outcome.record_success(SanctionId::new("A"), "c".into());
        outcome.record_failure(ItemFailure::other(SanctionId::new("B"), "boom"));
        assert_eq!(outcome.succeeded(), 1);
        assert_eq!(outcome.failed(), 1);
        assert_eq!(outcome.processed(), 2);
    }

    #[test]
    fn all_failed_covers_every_id() {
        let ids = vec![SanctionId::new("A"), SanctionId::new("B")];
        let outcome = BatchOutcome::all_failed(3, &ids, "worker panicked");
        assert_eq!(outcome.batch_index, 3);
        assert_eq!(outcome.failed(), 2);
        assert_eq!(outcome.succeeded(), 0);
    }

    #[test]
    fn summary_serializes_elapsed_as_seconds() {
        let summary = ProcessingSummary::nothing_dispatched(2, 2, Duration::from_millis(1500));
        assert!(summary.is_conserved());
        let v = serde_json::to_value(&summary).unwrap();
        assert_eq!(v["elapsed"], 1.5);
        assert_eq!(v["already_claimed"], 2);
    }
}

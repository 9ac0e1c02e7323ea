//! ResultAggregator - バッチ結果の集計
//!
//! 表示用のエラーは先頭 `error_sample_limit` 件だけ（既定 5）。
//! 全件は `failures` に残し、ログにも出す。

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::{BatchOutcome, ProcessingSummary};

#[derive(Debug, Clone)]
pub struct ResultAggregator {
    error_sample_limit: usize,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new(5)
    }
}

impl ResultAggregator {
    pub fn new(error_sample_limit: usize) -> Self {
        Self { error_sample_limit }
    }

    /// outcomes はバッチ番号順に並んでいること（エラーの並びがそれに従う）
    pub fn aggregate(
        &self,
        total: usize,
        already_claimed: usize,
        not_dispatched: usize,
        outcomes: Vec<BatchOutcome>,
        elapsed: Duration,
    ) -> ProcessingSummary {
        let mut summary = ProcessingSummary::nothing_dispatched(total, already_claimed, elapsed);
        summary.not_dispatched = not_dispatched;

        for outcome in outcomes {
            summary.succeeded += outcome.succeeded();
            summary.failed += outcome.failed();
            summary.applied.extend(outcome.applied);
            summary.failures.extend(outcome.failures);
        }

        summary.errors = summary
            .failures
            .iter()
            .take(self.error_sample_limit)
            .map(|f| f.display_line())
            .collect();

        if summary.failures.len() > summary.errors.len() {
            info!(
                shown = summary.errors.len(),
                total_failures = summary.failures.len(),
                "error sample truncated"
            );
        }
        for failure in &summary.failures {
            debug!(sanction_id = %failure.id, reason = %failure.reason, "failure recorded");
        }
        if !summary.is_conserved() {
            warn!(
                total,
                succeeded = summary.succeeded,
                failed = summary.failed,
                already_claimed,
                not_dispatched,
                "summary counts do not add up"
            );
        }
        summary
    }
}

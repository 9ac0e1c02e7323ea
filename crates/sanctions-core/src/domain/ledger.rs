//! Local audit rows: which operator processed what, when, and how long it took.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::ids::{OperatorId, SanctionId};
use super::item::WorkItem;

/// One processed item. Append-only; the engine never mutates or deletes rows.
///
/// Duplicate policy: latest wins (a second entry for the same id replaces the
/// first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: SanctionId,
    pub operator: OperatorId,
    pub processed_at: DateTime<Local>,
    pub elapsed_secs: f64,
    pub employee_code: Option<i64>,
    pub employee_name: Option<String>,
    pub sanction_type: Option<String>,
    /// Date of the sanction itself (not of the processing).
    pub original_date: Option<String>,
}

impl LedgerEntry {
    pub fn for_item(
        item: &WorkItem,
        operator: &OperatorId,
        processed_at: DateTime<Local>,
        elapsed_secs: f64,
    ) -> Self {
        Self {
            id: item.id.clone(),
            operator: operator.clone(),
            processed_at,
            elapsed_secs,
            employee_code: item.employee_code,
            employee_name: item.employee_name.clone(),
            sanction_type: item.sanction_type.clone(),
            original_date: item.date.clone(),
        }
    }
}

/// One row of the operation log, written once per processing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub at: DateTime<Local>,
    pub operator: OperatorId,
    pub operation: String,
    pub detail: String,
    pub result: String,
}

impl RunRecord {
    pub const BULK_PROCESSING: &'static str = "PROCESAMIENTO_MASIVO";
}

/// Aggregate statistics over the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_processed: u64,
    pub by_operator: BTreeMap<String, u64>,
    pub by_type: BTreeMap<String, u64>,
    pub processed_today: u64,
    pub avg_elapsed_secs: f64,
    pub min_elapsed_secs: f64,
    pub max_elapsed_secs: f64,
}

impl LedgerStats {
    /// Build from raw rows; shared by every ledger implementation so the
    /// numbers agree.
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = &'a LedgerEntry>,
        today: chrono::NaiveDate,
    ) -> Self {
        let mut stats = LedgerStats::default();
        let mut timings = Vec::new();
        for entry in entries {
            stats.total_processed += 1;
            *stats
                .by_operator
                .entry(entry.operator.as_str().to_string())
                .or_default() += 1;
            let ty = entry.sanction_type.clone().unwrap_or_default();
            *stats.by_type.entry(ty).or_default() += 1;
            if entry.processed_at.date_naive() == today {
                stats.processed_today += 1;
            }
            timings.push(entry.elapsed_secs);
        }
        stats.set_timings(&timings);
        stats
    }

    pub(crate) fn set_timings(&mut self, timings: &[f64]) {
        if timings.is_empty() {
            return;
        }
        let sum: f64 = timings.iter().sum();
        let min = timings.iter().copied().fold(f64::INFINITY, f64::min);
        let max = timings.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        self.avg_elapsed_secs = round2(sum / timings.len() as f64);
        self.min_elapsed_secs = round2(min);
        self.max_elapsed_secs = round2(max);
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

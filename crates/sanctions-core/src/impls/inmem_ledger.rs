//! InMemoryLedger - テスト用の監査台帳

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{LedgerEntry, LedgerError, LedgerStats, RunRecord, SanctionId};
use crate::ports::Ledger;

/// InMemoryLedger は ID をキーにした後勝ちのマップ
///
/// `set_failing(true)` で全操作を失敗させ、台帳障害が処理結果に
/// 影響しないことを確かめられる。
#[derive(Default)]
pub struct InMemoryLedger {
    entries: Mutex<HashMap<SanctionId, LedgerEntry>>,
    runs: Mutex<Vec<RunRecord>>,
    failing: AtomicBool,
    append_delay: Mutex<Option<Duration>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 追記が詰まった状態を作る
    pub fn set_append_delay(&self, delay: Duration) {
        *self.append_delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn check(&self) -> Result<(), LedgerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn append(&self, entry: LedgerEntry) -> Result<(), LedgerError> {
        let delay = *self.append_delay.lock().map_err(|_| LedgerError::Poisoned)?;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check()?;
        self.entries
            .lock()
            .map_err(|_| LedgerError::Poisoned)?
            .insert(entry.id.clone(), entry);
        Ok(())
    }

    async fn lookup(
        &self,
        ids: &[SanctionId],
    ) -> Result<HashMap<SanctionId, LedgerEntry>, LedgerError> {
        self.check()?;
        let entries = self.entries.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(ids
            .iter()
            .filter_map(|id| entries.get(id).map(|e| (id.clone(), e.clone())))
            .collect())
    }

    async fn stats(&self, today: NaiveDate) -> Result<LedgerStats, LedgerError> {
        self.check()?;
        let entries = self.entries.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(LedgerStats::from_entries(entries.values(), today))
    }

    async fn record_run(&self, run: RunRecord) -> Result<(), LedgerError> {
        self.check()?;
        self.runs
            .lock()
            .map_err(|_| LedgerError::Poisoned)?
            .push(run);
        Ok(())
    }
}

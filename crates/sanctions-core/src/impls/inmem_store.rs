//! InMemoryStore - 開発・テスト用のリモートストア
//!
//! # 学習ポイント
//! - 障害注入（一括読み取り失敗・ID ごとの更新失敗・遅延）
//! - 同時実行数のゲージで並行度の上限をテストできるようにする
//! - 同期 Mutex は await をまたがない範囲でだけ握る

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ClaimCheckResult, NewSanction, RemoteError, SanctionId, WorkItem};
use crate::ports::RemoteStore;

#[derive(Default)]
struct Faults {
    read_error: Option<RemoteError>,
    /// 一括読み取りが返ってこない
    stall_reads: bool,
    patch_errors: HashMap<SanctionId, RemoteError>,
    /// 一括読み取りの応答から抜く ID
    omitted_from_reads: HashSet<SanctionId>,
    patch_delay: Option<Duration>,
    patch_delays: HashMap<SanctionId, Duration>,
    panic_on_patch: HashSet<SanctionId>,
}

/// InMemoryStore は ID 順に並べたレコードを持つ
///
/// # 使用例
/// ```ignore
/// let store = InMemoryStore::with_items(vec![WorkItem::new("a")]);
/// store.fail_patch("a", RemoteError::Timeout(Duration::from_secs(1)));
/// ```
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<BTreeMap<SanctionId, WorkItem>>,
    faults: Mutex<Faults>,
    patch_log: Mutex<Vec<(SanctionId, String)>>,
    read_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = WorkItem>) -> Self {
        let store = Self::new();
        if let Ok(mut records) = store.records.lock() {
            records.extend(items.into_iter().map(|item| (item.id.clone(), item)));
        }
        store
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn records(&self) -> std::sync::MutexGuard<'_, BTreeMap<SanctionId, WorkItem>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 一括読み取りを常に失敗させる
    pub fn fail_reads(&self, err: RemoteError) {
        self.faults().read_error = Some(err);
    }

    /// 一括読み取りを永遠に待たせる
    pub fn stall_reads(&self) {
        self.faults().stall_reads = true;
    }

    /// 一括読み取りの応答にこの ID を含めない
    pub fn omit_from_reads(&self, id: impl Into<SanctionId>) {
        self.faults().omitted_from_reads.insert(id.into());
    }

    pub fn fail_patch(&self, id: impl Into<SanctionId>, err: RemoteError) {
        self.faults().patch_errors.insert(id.into(), err);
    }

    /// すべての更新に遅延を入れる
    pub fn set_patch_delay(&self, delay: Duration) {
        self.faults().patch_delay = Some(delay);
    }

    pub fn delay_patch(&self, id: impl Into<SanctionId>, delay: Duration) {
        self.faults().patch_delays.insert(id.into(), delay);
    }

    pub fn panic_on_patch(&self, id: impl Into<SanctionId>) {
        self.faults().panic_on_patch.insert(id.into());
    }

    /// 外部の誰かが先にクレームした状態を作る
    pub fn claim_externally(&self, id: &SanctionId, marker: impl Into<String>) {
        if let Some(record) = self.records().get_mut(id) {
            record.hr_comment = Some(marker.into());
        }
    }

    pub fn get(&self, id: &SanctionId) -> Option<WorkItem> {
        self.records().get(id).cloned()
    }

    /// 成功した更新の記録（呼び出し順）
    pub fn patched(&self) -> Vec<(SanctionId, String)> {
        self.patch_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn patch_count(&self, id: &SanctionId) -> usize {
        self.patched().iter().filter(|(p, _)| p == id).count()
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    /// 同時に実行中だった更新の最大数
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// in_flight を必ず戻すためのガード
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn read_claim_status(
        &self,
        ids: &[SanctionId],
    ) -> Result<HashMap<SanctionId, ClaimCheckResult>, RemoteError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let stalled = self.faults().stall_reads;
        if stalled {
            std::future::pending::<()>().await;
        }
        let omitted = {
            let faults = self.faults();
            if let Some(err) = &faults.read_error {
                return Err(err.clone());
            }
            faults.omitted_from_reads.clone()
        };
        let records = self.records();
        Ok(ids
            .iter()
            .filter(|id| !omitted.contains(*id))
            .filter_map(|id| records.get(id))
            .map(|record| {
                (
                    record.id.clone(),
                    ClaimCheckResult {
                        id: record.id.clone(),
                        claim_marker: record.hr_comment.clone(),
                        updated_at: None,
                    },
                )
            })
            .collect())
    }

    async fn patch_comment(&self, id: &SanctionId, text: &str) -> Result<(), RemoteError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let (delay, error, panics) = {
            let faults = self.faults();
            (
                faults.patch_delays.get(id).copied().or(faults.patch_delay),
                faults.patch_errors.get(id).cloned(),
                faults.panic_on_patch.contains(id),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if panics {
            panic!("injected panic while patching {id}");
        }
        if let Some(err) = error {
            return Err(err);
        }

        match self.records().get_mut(id) {
            Some(record) => record.hr_comment = Some(text.to_string()),
            None => {
                return Err(RemoteError::Rejected {
                    status: 404,
                    body: format!("no record {id}"),
                });
            }
        }
        self.patch_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id.clone(), text.to_string()));
        Ok(())
    }

    async fn fetch_pending(&self) -> Result<Vec<WorkItem>, RemoteError> {
        let mut pending: Vec<WorkItem> = self
            .records()
            .values()
            .filter(|r| r.status.as_deref() == Some("aprobado") && r.hr_comment.is_none())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(pending)
    }

    async fn fetch_processed(&self, limit: usize) -> Result<Vec<WorkItem>, RemoteError> {
        Ok(self
            .records()
            .values()
            .filter(|r| r.hr_comment.is_some())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_item(&self, item: &NewSanction) -> Result<(), RemoteError> {
        // サーバー側で採番される id をここで振る
        let mut value =
            serde_json::to_value(item).map_err(|e| RemoteError::Decode(e.to_string()))?;
        if let Some(fields) = value.as_object_mut() {
            fields.insert("id".into(), ulid::Ulid::new().to_string().into());
        }
        let record: WorkItem =
            serde_json::from_value(value).map_err(|e| RemoteError::Decode(e.to_string()))?;
        self.records().insert(record.id.clone(), record);
        Ok(())
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        match &self.faults().read_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

//! AvailabilityValidator - 更新直前のクレーム確認
//!
//! # 学習ポイント
//! - 1 回の一括読み取りで「処理可能」と「処理済み」に振り分ける
//! - 読み取りに失敗したら fail open（すべて処理可能として続行し、degraded を立てる）
//! - 応答に含まれない ID も処理可能として扱う
//! - 読み取りには `request_timeout` をかける（ストア実装のタイムアウトに頼らない）
//!
//! fail open なので、検証と更新の間に他の端末がクレームした場合は
//! 二重に更新されうる。degraded は呼び出し側に警告を出させるための印。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::{ClaimPartition, RemoteError, SanctionId};
use crate::ports::RemoteStore;

pub struct AvailabilityValidator {
    store: Arc<dyn RemoteStore>,
    timeout: Duration,
}

impl AvailabilityValidator {
    pub fn new(store: Arc<dyn RemoteStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// `ids` を入力順のまま振り分ける。エラーは返さない
    pub async fn validate(&self, ids: &[SanctionId]) -> ClaimPartition {
        if ids.is_empty() {
            return ClaimPartition::default();
        }

        let read = tokio::time::timeout(self.timeout, self.store.read_claim_status(ids))
            .await
            .unwrap_or(Err(RemoteError::Timeout(self.timeout)));
        let observed = match read {
            Ok(observed) => observed,
            Err(err) => {
                warn!(error = %err, count = ids.len(), "claim check failed; treating all items as claimable");
                return ClaimPartition::fail_open(ids);
            }
        };

        let mut partition = ClaimPartition::default();
        for id in ids {
            match observed.get(id) {
                Some(result) if result.is_claimed() => {
                    debug!(sanction_id = %id, "already claimed");
                    partition.already_claimed.push(id.clone());
                }
                Some(_) => partition.claimable.push(id.clone()),
                None => {
                    warn!(sanction_id = %id, "claim status missing from response; treating as claimable");
                    partition.degraded = true;
                    partition.claimable.push(id.clone());
                }
            }
        }
        partition
    }
}

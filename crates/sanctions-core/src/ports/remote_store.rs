//! RemoteStore port - リモートのレコードストア（正本）
//!
//! 申請の承認状態とクレームマーカー（`comentarios_rrhh`）の正本はリモート側にある。
//! ローカル台帳はあくまで監査用の写しで、処理済みかどうかの判定には使わない。
//!
//! # 実装
//! - **PostgrestStore**: HTTPS + bearer 認証（本番用）
//! - **InMemoryStore**: 開発・テスト用（障害注入つき）

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{ClaimCheckResult, NewSanction, RemoteError, SanctionId, WorkItem};

/// RemoteStore はリモートストアへの読み取り・更新・挿入を提供
///
/// # 設計原則
/// - すべての呼び出しにタイムアウトがある（実装側で設定）
/// - タイムアウトと拒否（non-2xx）は `RemoteError` で区別する
/// - 自動リトライはしない
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 指定 ID のクレームマーカーと更新時刻だけを一括で読む
    ///
    /// 応答に含まれない ID はマップに入らない。
    async fn read_claim_status(
        &self,
        ids: &[SanctionId],
    ) -> Result<HashMap<SanctionId, ClaimCheckResult>, RemoteError>;

    /// 1 件のクレームマーカーを書き込む
    async fn patch_comment(&self, id: &SanctionId, text: &str) -> Result<(), RemoteError>;

    /// 承認済みかつ未処理のレコード一覧
    async fn fetch_pending(&self) -> Result<Vec<WorkItem>, RemoteError>;

    /// 処理済みレコード（新しい順、最大 `limit` 件）
    async fn fetch_processed(&self, limit: usize) -> Result<Vec<WorkItem>, RemoteError>;

    /// 1 件挿入（テスト用レコードの作成に使う）
    async fn insert_item(&self, item: &NewSanction) -> Result<(), RemoteError>;

    /// 疎通確認
    async fn ping(&self) -> Result<(), RemoteError>;
}

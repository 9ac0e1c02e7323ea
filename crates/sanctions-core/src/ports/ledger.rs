//! Ledger port - ローカル監査台帳
//!
//! 「誰が・いつ・何を処理し・何秒かかったか」を追記するだけのストア。
//! リモートの更新が正本なので、台帳への書き込み失敗で処理結果を覆してはいけない。
//!
//! # 実装
//! - **SqliteLedger**: 組み込み SQLite（本番用）
//! - **InMemoryLedger**: テスト用

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{LedgerEntry, LedgerError, LedgerStats, RunRecord, SanctionId};

/// Ledger は追記専用の監査ストア
///
/// # 並行性
/// - 複数ワーカーから同時に `append` されても安全であること
///   （実装側で直列化する）
/// - 同じ ID の追記は「後勝ち」
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn append(&self, entry: LedgerEntry) -> Result<(), LedgerError>;

    /// 履歴表示用: 指定 ID の行を引く（存在するものだけ）
    async fn lookup(
        &self,
        ids: &[SanctionId],
    ) -> Result<HashMap<SanctionId, LedgerEntry>, LedgerError>;

    async fn stats(&self, today: NaiveDate) -> Result<LedgerStats, LedgerError>;

    /// 処理実行ごとのオペレーションログ
    async fn record_run(&self, run: RunRecord) -> Result<(), LedgerError>;
}

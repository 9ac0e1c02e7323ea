//! HistoryService - 処理済みレコードの履歴表示
//!
//! リモートの処理済みレコードに台帳の行（誰が・いつ・何秒）を突き合わせる。
//! 台帳に行が無いとき（別端末で処理された等）はコメント文字列から復元する。

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::domain::{ProcessedComment, RemoteError, WorkItem};
use crate::ports::{Ledger, RemoteStore};

/// どこから処理情報を得たか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySource {
    Ledger,
    Comment,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    #[serde(flatten)]
    pub item: WorkItem,
    pub processed_by: Option<String>,
    pub processed_at: Option<String>,
    pub elapsed_secs: Option<f64>,
    pub source: HistorySource,
}

pub struct HistoryService {
    store: Arc<dyn RemoteStore>,
    ledger: Arc<dyn Ledger>,
}

impl HistoryService {
    pub fn new(store: Arc<dyn RemoteStore>, ledger: Arc<dyn Ledger>) -> Self {
        Self { store, ledger }
    }

    /// 新しい順に最大 `limit` 件
    pub async fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>, RemoteError> {
        let records = self.store.fetch_processed(limit).await?;
        Ok(self.enrich(records).await)
    }

    /// 台帳が読めなくても失敗しない（コメントからの復元だけになる）
    pub async fn enrich(&self, records: Vec<WorkItem>) -> Vec<HistoryRecord> {
        let ids: Vec<_> = records.iter().map(|r| r.id.clone()).collect();
        let local = match self.ledger.lookup(&ids).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "ledger lookup failed; falling back to comments");
                Default::default()
            }
        };

        records
            .into_iter()
            .map(|item| {
                if let Some(entry) = local.get(&item.id) {
                    return HistoryRecord {
                        processed_by: Some(entry.operator.as_str().to_string()),
                        processed_at: Some(entry.processed_at.format("%Y-%m-%d %H:%M:%S").to_string()),
                        elapsed_secs: Some(entry.elapsed_secs),
                        source: HistorySource::Ledger,
                        item,
                    };
                }
                match item.hr_comment.as_deref().and_then(ProcessedComment::parse) {
                    Some(parsed) => HistoryRecord {
                        processed_by: Some(parsed.operator),
                        processed_at: Some(parsed.stamp),
                        elapsed_secs: None,
                        source: HistorySource::Comment,
                        item,
                    },
                    None => HistoryRecord {
                        processed_by: None,
                        processed_at: None,
                        elapsed_secs: None,
                        source: HistorySource::Unknown,
                        item,
                    },
                }
            })
            .collect()
    }
}

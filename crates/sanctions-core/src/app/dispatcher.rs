//! BatchDispatcher - 固定サイズのワーカープールでバッチを実行
//!
//! # 学習ポイント
//! - N 個のワーカーが共有キュー（`Mutex<VecDeque<Batch>>`）からバッチを取る
//! - バッチ内は逐次、バッチ間は並行（同時に更新中のアイテムは最大 N 件）
//! - 各バッチを別タスクで動かし、panic をそのバッチの失敗に閉じ込める
//! - 停止要求が来たら新しいバッチを取らない（実行中のバッチは最後まで流す）
//!
//! # アイテム 1 件の流れ
//! 1. クレームマーカーを書く（タイムアウトつき）
//! 2. 成功したら台帳に追記（ベストエフォート、失敗はログだけ）
//! 3. 進捗を通知

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::app::cancel::CancelSignal;
use crate::domain::{
    BatchOutcome, ItemFailure, LedgerEntry, LedgerError, OperatorId, ProcessedComment, RemoteError, RunId,
    SanctionId, WorkItem,
};
use crate::ports::{Clock, Ledger, ProgressSink, RemoteStore};

/// Batch は最大 `batch_size` 件のアイテム
#[derive(Debug, Clone)]
pub struct Batch {
    pub index: usize,
    pub items: Vec<WorkItem>,
}

impl Batch {
    pub fn ids(&self) -> Vec<SanctionId> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }
}

/// 入力順を保ったまま ceil(N / batch_size) 個に分ける
pub fn partition(items: Vec<WorkItem>, batch_size: usize) -> Vec<Batch> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(batch_size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        let items: Vec<WorkItem> = iter.by_ref().take(batch_size).collect();
        batches.push(Batch {
            index: batches.len(),
            items,
        });
    }
    batches
}

/// ワーカープールの設定
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub batch_size: usize,
    pub max_workers: usize,
    pub request_timeout: Duration,
    pub ledger_timeout: Duration,
    pub processed_message: String,
}

/// 1 回の実行で共有するもの
pub struct DispatchContext {
    pub run_id: RunId,
    pub operator: OperatorId,
    pub progress: Arc<dyn ProgressSink>,
    pub cancel: CancelSignal,
}

/// dispatch の結果
///
/// `outcomes` はバッチ番号順。停止要求で取られなかったバッチのアイテム数は
/// `not_dispatched` に入る。
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<BatchOutcome>,
    pub not_dispatched: usize,
}

pub struct BatchDispatcher {
    store: Arc<dyn RemoteStore>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    settings: DispatchSettings,
}

/// ワーカーとバッチタスクが共有する状態
struct Shared {
    store: Arc<dyn RemoteStore>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    settings: DispatchSettings,
    run_id: RunId,
    operator: OperatorId,
    progress: Arc<dyn ProgressSink>,
    done: AtomicUsize,
    total: usize,
}

impl BatchDispatcher {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            ledger,
            clock,
            settings,
        }
    }

    pub async fn dispatch(&self, items: Vec<WorkItem>, ctx: DispatchContext) -> DispatchReport {
        let total = items.len();
        let batches = partition(items, self.settings.batch_size);
        if batches.is_empty() {
            return DispatchReport::default();
        }

        let workers = self.settings.max_workers.max(1).min(batches.len());
        info!(
            run_id = %ctx.run_id,
            items = total,
            batches = batches.len(),
            workers,
            "dispatching batches"
        );

        let shared = Arc::new(Shared {
            store: Arc::clone(&self.store),
            ledger: Arc::clone(&self.ledger),
            clock: Arc::clone(&self.clock),
            settings: self.settings.clone(),
            run_id: ctx.run_id,
            operator: ctx.operator,
            progress: ctx.progress,
            done: AtomicUsize::new(0),
            total,
        });
        let queue = Arc::new(Mutex::new(batches.into_iter().collect::<VecDeque<_>>()));
        let (tx, mut rx) = mpsc::unbounded_channel::<BatchOutcome>();

        let mut joins = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let queue = Arc::clone(&queue);
            let shared = Arc::clone(&shared);
            let cancel = ctx.cancel.clone();
            let tx = tx.clone();
            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, queue, shared, cancel, tx).await;
            }));
        }
        drop(tx);

        let mut outcomes = Vec::new();
        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }
        for join in joins {
            if let Err(e) = join.await {
                error!(error = %e, "worker task ended abnormally");
            }
        }

        let not_dispatched: usize = queue.lock().await.iter().map(|b| b.items.len()).sum();
        if not_dispatched > 0 {
            warn!(run_id = %shared.run_id, not_dispatched, "cancelled before every batch was dispatched");
        }
        outcomes.sort_by_key(|o| o.batch_index);
        DispatchReport {
            outcomes,
            not_dispatched,
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<VecDeque<Batch>>>,
    shared: Arc<Shared>,
    cancel: CancelSignal,
    tx: mpsc::UnboundedSender<BatchOutcome>,
) {
    loop {
        if cancel.is_requested() {
            debug!(worker_id, "cancel requested; worker stops taking batches");
            break;
        }
        // ロックは pop の間だけ
        let Some(batch) = queue.lock().await.pop_front() else {
            break;
        };

        let index = batch.index;
        let ids = batch.ids();
        // panic 時に未報告の件数だけ進捗を進めるため
        let reported = Arc::new(AtomicUsize::new(0));
        let task = tokio::spawn(run_batch(Arc::clone(&shared), batch, Arc::clone(&reported)));
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(worker_id, batch = index, error = %e, "batch task panicked");
                let outcome = BatchOutcome::all_failed(index, &ids, "batch aborted: worker panicked");
                shared.report_done(ids.len().saturating_sub(reported.load(Ordering::SeqCst)));
                outcome
            }
        };
        shared.report_batch_done();

        if tx.send(outcome).is_err() {
            break;
        }
    }
}

async fn run_batch(shared: Arc<Shared>, batch: Batch, reported: Arc<AtomicUsize>) -> BatchOutcome {
    let mut outcome = BatchOutcome::new(batch.index);
    debug!(run_id = %shared.run_id, batch = batch.index, size = batch.items.len(), "batch started");

    for item in &batch.items {
        let started = Instant::now();
        let comment = ProcessedComment::new(
            &shared.settings.processed_message,
            &shared.clock.now(),
            &shared.operator,
        )
        .render();

        let result = tokio::time::timeout(
            shared.settings.request_timeout,
            shared.store.patch_comment(&item.id, &comment),
        )
        .await
        .unwrap_or(Err(RemoteError::Timeout(shared.settings.request_timeout)));

        match result {
            Ok(()) => {
                let elapsed = started.elapsed();
                debug!(
                    sanction_id = %item.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "item processed"
                );
                shared.append_ledger(item, elapsed).await;
                outcome.record_success(item.id.clone(), comment);
            }
            Err(err) => {
                warn!(sanction_id = %item.id, batch = batch.index, error = %err, "item failed");
                outcome.record_failure(ItemFailure::from_remote(item.id.clone(), &err));
            }
        }
        shared.report_done(1);
        reported.fetch_add(1, Ordering::SeqCst);
    }

    outcome
}

impl Shared {
    /// 台帳への追記。失敗しても結果は変えない
    async fn append_ledger(&self, item: &WorkItem, elapsed: Duration) {
        let limit = self.settings.ledger_timeout;
        let entry = LedgerEntry::for_item(
            item,
            &self.operator,
            self.clock.now(),
            elapsed.as_secs_f64(),
        );
        let written = tokio::time::timeout(limit, self.ledger.append(entry))
            .await
            .unwrap_or(Err(LedgerError::Timeout(limit)));
        if let Err(e) = written {
            warn!(sanction_id = %item.id, error = %e, "ledger append failed; result unaffected");
        }
    }

    fn report_done(&self, n: usize) {
        let done = self.done.fetch_add(n, Ordering::SeqCst) + n;
        self.progress
            .report(&format!("Procesadas: {done}/{}", self.total));
    }

    fn report_batch_done(&self) {
        let done = self.done.load(Ordering::SeqCst);
        self.progress
            .report(&format!("Lote completado. Total: {done}/{}", self.total));
    }
}

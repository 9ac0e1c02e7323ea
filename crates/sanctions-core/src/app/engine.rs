//! ProcessingEngine - 検証 → 分配 → 集計 の 1 回分の実行
//!
//! # 学習ポイント
//! - 入力検証は I/O の前に同期的に（EngineError）
//! - アイテム単位の失敗はエラーにせず ProcessingSummary に集める
//! - 処理済みと判定されたアイテムは BatchDispatcher に渡さない
//!
//! # 実行の流れ
//! 1. 入力検証（空・オペレーター未指定・設定不正）
//! 2. RunId 採番と ID の重複除去（先勝ち）
//! 3. AvailabilityValidator で一括確認（失敗時は fail open）
//! 4. BatchDispatcher で並行更新
//! 5. ResultAggregator で集計し、成功したコメントを呼び出し側のアイテムに書き戻す
//! 6. オペレーションログを台帳に追記（ベストエフォート）

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::app::aggregator::ResultAggregator;
use crate::app::cancel::CancelSignal;
use crate::app::dispatcher::{BatchDispatcher, DispatchContext, DispatchReport, DispatchSettings};
use crate::app::validator::AvailabilityValidator;
use crate::domain::{EngineError, LedgerError, OperatorId, ProcessingSummary, RunRecord, WorkItem};
use crate::ports::{Clock, IdGenerator, Ledger, ProgressSink};

/// エンジンの設定
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub batch_size: usize,
    pub max_workers: usize,
    pub request_timeout: Duration,
    pub ledger_timeout: Duration,
    pub processed_message: String,
    pub error_sample_limit: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_workers: 5,
            request_timeout: Duration::from_secs(10),
            ledger_timeout: Duration::from_secs(5),
            processed_message: "Procesado para nómina".to_string(),
            error_sample_limit: 5,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.batch_size == 0 {
            return Err(EngineError::InvalidSettings("batch size must be > 0".into()));
        }
        if self.max_workers == 0 {
            return Err(EngineError::InvalidSettings("worker count must be > 0".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(EngineError::InvalidSettings("request timeout must be > 0".into()));
        }
        if self.ledger_timeout.is_zero() {
            return Err(EngineError::InvalidSettings("ledger timeout must be > 0".into()));
        }
        Ok(())
    }

    pub(crate) fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            batch_size: self.batch_size,
            max_workers: self.max_workers,
            request_timeout: self.request_timeout,
            ledger_timeout: self.ledger_timeout,
            processed_message: self.processed_message.clone(),
        }
    }
}

/// ProcessingEngine は EngineBuilder で組み立てる
pub struct ProcessingEngine {
    pub(crate) validator: AvailabilityValidator,
    pub(crate) dispatcher: BatchDispatcher,
    pub(crate) aggregator: ResultAggregator,
    pub(crate) ledger: Arc<dyn Ledger>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) settings: EngineSettings,
}

impl ProcessingEngine {
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// 選択されたアイテムを処理する
    ///
    /// 成功したアイテムは `items` 側の `hr_comment` に新しいコメントが入る。
    pub async fn process(
        &self,
        items: &mut [WorkItem],
        operator: &OperatorId,
        progress: Arc<dyn ProgressSink>,
        cancel: CancelSignal,
    ) -> Result<ProcessingSummary, EngineError> {
        if items.is_empty() {
            return Err(EngineError::EmptyInput);
        }
        if operator.is_blank() {
            return Err(EngineError::MissingOperator);
        }
        self.settings.validate()?;

        let started = Instant::now();
        let run_id = self.ids.generate_run_id();

        let mut seen = HashSet::new();
        let unique: Vec<WorkItem> = items
            .iter()
            .filter(|item| seen.insert(item.id.clone()))
            .cloned()
            .collect();
        info!(
            run_id = %run_id,
            operator = %operator,
            requested = items.len(),
            unique = unique.len(),
            "processing run started"
        );

        let ids: Vec<_> = unique.iter().map(|item| item.id.clone()).collect();
        let partition = self.validator.validate(&ids).await;
        progress.report(&format!(
            "Validadas: {} disponibles, {} ocupadas",
            partition.claimable.len(),
            partition.already_claimed.len()
        ));
        if partition.degraded {
            warn!(run_id = %run_id, "availability check degraded; proceeding fail-open");
        }

        let claimable: HashSet<_> = partition.claimable.iter().collect();
        let to_dispatch: Vec<WorkItem> = unique
            .iter()
            .filter(|item| claimable.contains(&item.id))
            .cloned()
            .collect();
        let dispatched = to_dispatch.len();

        let report = if to_dispatch.is_empty() {
            DispatchReport::default()
        } else {
            self.dispatcher
                .dispatch(
                    to_dispatch,
                    DispatchContext {
                        run_id,
                        operator: operator.clone(),
                        progress,
                        cancel,
                    },
                )
                .await
        };

        let mut summary = self
            .aggregator
            .aggregate(
                unique.len(),
                partition.already_claimed.len(),
                report.not_dispatched,
                report.outcomes,
                started.elapsed(),
            )
            .with_run_id(run_id);
        summary.validation_degraded = partition.degraded;

        let applied: HashMap<_, _> = summary
            .applied
            .iter()
            .map(|a| (&a.id, &a.comment))
            .collect();
        for item in items.iter_mut() {
            if let Some(comment) = applied.get(&item.id) {
                item.hr_comment = Some((*comment).clone());
            }
        }

        self.record_run(operator, items.len(), dispatched, &summary).await;

        info!(
            run_id = %run_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            already_claimed = summary.already_claimed,
            not_dispatched = summary.not_dispatched,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "processing run finished"
        );
        Ok(summary)
    }

    async fn record_run(
        &self,
        operator: &OperatorId,
        requested: usize,
        dispatched: usize,
        summary: &ProcessingSummary,
    ) {
        let run = RunRecord {
            at: self.clock.now(),
            operator: operator.clone(),
            operation: RunRecord::BULK_PROCESSING.to_string(),
            detail: format!("{requested} sanciones solicitadas, {dispatched} procesadas"),
            result: format!(
                "Exitosas: {}, Fallidas: {}, Tiempo: {:.2}s",
                summary.succeeded,
                summary.failed,
                summary.elapsed.as_secs_f64()
            ),
        };
        let limit = self.settings.ledger_timeout;
        let written = tokio::time::timeout(limit, self.ledger.record_run(run))
            .await
            .unwrap_or(Err(LedgerError::Timeout(limit)));
        if let Err(e) = written {
            warn!(error = %e, "operation log write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::builder::EngineBuilder;
    use crate::app::cancel::CancelHandle;
    use crate::domain::{RemoteError, SanctionId};
    use crate::impls::{InMemoryLedger, InMemoryStore};
    use crate::ports::{FixedClock, NoopProgress, UlidGenerator};
    use chrono::{Local, TimeZone};
    use rstest::rstest;
    use std::sync::Mutex;

    const CLAIMED_BY_OTHER: &str = "Procesado para nómina - 2024-03-01 09:00 - jose";

    struct Harness {
        store: Arc<InMemoryStore>,
        ledger: Arc<InMemoryLedger>,
        engine: ProcessingEngine,
    }

    fn harness(ids: &[&str], settings: EngineSettings) -> Harness {
        let store = Arc::new(InMemoryStore::with_items(
            ids.iter().map(|id| WorkItem::new(*id)),
        ));
        let ledger = Arc::new(InMemoryLedger::new());
        let clock = FixedClock::new(Local.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap());
        let engine = EngineBuilder::new()
            .remote_store(store.clone())
            .ledger(ledger.clone())
            .clock(Arc::new(clock.clone()))
            .id_generator(Arc::new(UlidGenerator::new(clock)))
            .settings(settings)
            .build()
            .unwrap();
        Harness {
            store,
            ledger,
            engine,
        }
    }

    fn work(ids: &[&str]) -> Vec<WorkItem> {
        ids.iter().map(|id| WorkItem::new(*id)).collect()
    }

    fn maria() -> OperatorId {
        OperatorId::new("maria")
    }

    async fn run(h: &Harness, items: &mut [WorkItem]) -> ProcessingSummary {
        h.engine
            .process(items, &maria(), Arc::new(NoopProgress), CancelSignal::never())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn already_claimed_item_is_skipped() {
        let h = harness(&["A", "B", "C", "D"], EngineSettings::default());
        h.store.claim_externally(&SanctionId::new("B"), CLAIMED_BY_OTHER);
        let mut items = work(&["A", "B", "C", "D"]);

        let summary = run(&h, &mut items).await;

        assert_eq!(
            (summary.succeeded, summary.failed, summary.already_claimed),
            (3, 0, 1)
        );
        assert_eq!(h.store.patch_count(&SanctionId::new("B")), 0);
        assert_eq!(
            h.store.get(&SanctionId::new("B")).unwrap().hr_comment.as_deref(),
            Some(CLAIMED_BY_OTHER)
        );
        assert!(summary.is_conserved());
    }

    #[tokio::test]
    async fn timed_out_item_is_reported_with_short_id() {
        let settings = EngineSettings {
            request_timeout: Duration::from_millis(50),
            ..EngineSettings::default()
        };
        let h = harness(&["A", "B", "C", "D"], settings);
        h.store.claim_externally(&SanctionId::new("B"), CLAIMED_BY_OTHER);
        h.store.delay_patch("C", Duration::from_millis(500));
        let mut items = work(&["A", "B", "C", "D"]);

        let summary = run(&h, &mut items).await;

        assert_eq!(
            (summary.succeeded, summary.failed, summary.already_claimed),
            (2, 1, 1)
        );
        assert!(summary.errors[0].starts_with("C: timeout"), "{:?}", summary.errors);
        assert!(items[2].hr_comment.is_none());
    }

    #[tokio::test]
    async fn second_run_does_not_mutate_again() {
        let h = harness(&["A", "B"], EngineSettings::default());

        let first = run(&h, &mut work(&["A", "B"])).await;
        let second = run(&h, &mut work(&["A", "B"])).await;

        assert_eq!(first.succeeded, 2);
        assert_eq!(second.succeeded, 0);
        assert_eq!(second.already_claimed, 2);
        assert_eq!(h.store.patch_count(&SanctionId::new("A")), 1);
        assert_eq!(h.store.patch_count(&SanctionId::new("B")), 1);
    }

    #[tokio::test]
    async fn comments_are_written_back_into_caller_items() {
        let h = harness(&["A", "B"], EngineSettings::default());
        h.store.fail_patch(
            "B",
            RemoteError::Rejected {
                status: 500,
                body: "boom".into(),
            },
        );
        let mut items = work(&["A", "B"]);

        run(&h, &mut items).await;

        assert_eq!(
            items[0].hr_comment.as_deref(),
            Some("Procesado para nómina - 2024-03-01 10:30 - maria")
        );
        assert!(items[1].hr_comment.is_none());
    }

    #[tokio::test]
    async fn failed_validation_read_fails_open_and_is_flagged() {
        let h = harness(&["A", "B"], EngineSettings::default());
        h.store.fail_reads(RemoteError::Transport("connection reset".into()));

        let summary = run(&h, &mut work(&["A", "B"])).await;

        assert!(summary.validation_degraded);
        assert_eq!(summary.succeeded, 2);
    }

    #[tokio::test]
    async fn stalled_validation_read_is_cut_off_by_request_timeout() {
        let settings = EngineSettings {
            request_timeout: Duration::from_millis(50),
            ..EngineSettings::default()
        };
        let h = harness(&["A", "B"], settings);
        h.store.stall_reads();

        let summary = tokio::time::timeout(Duration::from_secs(2), run(&h, &mut work(&["A", "B"])))
            .await
            .expect("run should finish once the claim read times out");

        assert!(summary.validation_degraded);
        assert_eq!(summary.succeeded, 2);
        assert!(summary.is_conserved());
    }

    #[tokio::test]
    async fn duplicate_ids_are_processed_once() {
        let h = harness(&["A", "B"], EngineSettings::default());
        let mut items = work(&["A", "A", "B"]);

        let summary = run(&h, &mut items).await;

        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(h.store.patch_count(&SanctionId::new("A")), 1);
        assert!(items.iter().all(|i| i.hr_comment.is_some()));
    }

    #[tokio::test]
    async fn empty_input_is_rejected_before_io() {
        let h = harness(&["A"], EngineSettings::default());
        let err = h
            .engine
            .process(&mut [], &maria(), Arc::new(NoopProgress), CancelSignal::never())
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::EmptyInput);
        assert_eq!(h.store.read_calls(), 0);
    }

    #[tokio::test]
    async fn blank_operator_is_rejected() {
        let h = harness(&["A"], EngineSettings::default());
        let err = h
            .engine
            .process(
                &mut work(&["A"]),
                &OperatorId::new("  "),
                Arc::new(NoopProgress),
                CancelSignal::never(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::MissingOperator);
    }

    #[tokio::test]
    async fn all_claimed_dispatches_nothing() {
        let h = harness(&["A", "B"], EngineSettings::default());
        h.store.claim_externally(&SanctionId::new("A"), CLAIMED_BY_OTHER);
        h.store.claim_externally(&SanctionId::new("B"), CLAIMED_BY_OTHER);

        let summary = run(&h, &mut work(&["A", "B"])).await;

        assert_eq!(summary.already_claimed, 2);
        assert_eq!(summary.succeeded + summary.failed + summary.not_dispatched, 0);
        assert!(h.store.patched().is_empty());
    }

    #[tokio::test]
    async fn run_is_logged_to_ledger() {
        let h = harness(&["A", "B"], EngineSettings::default());

        run(&h, &mut work(&["A", "B"])).await;

        let runs = h.ledger.runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].operation, "PROCESAMIENTO_MASIVO");
        assert_eq!(runs[0].detail, "2 sanciones solicitadas, 2 procesadas");
        assert_eq!(runs[0].at, Local.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap());
        assert_eq!(h.ledger.entries().len(), 2);
    }

    #[tokio::test]
    async fn broken_ledger_does_not_affect_summary() {
        let h = harness(&["A", "B"], EngineSettings::default());
        h.ledger.set_failing(true);

        let summary = run(&h, &mut work(&["A", "B"])).await;

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn progress_starts_with_validation_counts() {
        let h = harness(&["A", "B", "C"], EngineSettings::default());
        h.store.claim_externally(&SanctionId::new("C"), CLAIMED_BY_OTHER);
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = {
            let seen = seen.clone();
            move |m: &str| seen.lock().unwrap().push(m.to_string())
        };

        h.engine
            .process(
                &mut work(&["A", "B", "C"]),
                &maria(),
                Arc::new(sink),
                CancelSignal::never(),
            )
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], "Validadas: 2 disponibles, 1 ocupadas");
        assert_eq!(seen.last().unwrap(), "Lote completado. Total: 2/2");
    }

    #[tokio::test]
    async fn cancelled_run_counts_undispatched_items() {
        let h = harness(&["A", "B", "C"], EngineSettings::default());
        let (handle, signal) = CancelHandle::new();
        handle.request();

        let summary = h
            .engine
            .process(&mut work(&["A", "B", "C"]), &maria(), Arc::new(NoopProgress), signal)
            .await
            .unwrap();

        assert_eq!(summary.not_dispatched, 3);
        assert!(summary.is_conserved());
    }

    #[rstest]
    #[case(1, 1)]
    #[case(3, 2)]
    #[case(10, 5)]
    #[case(2, 8)]
    #[tokio::test]
    async fn counts_always_add_up(#[case] batch_size: usize, #[case] max_workers: usize) {
        let ids: Vec<String> = (0..17).map(|i| format!("s{i:02}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let h = harness(
            &refs,
            EngineSettings {
                batch_size,
                max_workers,
                ..EngineSettings::default()
            },
        );
        h.store.claim_externally(&SanctionId::new("s03"), CLAIMED_BY_OTHER);
        h.store.claim_externally(&SanctionId::new("s11"), CLAIMED_BY_OTHER);
        h.store.fail_patch("s05", RemoteError::Transport("reset".into()));

        let summary = run(&h, &mut work(&refs)).await;

        assert_eq!(summary.total, 17);
        assert_eq!(summary.already_claimed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 14);
        assert!(summary.is_conserved());
        assert!(h.store.max_in_flight() <= max_workers);
    }
}

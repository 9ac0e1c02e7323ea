//! sanctions-core
//!
//! 承認済みの懲戒申請（sanction）を人事担当者がまとめて「処理済み」にするための
//! 並行バッチ処理エンジン。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, item, category, comment, claim, outcome, ledger, errors）
//! - **ports**: 抽象化レイヤー（RemoteStore, Ledger, Clock, IdGenerator, ProgressSink）
//! - **impls**: 実装（PostgrestStore, SqliteLedger, InMemoryStore, InMemoryLedger）
//! - **app**: エンジン（validator, dispatcher, aggregator, engine, builder, cancel, history）
//! - **config**: 設定の読み込みと検証
//! - **observability**: tracing の初期化
//!
//! # 不変条件
//! - 処理済みと判定されたアイテムは更新しない
//! - 同時に更新中のアイテムは最大 `max_workers` 件
//! - `succeeded + failed + already_claimed + not_dispatched == total`
//! - 台帳の失敗でリモートの成功を覆さない

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;

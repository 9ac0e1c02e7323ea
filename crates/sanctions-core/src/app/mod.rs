//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせて処理エンジンを実装します。
//!
//! # 主要コンポーネント
//! - **EngineBuilder**: エンジンの構築とワイヤリング
//! - **ProcessingEngine**: 1 回分の実行（検証 → 分配 → 集計）
//! - **AvailabilityValidator**: 更新直前のクレーム確認
//! - **BatchDispatcher**: ワーカープールでのバッチ実行
//! - **ResultAggregator**: 結果の集計
//! - **HistoryService**: 処理済み履歴の表示用データ

pub mod aggregator;
pub mod builder;
pub mod cancel;
pub mod dispatcher;
pub mod engine;
pub mod history;
pub mod validator;

// 主要な型を再エクスポート
pub use self::aggregator::ResultAggregator;
pub use self::builder::{BuildError, EngineBuilder};
pub use self::cancel::{CancelHandle, CancelSignal};
pub use self::dispatcher::{BatchDispatcher, DispatchSettings};
pub use self::engine::{EngineSettings, ProcessingEngine};
pub use self::history::{HistoryRecord, HistoryService, HistorySource};
pub use self::validator::AvailabilityValidator;

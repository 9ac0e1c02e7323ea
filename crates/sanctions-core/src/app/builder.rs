//! EngineBuilder - エンジンの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 開発体験の改善（明確なエラーメッセージ）

use std::sync::Arc;

use crate::app::aggregator::ResultAggregator;
use crate::app::dispatcher::BatchDispatcher;
use crate::app::engine::{EngineSettings, ProcessingEngine};
use crate::app::validator::AvailabilityValidator;
use crate::domain::EngineError;
use crate::ports::{Clock, IdGenerator, Ledger, RemoteStore, SystemClock, UlidGenerator};

/// EngineBuilder は ProcessingEngine を構築
///
/// # 使用例
/// ```ignore
/// let engine = EngineBuilder::new()
///     .remote_store(Arc::new(PostgrestStore::from_config(&config.remote)?))
///     .ledger(Arc::new(SqliteLedger::open(&config.ledger.path)?))
///     .settings(config.engine_settings())
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - RemoteStore と Ledger は必須。足りなければ BuildError
/// - 設定は build() 時に検証する
/// - Clock / IdGenerator は省略するとシステム時刻ベース
#[derive(Default)]
pub struct EngineBuilder {
    store: Option<Arc<dyn RemoteStore>>,
    ledger: Option<Arc<dyn Ledger>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    settings: EngineSettings,
}

/// BuildError はエンジン構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing dependency: {0}. It must be supplied before build().")]
    MissingDependency(&'static str),

    #[error(transparent)]
    InvalidSettings(#[from] EngineError),
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remote_store(mut self, store: Arc<dyn RemoteStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// # 検証
    /// - 必須の依存が揃っているか
    /// - 設定値が正か（batch size / workers / timeouts）
    pub fn build(self) -> Result<ProcessingEngine, BuildError> {
        let store = self.store.ok_or(BuildError::MissingDependency("remote store"))?;
        let ledger = self.ledger.ok_or(BuildError::MissingDependency("ledger"))?;
        self.settings.validate()?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock)) as Arc<dyn IdGenerator>);

        Ok(ProcessingEngine {
            validator: AvailabilityValidator::new(Arc::clone(&store), self.settings.request_timeout),
            dispatcher: BatchDispatcher::new(
                store,
                Arc::clone(&ledger),
                Arc::clone(&clock),
                self.settings.dispatch_settings(),
            ),
            aggregator: ResultAggregator::new(self.settings.error_sample_limit),
            ledger,
            ids,
            clock,
            settings: self.settings,
        })
    }
}

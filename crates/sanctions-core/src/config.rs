//! Config - 設定の読み込みと検証
//!
//! # 優先順位
//! 1. 既定値（すべての項目にある）
//! 2. YAML ファイル
//! 3. 環境変数 `SANCTIONS_*`
//!
//! `.env` の読み込みは CLI 側（dotenvy）で行う。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::app::EngineSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub remote: RemoteConfig,
    pub ledger: LedgerConfig,
    pub processing: ProcessingConfig,
    /// 既定のオペレーター名（CLI 引数が優先）
    pub operator: Option<String>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: String,
    pub table: String,
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            table: "sanciones".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// api_key はログに出さない
impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key = if self.api_key.is_empty() { "" } else { "***" };
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &key)
            .field("table", &self.table)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub path: PathBuf,
    /// 1 回の追記に待つ上限
    pub write_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("procesadas.db"),
            write_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub batch_size: usize,
    pub max_workers: usize,
    pub processed_message: String,
    pub error_sample_limit: usize,
    pub history_limit: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_workers: 5,
            processed_message: "Procesado para nómina".to_string(),
            error_sample_limit: 5,
            history_limit: 1000,
        }
    }
}

impl AppConfig {
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&content)?;
        debug!(path = %path.display(), "configuration loaded from file");
        Ok(config)
    }

    /// プロセス環境から上書き
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|var| std::env::var(var).ok())
    }

    /// `lookup` で引いた値で上書きする（テストでは環境変数を触らずに済む）
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SANCTIONS_BASE_URL") {
            self.remote.base_url = v;
        }
        if let Some(v) = lookup("SANCTIONS_API_KEY") {
            self.remote.api_key = v;
        }
        if let Some(v) = lookup("SANCTIONS_TABLE") {
            self.remote.table = v;
        }
        if let Some(v) = lookup("SANCTIONS_TIMEOUT_SECS") {
            self.remote.request_timeout_secs = parse_number("SANCTIONS_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("SANCTIONS_LEDGER_PATH") {
            self.ledger.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("SANCTIONS_BATCH_SIZE") {
            self.processing.batch_size = parse_number("SANCTIONS_BATCH_SIZE", v)?;
        }
        if let Some(v) = lookup("SANCTIONS_MAX_WORKERS") {
            self.processing.max_workers = parse_number("SANCTIONS_MAX_WORKERS", v)?;
        }
        if let Some(v) = lookup("SANCTIONS_OPERATOR") {
            self.operator = Some(v);
        }
        Ok(())
    }

    /// リモート資格情報以外の検証
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.processing;
        if p.batch_size == 0 {
            return Err(ConfigError::Invalid("processing.batch_size must be > 0".into()));
        }
        if p.max_workers == 0 {
            return Err(ConfigError::Invalid("processing.max_workers must be > 0".into()));
        }
        if p.error_sample_limit == 0 {
            return Err(ConfigError::Invalid(
                "processing.error_sample_limit must be > 0".into(),
            ));
        }
        if self.remote.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "remote.request_timeout_secs must be > 0".into(),
            ));
        }
        if self.ledger.write_timeout_secs == 0 {
            return Err(ConfigError::Invalid("ledger.write_timeout_secs must be > 0".into()));
        }
        if self.remote.table.trim().is_empty() {
            return Err(ConfigError::Invalid("remote.table must not be empty".into()));
        }
        Ok(())
    }

    /// リモートストアを使うコマンドの前に呼ぶ
    pub fn validate_remote(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.remote.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("remote.base_url is not set".into()));
        }
        if self.remote.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid("remote.api_key is not set".into()));
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            batch_size: self.processing.batch_size,
            max_workers: self.processing.max_workers,
            request_timeout: self.remote.request_timeout(),
            ledger_timeout: Duration::from_secs(self.ledger.write_timeout_secs),
            processed_message: self.processing.processed_message.clone(),
            error_sample_limit: self.processing.error_sample_limit,
        }
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}

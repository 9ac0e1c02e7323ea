//! Errors - エラー型と分類
//!
//! # 分類
//! - **Transient**: タイムアウト・接続失敗。検証読み取りでは fail open、更新では該当アイテムだけ失敗
//! - **Rejection**: リモートストアが non-2xx を返した（競合・権限など）
//! - **Infrastructure**: ローカル台帳の障害。ログに残して握りつぶす
//! - **Contract**: 呼び出し側の入力不正。I/O の前に同期的に返す
//!
//! 自動リトライはどの分類でも行わない（リトライは呼び出し側の責任）。

use std::time::Duration;

use thiserror::Error;

/// ErrorKind は実行エラーの運用分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Rejection,
    Infrastructure,
    Contract,
}

/// RemoteStore 呼び出しのエラー
///
/// タイムアウトと拒否（non-2xx）を区別して報告する。
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RemoteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::Timeout(_) | RemoteError::Transport(_) => ErrorKind::Transient,
            RemoteError::Rejected { .. } | RemoteError::Decode(_) => ErrorKind::Rejection,
            RemoteError::InvalidRequest(_) => ErrorKind::Contract,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RemoteError::Timeout(_))
    }
}

/// LocalLedger のエラー
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("ledger lock poisoned")]
    Poisoned,

    #[error("ledger task failed: {0}")]
    Join(String),

    #[error("ledger write timed out after {0:?}")]
    Timeout(Duration),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Infrastructure
    }
}

/// EngineError は処理全体を中断するエラー
///
/// I/O を始める前の入力検証でのみ発生する。アイテム単位の失敗は
/// `ProcessingSummary` に集計され、ここには来ない。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("no work items supplied")]
    EmptyInput,

    #[error("operator must not be blank")]
    MissingOperator,

    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Contract
    }
}

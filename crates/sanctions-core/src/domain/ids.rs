//! Domain identifiers (strongly-typed IDs).
//!
//! # ID の種類
//! - **SanctionId**: リモートストアが採番したレコード ID（UUID 文字列）。こちらでは生成しない
//! - **OperatorId**: 処理を実行したオペレーター（ログインユーザー名）
//! - **RunId**: 1 回の処理実行を識別する ULID。ログの相関とローカル監査ログに使う
//!
//! ## Phantom Type パターン
//! `Id<T>` は ULID を包むジェネリック型で、`T` はコンパイル時だけ使うマーカーです。
//! 今は `RunId` だけですが、ULID 系の ID を増やすときはマーカーを足すだけで済みます。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// リモートストア上のレコード ID
///
/// 中身は不透明な文字列として扱う（UUID であることを前提にしない）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SanctionId(String);

impl SanctionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 表示用の短縮形（先頭 8 文字）
    ///
    /// エラーメッセージやログはこの形で出す。
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for SanctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SanctionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SanctionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// 処理を実行したオペレーター
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatorId(String);

impl OperatorId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// IdMarker は各 ULID 系 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// Display で使うプレフィックス（例: "run-"）
    fn prefix() -> &'static str;
}

/// ジェネリック ULID ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Run のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Run {}

impl IdMarker for Run {
    fn prefix() -> &'static str {
        "run-"
    }
}

/// Identifier of one processing run (validate → dispatch → aggregate).
pub type RunId = Id<Run>;

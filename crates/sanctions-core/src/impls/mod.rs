//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **PostgrestStore**: 本番用のリモートストア（HTTPS）
//! - **SqliteLedger**: 本番用の監査台帳（組み込み SQLite）
//! - **InMemoryStore** / **InMemoryLedger**: 開発・テスト用（障害注入つき）

pub mod inmem_ledger;
pub mod inmem_store;
pub mod postgrest;
pub mod sqlite_ledger;

// 主要な型を再エクスポート
pub use self::inmem_ledger::InMemoryLedger;
pub use self::inmem_store::InMemoryStore;
pub use self::postgrest::PostgrestStore;
pub use self::sqlite_ledger::SqliteLedger;

//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! エンジンはここの trait だけに依存し、HTTP や SQLite の詳細は impls に閉じ込めます。
//!
//! # 設計原則
//! - リモートストアが source of truth（正本）
//! - ローカル台帳は監査用の追記ログ（ベストエフォート）
//! - 時刻と ID 生成も差し替え可能にしてテストを決定的にする

pub mod clock;
pub mod id_generator;
pub mod ledger;
pub mod progress;
pub mod remote_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::ledger::Ledger;
pub use self::progress::{NoopProgress, ProgressSink};
pub use self::remote_store::RemoteStore;

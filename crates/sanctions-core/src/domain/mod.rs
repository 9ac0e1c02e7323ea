//! Domain model (IDs, work items, claim state, outcomes, ledger rows, errors).
//!
//! I/O を一切持たない値型だけを置く。ports/impls/app はここに依存するが、
//! 逆方向の依存はない。

pub mod category;
pub mod claim;
pub mod comment;
pub mod errors;
pub mod ids;
pub mod item;
pub mod ledger;
pub mod outcome;

pub use self::category::{Category, categorize};
pub use self::claim::{ClaimCheckResult, ClaimPartition};
pub use self::comment::ProcessedComment;
pub use self::errors::{EngineError, ErrorKind, LedgerError, RemoteError};
pub use self::ids::{OperatorId, RunId, SanctionId};
pub use self::item::{NewSanction, WorkItem};
pub use self::ledger::{LedgerEntry, LedgerStats, RunRecord};
pub use self::outcome::{AppliedComment, BatchOutcome, ItemFailure, ProcessingSummary};

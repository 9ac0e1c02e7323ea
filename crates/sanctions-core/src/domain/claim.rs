//! Claim state observed right before mutation.

use serde::{Deserialize, Serialize};

use super::ids::SanctionId;

/// Current claim marker of one record, as read at validation time.
///
/// Only lives for the duration of one validation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimCheckResult {
    pub id: SanctionId,

    #[serde(rename = "comentarios_rrhh", default)]
    pub claim_marker: Option<String>,

    #[serde(default)]
    pub updated_at: Option<String>,
}

impl ClaimCheckResult {
    pub fn is_claimed(&self) -> bool {
        self.claim_marker.as_deref().is_some_and(|m| !m.is_empty())
    }
}

/// Result of `AvailabilityValidator::validate`.
///
/// `claimable` and `already_claimed` are disjoint and together cover the input
/// ids in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimPartition {
    pub claimable: Vec<SanctionId>,
    pub already_claimed: Vec<SanctionId>,
    /// The bulk read failed and every id was treated as claimable.
    pub degraded: bool,
}

impl ClaimPartition {
    pub fn fail_open(ids: &[SanctionId]) -> Self {
        Self {
            claimable: ids.to_vec(),
            already_claimed: Vec::new(),
            degraded: true,
        }
    }

    pub fn total(&self) -> usize {
        self.claimable.len() + self.already_claimed.len()
    }
}

#![forbid(unsafe_code)]

use crate::ids::BookId;
use crate::model::OutlineState;
use crate::result::MutationResult;
use serde::Serialize;

/// Where a version mismatch was caught.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStage {
    PreCheck,
    InTransaction,
}

impl ConflictStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreCheck => "pre_check",
            Self::InTransaction => "in_transaction",
        }
    }
}

/// Packages the authoritative state for a caller whose batch lost the race.
/// Divergent structural edits are never merged; the caller re-applies or
/// discards its batch against the returned outline.
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn resolve(
        book_id: &BookId,
        base_version: u64,
        current: OutlineState,
        stage: ConflictStage,
    ) -> MutationResult {
        let current_version = current.version();
        tracing::warn!(
            %book_id,
            base_version,
            current_version,
            stage = stage.as_str(),
            "outline version conflict"
        );
        MutationResult::Conflict {
            current_version,
            current_outline: current.into_outline(),
            stage,
        }
    }
}

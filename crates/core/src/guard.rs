#![forbid(unsafe_code)]

use crate::conflict::{ConflictResolver, ConflictStage};
use crate::ids::BookId;
use crate::model::OutlineState;
use crate::result::{MutationResult, RejectReason};
use crate::store::{OutlineStore, StorageError};

/// Compares a caller's base version with the stored one. A book without an
/// outline is at version 0, so a second initialization with base 0 is caught
/// exactly like any other stale write.
pub struct VersionGuard;

impl VersionGuard {
    /// Lock-free read followed by [`VersionGuard::check`].
    pub fn pre_check<S: OutlineStore>(
        store: &S,
        book_id: &BookId,
        base_version: u64,
    ) -> Result<Result<OutlineState, MutationResult>, StorageError> {
        let state = store.load(book_id)?;
        Ok(Self::check(book_id, base_version, state, ConflictStage::PreCheck))
    }

    /// Hands the state back when the caller may proceed, otherwise the
    /// result to return to the caller.
    pub fn check(
        book_id: &BookId,
        base_version: u64,
        state: OutlineState,
        stage: ConflictStage,
    ) -> Result<OutlineState, MutationResult> {
        if state.is_deleted() {
            tracing::warn!(%book_id, stage = stage.as_str(), "mutation on deleted outline");
            return Err(MutationResult::Rejected {
                reason: RejectReason::BookDeleted,
            });
        }
        if state.version() != base_version {
            return Err(ConflictResolver::resolve(book_id, base_version, state, stage));
        }
        Ok(state)
    }
}

#![forbid(unsafe_code)]

use crate::ids::{ActorId, BookId};
use crate::ops::MutationOperation;
use crate::store::{OutlineTx, StorageError};
use serde::{Deserialize, Serialize};

/// Audit entry before the store has assigned it an id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditDraft {
    pub book_id: BookId,
    pub actor_id: ActorId,
    pub base_version: u64,
    pub new_version: u64,
    pub operations_applied: Vec<MutationOperation>,
    pub inverse_operations: Vec<MutationOperation>,
    pub timestamp_ms: i64,
}

/// Immutable record of one version transition. Operations only, never
/// snapshots: the diff is reconstructable from `operations_applied` against
/// `base_version`, and `inverse_operations` undo it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub book_id: BookId,
    pub actor_id: ActorId,
    pub base_version: u64,
    pub new_version: u64,
    pub operations_applied: Vec<MutationOperation>,
    pub inverse_operations: Vec<MutationOperation>,
    pub timestamp_ms: i64,
}

impl AuditRecord {
    pub fn from_draft(id: String, draft: AuditDraft) -> Self {
        Self {
            id,
            book_id: draft.book_id,
            actor_id: draft.actor_id,
            base_version: draft.base_version,
            new_version: draft.new_version,
            operations_applied: draft.operations_applied,
            inverse_operations: draft.inverse_operations,
            timestamp_ms: draft.timestamp_ms,
        }
    }
}

pub struct AuditLogger;

impl AuditLogger {
    /// Appends the record inside the transaction that bumps the version, so
    /// the record and the transition commit or vanish together.
    pub fn append<T: OutlineTx>(tx: &mut T, draft: AuditDraft) -> Result<AuditRecord, StorageError> {
        if draft.new_version != draft.base_version + 1 {
            return Err(StorageError::Corrupt(format!(
                "audit transition {}->{} for {} is not a single step",
                draft.base_version, draft.new_version, draft.book_id
            )));
        }
        let record = tx.append_audit(&draft)?;
        tracing::debug!(
            book_id = %record.book_id,
            audit_id = %record.id,
            new_version = record.new_version,
            "audit record staged"
        );
        Ok(record)
    }
}

#![forbid(unsafe_code)]

use super::{EngineConfig, EngineError};
use crate::audit::{AuditDraft, AuditLogger, AuditRecord};
use crate::conflict::ConflictStage;
use crate::guard::VersionGuard;
use crate::model::{OutlineHeader, OutlineState};
use crate::ops::MutationRequest;
use crate::planner::MutationPlan;
use crate::result::MutationResult;
use crate::store::{OutlineStore, OutlineTx, StorageError, now_ms};
use crate::tree::OutlineTree;

enum Staged {
    Ready(AuditRecord),
    Stale(MutationResult),
}

/// Writes a validated plan as one storage transaction: in-transaction
/// version re-check, item writes, version bump, audit record, commit.
pub struct TransactionCoordinator<'a, S> {
    store: &'a mut S,
    config: &'a EngineConfig,
}

impl<'a, S: OutlineStore> TransactionCoordinator<'a, S> {
    pub fn new(store: &'a mut S, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn commit(
        &mut self,
        request: &MutationRequest,
        plan: MutationPlan,
    ) -> Result<MutationResult, EngineError> {
        let policy = self.config.retry;
        let mut attempt = 0u32;
        let record = loop {
            attempt += 1;
            match self.try_commit(request, &plan) {
                Ok(Staged::Ready(record)) => break record,
                Ok(Staged::Stale(result)) => return Ok(result),
                Err(err) if err.is_transient() && policy.allows_retry_after(attempt) => {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        book_id = %request.book_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient storage failure, retrying outline commit"
                    );
                    std::thread::sleep(delay);
                }
                Err(source) => return Err(EngineError::from_storage(attempt, source)),
            }
        };

        if self.config.verify_after_commit {
            self.verify(request, &plan, record.new_version)?;
        }

        tracing::info!(
            book_id = %request.book_id,
            actor_id = %request.actor_id,
            base_version = request.base_version,
            new_version = record.new_version,
            ops = plan.applied_ops.len(),
            attempts = attempt,
            "outline mutation applied"
        );
        Ok(MutationResult::Applied {
            new_version: record.new_version,
            applied_ops: plan.applied_ops,
            audit_id: record.id,
        })
    }

    fn try_commit(
        &mut self,
        request: &MutationRequest,
        plan: &MutationPlan,
    ) -> Result<Staged, StorageError> {
        let mut tx = self.store.begin()?;
        match stage(&mut tx, request, plan) {
            Ok(Staged::Ready(record)) => {
                tx.commit()?;
                Ok(Staged::Ready(record))
            }
            Ok(stale @ Staged::Stale(_)) => {
                tx.abort()?;
                Ok(stale)
            }
            Err(err) => {
                if let Err(abort_err) = tx.abort() {
                    tracing::warn!(
                        book_id = %request.book_id,
                        error = %abort_err,
                        "abort after failed outline write also failed"
                    );
                }
                Err(err)
            }
        }
    }

    /// Reads the outline back after commit. A newer version means another
    /// writer already moved on and there is nothing left to compare. The
    /// transition is durable by now, so a failed read only skips the check.
    fn verify(
        &self,
        request: &MutationRequest,
        plan: &MutationPlan,
        new_version: u64,
    ) -> Result<(), EngineError> {
        let state = match self.store.load(&request.book_id) {
            Ok(state) => state,
            Err(StorageError::Corrupt(message)) => {
                return Err(EngineError::from_storage(1, StorageError::Corrupt(message)));
            }
            Err(err) => {
                tracing::warn!(
                    book_id = %request.book_id,
                    new_version,
                    error = %err,
                    "post-commit read-back failed, skipping verification"
                );
                return Ok(());
            }
        };
        let violation = match &state {
            OutlineState::Active(outline) if outline.version == new_version => {
                match OutlineTree::from_items(&outline.items) {
                    Err(err) => Some(format!("stored tree is invalid: {err}")),
                    Ok(_) if outline.items != plan.items => {
                        Some("stored items differ from the committed plan".to_string())
                    }
                    Ok(_) => None,
                }
            }
            OutlineState::Active(outline) if outline.version > new_version => None,
            OutlineState::Deleted { .. } => None,
            other => Some(format!(
                "stored version {} after committing version {new_version}",
                other.version()
            )),
        };
        match violation {
            None => Ok(()),
            Some(message) => {
                let message = format!("outline {} v{new_version}: {message}", request.book_id);
                tracing::error!(book_id = %request.book_id, new_version, %message, "post-commit invariant violated");
                Err(EngineError::Fatal(message))
            }
        }
    }
}

fn stage<T: OutlineTx>(
    tx: &mut T,
    request: &MutationRequest,
    plan: &MutationPlan,
) -> Result<Staged, StorageError> {
    let state = tx.load(&request.book_id)?;
    if let Err(result) = VersionGuard::check(
        &request.book_id,
        request.base_version,
        state,
        ConflictStage::InTransaction,
    ) {
        return Ok(Staged::Stale(result));
    }

    for id in &plan.removals {
        tx.delete_item(&request.book_id, id)?;
    }
    for item in &plan.upserts {
        tx.upsert_item(&request.book_id, item)?;
    }

    let now_ms = now_ms();
    let new_version = request.base_version + 1;
    tx.write_header(&OutlineHeader {
        book_id: request.book_id.clone(),
        version: new_version,
        updated_at_ms: now_ms,
        updated_by: request.actor_id.clone(),
    })?;

    let record = AuditLogger::append(
        tx,
        AuditDraft {
            book_id: request.book_id.clone(),
            actor_id: request.actor_id.clone(),
            base_version: request.base_version,
            new_version,
            operations_applied: plan.applied_ops.clone(),
            inverse_operations: plan.inverse_ops.clone(),
            timestamp_ms: now_ms,
        },
    )?;
    Ok(Staged::Ready(record))
}

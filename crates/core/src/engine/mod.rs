#![forbid(unsafe_code)]

mod coordinator;
mod retry;

pub use coordinator::TransactionCoordinator;
pub use retry::RetryPolicy;

use crate::audit::AuditRecord;
use crate::guard::VersionGuard;
use crate::ids::{ActorId, BookId};
use crate::model::OutlineState;
use crate::ops::MutationRequest;
use crate::planner::{MutationPlanner, PlanError, PlannerLimits};
use crate::result::{MutationResult, RejectReason};
use crate::store::{OutlineStore, StorageError, now_ms};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub limits: PlannerLimits,
    pub retry: RetryPolicy,
    pub verify_after_commit: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: PlannerLimits::default(),
            retry: RetryPolicy::default(),
            verify_after_commit: true,
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    /// Storage failed and retries (if any applied) were exhausted. The
    /// stored version is unchanged: failures after a successful commit are
    /// never reported here.
    Storage { attempts: u32, source: StorageError },
    /// An outline invariant is violated in stored data.
    Fatal(String),
}

impl EngineError {
    fn from_storage(attempts: u32, source: StorageError) -> Self {
        match source {
            StorageError::Corrupt(message) => {
                tracing::error!(%message, "corrupt outline data");
                Self::Fatal(message)
            }
            source => Self::Storage { attempts, source },
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage { attempts, source } => {
                write!(f, "{source} (after {attempts} attempt(s))")
            }
            Self::Fatal(message) => write!(f, "fatal: {message}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage { source, .. } => Some(source),
            Self::Fatal(_) => None,
        }
    }
}

/// Entry point for structural outline edits:
/// version guard, then planner, then transaction coordinator.
pub struct TocEngine<S> {
    store: S,
    config: EngineConfig,
    planner: MutationPlanner,
}

impl<S: OutlineStore> TocEngine<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        let planner = MutationPlanner::new(config.limits);
        Self {
            store,
            config,
            planner,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn outline(&self, book_id: &BookId) -> Result<OutlineState, EngineError> {
        self.store
            .load(book_id)
            .map_err(|source| EngineError::from_storage(1, source))
    }

    pub fn submit(&mut self, request: MutationRequest) -> Result<MutationResult, EngineError> {
        let base = match VersionGuard::pre_check(&self.store, &request.book_id, request.base_version)
            .map_err(|source| EngineError::from_storage(1, source))?
        {
            Ok(state) => state,
            Err(result) => return Ok(result),
        };

        let plan = match self.planner.plan(base.items(), &request.operations) {
            Ok(plan) => plan,
            Err(PlanError::Validation(err)) => {
                tracing::warn!(
                    book_id = %request.book_id,
                    base_version = request.base_version,
                    error = %err,
                    "outline mutation rejected"
                );
                return Ok(MutationResult::Rejected {
                    reason: RejectReason::Validation(err),
                });
            }
            Err(PlanError::Snapshot(err)) => {
                let message = format!("outline {} v{}: {err}", request.book_id, base.version());
                tracing::error!(book_id = %request.book_id, %message, "stored outline is not a valid forest");
                return Err(EngineError::Fatal(message));
            }
        };
        tracing::debug!(
            book_id = %request.book_id,
            upserts = plan.upserts.len(),
            removals = plan.removals.len(),
            "mutation planned"
        );

        TransactionCoordinator::new(&mut self.store, &self.config).commit(&request, plan)
    }

    /// Reverts the transition that produced `base_version` by submitting
    /// its recorded inverse as a new batch. History only moves forward: the
    /// undo is itself a new version with its own audit record.
    pub fn undo_last(
        &mut self,
        book_id: &BookId,
        base_version: u64,
        actor_id: ActorId,
    ) -> Result<MutationResult, EngineError> {
        if let Err(result) = VersionGuard::pre_check(&self.store, book_id, base_version)
            .map_err(|source| EngineError::from_storage(1, source))?
        {
            return Ok(result);
        }
        let nothing_to_undo = Ok(MutationResult::Rejected {
            reason: RejectReason::NothingToUndo,
        });
        if base_version <= 1 {
            return nothing_to_undo;
        }
        let Some(record) = self
            .store
            .audit_record(book_id, base_version)
            .map_err(|source| EngineError::from_storage(1, source))?
        else {
            return nothing_to_undo;
        };
        if record.inverse_operations.is_empty() {
            return nothing_to_undo;
        }

        tracing::debug!(%book_id, reverting = %record.id, "undoing outline transition");
        self.submit(MutationRequest {
            book_id: book_id.clone(),
            base_version,
            operations: record.inverse_operations,
            actor_id,
        })
    }

    pub fn audit_log(
        &self,
        book_id: &BookId,
        since_version: u64,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, EngineError> {
        self.store
            .audit_log(book_id, since_version, limit)
            .map_err(|source| EngineError::from_storage(1, source))
    }

    /// External cascade delete; the outline moves to its terminal state.
    /// Transient failures are retried under the same policy as submits.
    pub fn delete_book(&mut self, book_id: &BookId) -> Result<bool, EngineError> {
        let policy = self.config.retry;
        let mut attempt = 0u32;
        let deleted = loop {
            attempt += 1;
            match self.store.delete_book(book_id, now_ms()) {
                Ok(deleted) => break deleted,
                Err(err) if err.is_transient() && policy.allows_retry_after(attempt) => {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        %book_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient storage failure, retrying outline delete"
                    );
                    std::thread::sleep(delay);
                }
                Err(source) => return Err(EngineError::from_storage(attempt, source)),
            }
        };
        if deleted {
            tracing::info!(%book_id, "outline deleted");
        }
        Ok(deleted)
    }
}

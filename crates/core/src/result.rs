#![forbid(unsafe_code)]

use crate::conflict::ConflictStage;
use crate::model::Outline;
use crate::ops::MutationOperation;
use crate::planner::ValidationError;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MutationResult {
    Applied {
        new_version: u64,
        applied_ops: Vec<MutationOperation>,
        audit_id: String,
    },
    Conflict {
        current_version: u64,
        /// `None` when the book has no outline yet.
        current_outline: Option<Outline>,
        stage: ConflictStage,
    },
    Rejected {
        reason: RejectReason,
    },
}

impl MutationResult {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn new_version(&self) -> Option<u64> {
        match self {
            Self::Applied { new_version, .. } => Some(*new_version),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectReason {
    Validation(ValidationError),
    BookDeleted,
    NothingToUndo,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::BookDeleted => write!(f, "book outline was deleted"),
            Self::NothingToUndo => write!(f, "no undoable transition"),
        }
    }
}

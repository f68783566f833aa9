#![forbid(unsafe_code)]

use crate::ids::ItemId;
use crate::ops::OpKind;
use crate::tree::TreeError;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ValidationReason {
    EmptyBatch,
    TooManyOperations { max: usize },
    UnknownItem { id: ItemId },
    DuplicateItem { id: ItemId },
    CycleDetected { id: ItemId, new_parent_id: ItemId },
    /// Anchor exists but is not a sibling in the destination group.
    InvalidAnchor { anchor: ItemId },
    AnchorIsTarget { id: ItemId },
    PositionOutOfRange { position: u32, max: u32 },
    EmptyTitle,
    TitleTooLong { max: usize },
    DepthExceeded { max: u32 },
    TooManyItems { max: usize },
}

impl std::fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyBatch => write!(f, "batch has no operations"),
            Self::TooManyOperations { max } => write!(f, "batch exceeds {max} operations"),
            Self::UnknownItem { id } => write!(f, "unknown item {id}"),
            Self::DuplicateItem { id } => write!(f, "item {id} already exists"),
            Self::CycleDetected { id, new_parent_id } => write!(
                f,
                "cycle detected: {new_parent_id} is {id} or one of its descendants"
            ),
            Self::InvalidAnchor { anchor } => {
                write!(f, "anchor {anchor} is not a sibling in the destination group")
            }
            Self::AnchorIsTarget { id } => write!(f, "item {id} cannot be placed relative to itself"),
            Self::PositionOutOfRange { position, max } => {
                write!(f, "position {position} out of range 1..={max}")
            }
            Self::EmptyTitle => write!(f, "title must not be empty"),
            Self::TitleTooLong { max } => write!(f, "title exceeds {max} chars"),
            Self::DepthExceeded { max } => write!(f, "outline depth would exceed {max}"),
            Self::TooManyItems { max } => write!(f, "outline would exceed {max} items"),
        }
    }
}

impl ValidationReason {
    /// Maps an arena error raised while applying an operation. Errors that
    /// can only come from a malformed snapshot are handed back unchanged.
    pub(crate) fn from_tree(err: TreeError) -> Result<Self, TreeError> {
        match err {
            TreeError::UnknownItem(id) => Ok(Self::UnknownItem { id }),
            TreeError::DuplicateId(id) => Ok(Self::DuplicateItem { id }),
            TreeError::Cycle(id) => Ok(Self::CycleDetected {
                new_parent_id: id.clone(),
                id,
            }),
            TreeError::IndexOutOfRange { index, len } => Ok(Self::PositionOutOfRange {
                position: index as u32 + 1,
                max: len as u32 + 1,
            }),
            other @ (TreeError::DanglingParent { .. }
            | TreeError::OrderGap { .. }
            | TreeError::LevelMismatch { .. }) => Err(other),
        }
    }
}

/// A rejected batch. `op_index` is the 0-based position of the offending
/// operation; batch-level failures carry no index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub op_index: Option<usize>,
    pub op_kind: Option<OpKind>,
    pub reason: ValidationReason,
}

impl ValidationError {
    pub fn batch(reason: ValidationReason) -> Self {
        Self {
            op_index: None,
            op_kind: None,
            reason,
        }
    }

    pub fn at(op_index: usize, op_kind: OpKind, reason: ValidationReason) -> Self {
        Self {
            op_index: Some(op_index),
            op_kind: Some(op_kind),
            reason,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.op_index, self.op_kind) {
            (Some(index), Some(kind)) => {
                write!(f, "operations[{index}] ({}): {}", kind.as_str(), self.reason)
            }
            (Some(index), None) => write!(f, "operations[{index}]: {}", self.reason),
            _ => write!(f, "batch: {}", self.reason),
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlanError {
    Validation(ValidationError),
    /// The base snapshot itself is not a valid forest.
    Snapshot(TreeError),
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "validation: {err}"),
            Self::Snapshot(err) => write!(f, "corrupt snapshot: {err}"),
        }
    }
}

impl std::error::Error for PlanError {}

impl From<ValidationError> for PlanError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

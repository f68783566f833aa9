#![forbid(unsafe_code)]

use crate::ids::{ActorId, BookId, ItemId};
use crate::model::ItemStatus;
use serde::{Deserialize, Serialize};

/// Where an item lands inside its destination sibling group. Resolved after
/// the moving item has been detached from its current group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    First,
    #[default]
    Last,
    /// 1-based final position among the siblings.
    Index(u32),
    Before(ItemId),
    After(ItemId),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub id: ItemId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default)]
    pub word_count: u32,
    #[serde(default)]
    pub estimated_reading_time: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_ref: Option<String>,
}

impl ItemDraft {
    pub fn new(id: ItemId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: None,
            status: ItemStatus::Draft,
            word_count: 0,
            estimated_reading_time: 0,
            content_ref: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MutationOperation {
    Insert {
        item: ItemDraft,
        #[serde(default)]
        parent_id: Option<ItemId>,
        #[serde(default)]
        placement: Placement,
    },
    /// Removes the item and every descendant.
    Delete { id: ItemId },
    Rename { id: ItemId, title: String },
    /// Repositions the item inside its current sibling group.
    Reorder {
        id: ItemId,
        placement: Placement,
    },
    Move {
        id: ItemId,
        #[serde(default)]
        new_parent_id: Option<ItemId>,
        #[serde(default)]
        placement: Placement,
    },
}

impl MutationOperation {
    pub fn kind(&self) -> OpKind {
        match self {
            Self::Insert { .. } => OpKind::Insert,
            Self::Delete { .. } => OpKind::Delete,
            Self::Rename { .. } => OpKind::Rename,
            Self::Reorder { .. } => OpKind::Reorder,
            Self::Move { .. } => OpKind::Move,
        }
    }

    pub fn target(&self) -> &ItemId {
        match self {
            Self::Insert { item, .. } => &item.id,
            Self::Delete { id }
            | Self::Rename { id, .. }
            | Self::Reorder { id, .. }
            | Self::Move { id, .. } => id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Insert,
    Delete,
    Rename,
    Reorder,
    Move,
}

impl OpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Delete => "delete",
            Self::Rename => "rename",
            Self::Reorder => "reorder",
            Self::Move => "move",
        }
    }
}

/// A batch of structural edits saved together by one editing session.
/// `base_version` is the version that session last read; 0 means the
/// session believes the book has no outline yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRequest {
    pub book_id: BookId,
    #[serde(default)]
    pub base_version: u64,
    pub operations: Vec<MutationOperation>,
    pub actor_id: ActorId,
}

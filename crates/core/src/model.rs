#![forbid(unsafe_code)]

use crate::ids::{ActorId, BookId, ItemId};
use crate::ops::ItemDraft;
use crate::tree::{OutlineTree, TreeError};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Draft,
    InProgress,
    Completed,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// One chapter or subchapter. `level` and `order` are derived from the
/// item's place in the forest and are rewritten on every mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineItem {
    pub id: ItemId,
    pub parent_id: Option<ItemId>,
    pub title: String,
    pub description: Option<String>,
    pub level: u32,
    pub order: u32,
    pub status: ItemStatus,
    pub word_count: u32,
    pub estimated_reading_time: u32,
    pub content_ref: Option<String>,
}

impl OutlineItem {
    pub fn from_draft(draft: ItemDraft) -> Self {
        Self {
            id: draft.id,
            parent_id: None,
            title: draft.title,
            description: draft.description,
            level: 0,
            order: 0,
            status: draft.status,
            word_count: draft.word_count,
            estimated_reading_time: draft.estimated_reading_time,
            content_ref: draft.content_ref,
        }
    }

    pub fn to_draft(&self) -> ItemDraft {
        ItemDraft {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            status: self.status,
            word_count: self.word_count,
            estimated_reading_time: self.estimated_reading_time,
            content_ref: self.content_ref.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineHeader {
    pub book_id: BookId,
    pub version: u64,
    pub updated_at_ms: i64,
    pub updated_by: ActorId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    pub book_id: BookId,
    pub version: u64,
    /// Pre-order flattening of the forest.
    pub items: Vec<OutlineItem>,
    pub updated_at_ms: i64,
    pub updated_by: ActorId,
}

impl Outline {
    /// Builds an outline from stored rows in any order. Rows that do not form
    /// a valid forest (dangling parent, cycle, order gap, wrong level) fail.
    pub fn assemble(header: OutlineHeader, items: Vec<OutlineItem>) -> Result<Self, TreeError> {
        let tree = OutlineTree::from_items(&items)?;
        Ok(Self {
            book_id: header.book_id,
            version: header.version,
            items: tree.flatten(),
            updated_at_ms: header.updated_at_ms,
            updated_by: header.updated_by,
        })
    }

    pub fn item(&self, id: &ItemId) -> Option<&OutlineItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn children(&self, parent_id: Option<&ItemId>) -> Vec<&OutlineItem> {
        let mut out = self
            .items
            .iter()
            .filter(|item| item.parent_id.as_ref() == parent_id)
            .collect::<Vec<_>>();
        out.sort_by_key(|item| item.order);
        out
    }

    /// Structural and field equality, ignoring version and attribution.
    pub fn content_eq(&self, other: &Outline) -> bool {
        self.book_id == other.book_id && self.items == other.items
    }
}

/// Lifecycle of a book's outline as seen by the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OutlineState {
    Uninitialized,
    Active(Outline),
    Deleted { version: u64 },
}

impl OutlineState {
    /// Stored version; an uninitialized book is at version 0.
    pub fn version(&self) -> u64 {
        match self {
            Self::Uninitialized => 0,
            Self::Active(outline) => outline.version,
            Self::Deleted { version } => *version,
        }
    }

    pub fn outline(&self) -> Option<&Outline> {
        match self {
            Self::Active(outline) => Some(outline),
            _ => None,
        }
    }

    pub fn into_outline(self) -> Option<Outline> {
        match self {
            Self::Active(outline) => Some(outline),
            _ => None,
        }
    }

    pub fn items(&self) -> &[OutlineItem] {
        self.outline()
            .map(|outline| outline.items.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted { .. })
    }
}

#![forbid(unsafe_code)]

//! Validates a mutation batch against a base snapshot and turns it into a
//! fully resolved plan: the post-state, the normalized operations, their
//! inverse, and the item documents that must be written or removed.

mod error;

pub use error::*;

use crate::ids::ItemId;
use crate::model::OutlineItem;
use crate::ops::{MutationOperation, Placement};
use crate::tree::{OutlineTree, TreeError};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlannerLimits {
    pub max_operations: usize,
    pub max_items: usize,
    pub max_depth: u32,
    pub max_title_chars: usize,
}

impl Default for PlannerLimits {
    fn default() -> Self {
        Self {
            max_operations: 500,
            max_items: 5000,
            max_depth: 16,
            max_title_chars: 500,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationPlan {
    /// Complete post-state in pre-order.
    pub items: Vec<OutlineItem>,
    /// Operations as applied: titles trimmed, every placement an index.
    pub applied_ops: Vec<MutationOperation>,
    /// Applying these to the post-state restores the base content.
    pub inverse_ops: Vec<MutationOperation>,
    /// New items and items with any changed field, order/level included.
    pub upserts: Vec<OutlineItem>,
    pub removals: Vec<ItemId>,
}

struct Step {
    applied: MutationOperation,
    inverse: Vec<MutationOperation>,
}

#[derive(Clone, Debug, Default)]
pub struct MutationPlanner {
    limits: PlannerLimits,
}

impl MutationPlanner {
    pub fn new(limits: PlannerLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &PlannerLimits {
        &self.limits
    }

    /// Operations apply in order to a working copy of `base`, so an
    /// operation may reference items inserted earlier in the same batch.
    pub fn plan(
        &self,
        base: &[OutlineItem],
        operations: &[MutationOperation],
    ) -> Result<MutationPlan, PlanError> {
        if operations.is_empty() {
            return Err(ValidationError::batch(ValidationReason::EmptyBatch).into());
        }
        if operations.len() > self.limits.max_operations {
            return Err(ValidationError::batch(ValidationReason::TooManyOperations {
                max: self.limits.max_operations,
            })
            .into());
        }

        let mut tree = OutlineTree::from_items(base).map_err(PlanError::Snapshot)?;
        let mut applied_ops = Vec::with_capacity(operations.len());
        let mut inverses = Vec::with_capacity(operations.len());

        for (index, op) in operations.iter().enumerate() {
            let step = match self.apply(&mut tree, op) {
                Ok(step) => step,
                Err(Failure::Invalid(reason)) => {
                    return Err(ValidationError::at(index, op.kind(), reason).into());
                }
                Err(Failure::Tree(err)) => match ValidationReason::from_tree(err) {
                    Ok(reason) => return Err(ValidationError::at(index, op.kind(), reason).into()),
                    Err(err) => return Err(PlanError::Snapshot(err)),
                },
            };
            tracing::trace!(op_index = index, op = op.kind().as_str(), "operation planned");
            applied_ops.push(step.applied);
            inverses.push(step.inverse);
        }

        let items = tree.flatten();
        let (upserts, removals) = diff(base, &items);
        let inverse_ops = inverses.into_iter().rev().flatten().collect();

        Ok(MutationPlan {
            items,
            applied_ops,
            inverse_ops,
            upserts,
            removals,
        })
    }

    fn apply(&self, tree: &mut OutlineTree, op: &MutationOperation) -> Result<Step, Failure> {
        match op {
            MutationOperation::Insert {
                item,
                parent_id,
                placement,
            } => {
                if tree.contains(&item.id) {
                    return Err(Failure::Invalid(ValidationReason::DuplicateItem {
                        id: item.id.clone(),
                    }));
                }
                let parent_depth = match parent_id {
                    Some(parent_id) => {
                        require(tree, parent_id)?;
                        tree.depth(parent_id)?
                    }
                    None => 0,
                };
                if parent_depth + 1 > self.limits.max_depth {
                    return Err(Failure::Invalid(ValidationReason::DepthExceeded {
                        max: self.limits.max_depth,
                    }));
                }
                if tree.len() + 1 > self.limits.max_items {
                    return Err(Failure::Invalid(ValidationReason::TooManyItems {
                        max: self.limits.max_items,
                    }));
                }

                let mut draft = item.clone();
                draft.title = self.clean_title(&draft.title)?;
                let index = resolve_placement(tree, parent_id.as_ref(), placement, None)?;
                tree.insert(OutlineItem::from_draft(draft.clone()), parent_id.as_ref(), index)?;

                Ok(Step {
                    applied: MutationOperation::Insert {
                        item: draft,
                        parent_id: parent_id.clone(),
                        placement: index_placement(index),
                    },
                    inverse: vec![MutationOperation::Delete {
                        id: item.id.clone(),
                    }],
                })
            }
            MutationOperation::Delete { id } => {
                require(tree, id)?;
                let removed = tree.remove_subtree(id)?;
                let inverse = removed
                    .into_iter()
                    .map(|removed| MutationOperation::Insert {
                        item: removed.item.to_draft(),
                        parent_id: removed.parent_id,
                        placement: index_placement(removed.position),
                    })
                    .collect();
                Ok(Step {
                    applied: MutationOperation::Delete { id: id.clone() },
                    inverse,
                })
            }
            MutationOperation::Rename { id, title } => {
                require(tree, id)?;
                let title = self.clean_title(title)?;
                let previous = std::mem::replace(&mut tree.item_mut(id)?.title, title.clone());
                Ok(Step {
                    applied: MutationOperation::Rename {
                        id: id.clone(),
                        title,
                    },
                    inverse: vec![MutationOperation::Rename {
                        id: id.clone(),
                        title: previous,
                    }],
                })
            }
            MutationOperation::Reorder { id, placement } => {
                require(tree, id)?;
                let parent_id = tree.parent(id)?.cloned();
                let index = resolve_placement(tree, parent_id.as_ref(), placement, Some(id))?;
                let (_, old_position) = tree.relocate(id, parent_id.as_ref(), index)?;
                Ok(Step {
                    applied: MutationOperation::Reorder {
                        id: id.clone(),
                        placement: index_placement(index),
                    },
                    inverse: vec![MutationOperation::Reorder {
                        id: id.clone(),
                        placement: index_placement(old_position),
                    }],
                })
            }
            MutationOperation::Move {
                id,
                new_parent_id,
                placement,
            } => {
                require(tree, id)?;
                let parent_depth = match new_parent_id {
                    Some(new_parent_id) => {
                        require(tree, new_parent_id)?;
                        if tree.is_self_or_ancestor(id, new_parent_id)? {
                            return Err(Failure::Invalid(ValidationReason::CycleDetected {
                                id: id.clone(),
                                new_parent_id: new_parent_id.clone(),
                            }));
                        }
                        tree.depth(new_parent_id)?
                    }
                    None => 0,
                };
                if parent_depth + tree.subtree_height(id)? > self.limits.max_depth {
                    return Err(Failure::Invalid(ValidationReason::DepthExceeded {
                        max: self.limits.max_depth,
                    }));
                }

                let index = resolve_placement(tree, new_parent_id.as_ref(), placement, Some(id))?;
                let (old_parent, old_position) = tree.relocate(id, new_parent_id.as_ref(), index)?;
                Ok(Step {
                    applied: MutationOperation::Move {
                        id: id.clone(),
                        new_parent_id: new_parent_id.clone(),
                        placement: index_placement(index),
                    },
                    inverse: vec![MutationOperation::Move {
                        id: id.clone(),
                        new_parent_id: old_parent,
                        placement: index_placement(old_position),
                    }],
                })
            }
        }
    }

    fn clean_title(&self, raw: &str) -> Result<String, Failure> {
        let title = raw.trim();
        if title.is_empty() {
            return Err(Failure::Invalid(ValidationReason::EmptyTitle));
        }
        if title.chars().count() > self.limits.max_title_chars {
            return Err(Failure::Invalid(ValidationReason::TitleTooLong {
                max: self.limits.max_title_chars,
            }));
        }
        Ok(title.to_string())
    }
}

enum Failure {
    Invalid(ValidationReason),
    Tree(TreeError),
}

impl From<TreeError> for Failure {
    fn from(value: TreeError) -> Self {
        Self::Tree(value)
    }
}

impl From<ValidationReason> for Failure {
    fn from(value: ValidationReason) -> Self {
        Self::Invalid(value)
    }
}

fn require(tree: &OutlineTree, id: &ItemId) -> Result<(), Failure> {
    if tree.contains(id) {
        Ok(())
    } else {
        Err(Failure::Invalid(ValidationReason::UnknownItem { id: id.clone() }))
    }
}

fn index_placement(index: usize) -> Placement {
    Placement::Index(index as u32 + 1)
}

/// Resolves a placement to a 0-based index in the group under `parent_id`,
/// as that group looks once `moving` (if any) has been taken out of it.
fn resolve_placement(
    tree: &OutlineTree,
    parent_id: Option<&ItemId>,
    placement: &Placement,
    moving: Option<&ItemId>,
) -> Result<usize, Failure> {
    let group = tree
        .group(parent_id)?
        .iter()
        .filter(|sibling| Some(*sibling) != moving)
        .collect::<Vec<_>>();

    let anchor_index = |anchor: &ItemId| -> Result<usize, Failure> {
        if Some(anchor) == moving {
            return Err(ValidationReason::AnchorIsTarget { id: anchor.clone() }.into());
        }
        if !tree.contains(anchor) {
            return Err(ValidationReason::UnknownItem { id: anchor.clone() }.into());
        }
        group
            .iter()
            .position(|sibling| *sibling == anchor)
            .ok_or_else(|| {
                ValidationReason::InvalidAnchor {
                    anchor: anchor.clone(),
                }
                .into()
            })
    };

    match placement {
        Placement::First => Ok(0),
        Placement::Last => Ok(group.len()),
        Placement::Index(position) => {
            let max = group.len() as u32 + 1;
            if *position == 0 || *position > max {
                return Err(ValidationReason::PositionOutOfRange {
                    position: *position,
                    max,
                }
                .into());
            }
            Ok(*position as usize - 1)
        }
        Placement::Before(anchor) => anchor_index(anchor),
        Placement::After(anchor) => Ok(anchor_index(anchor)? + 1),
    }
}

fn diff(base: &[OutlineItem], items: &[OutlineItem]) -> (Vec<OutlineItem>, Vec<ItemId>) {
    let before = base
        .iter()
        .map(|item| (&item.id, item))
        .collect::<HashMap<_, _>>();
    let after = items.iter().map(|item| &item.id).collect::<HashSet<_>>();

    let upserts = items
        .iter()
        .filter(|item| before.get(&item.id).copied() != Some(*item))
        .cloned()
        .collect();
    let removals = base
        .iter()
        .filter(|item| !after.contains(&item.id))
        .map(|item| item.id.clone())
        .collect();
    (upserts, removals)
}

#[cfg(test)]
mod tests;

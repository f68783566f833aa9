#![forbid(unsafe_code)]

//! Id-indexed arena over the outline forest.
//!
//! Sibling order is the position inside the parent's `children` list (or
//! `roots`); `order`, `level` and `parent_id` on the items are only written
//! back by [`OutlineTree::flatten`]. Every traversal uses an explicit stack.

use crate::ids::ItemId;
use crate::model::OutlineItem;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeError {
    UnknownItem(ItemId),
    DuplicateId(ItemId),
    DanglingParent { id: ItemId, parent_id: ItemId },
    Cycle(ItemId),
    OrderGap { parent_id: Option<ItemId> },
    LevelMismatch { id: ItemId, expected: u32, actual: u32 },
    IndexOutOfRange { index: usize, len: usize },
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownItem(id) => write!(f, "unknown item {id}"),
            Self::DuplicateId(id) => write!(f, "duplicate item id {id}"),
            Self::DanglingParent { id, parent_id } => {
                write!(f, "item {id} references missing parent {parent_id}")
            }
            Self::Cycle(id) => write!(f, "item {id} is its own ancestor"),
            Self::OrderGap { parent_id } => match parent_id {
                Some(parent_id) => write!(f, "children of {parent_id} are not ordered 1..n"),
                None => write!(f, "root items are not ordered 1..n"),
            },
            Self::LevelMismatch {
                id,
                expected,
                actual,
            } => write!(f, "item {id} has level {actual}, expected {expected}"),
            Self::IndexOutOfRange { index, len } => {
                write!(f, "sibling index {index} out of range (len={len})")
            }
        }
    }
}

impl std::error::Error for TreeError {}

#[derive(Clone, Debug)]
struct Node {
    item: OutlineItem,
    parent: Option<ItemId>,
    children: Vec<ItemId>,
}

/// An item removed by [`OutlineTree::remove_subtree`], with the place it
/// occupied at removal time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemovedItem {
    pub item: OutlineItem,
    pub parent_id: Option<ItemId>,
    /// 0-based index in the sibling group.
    pub position: usize,
}

#[derive(Clone, Debug, Default)]
pub struct OutlineTree {
    nodes: HashMap<ItemId, Node>,
    roots: Vec<ItemId>,
}

impl OutlineTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: &[OutlineItem]) -> Result<Self, TreeError> {
        let mut nodes = HashMap::with_capacity(items.len());
        for item in items {
            let node = Node {
                item: item.clone(),
                parent: item.parent_id.clone(),
                children: Vec::new(),
            };
            if nodes.insert(item.id.clone(), node).is_some() {
                return Err(TreeError::DuplicateId(item.id.clone()));
            }
        }

        let mut groups: HashMap<Option<ItemId>, Vec<(u32, ItemId)>> = HashMap::new();
        for item in items {
            if let Some(parent_id) = item.parent_id.as_ref()
                && !nodes.contains_key(parent_id)
            {
                return Err(TreeError::DanglingParent {
                    id: item.id.clone(),
                    parent_id: parent_id.clone(),
                });
            }
            groups
                .entry(item.parent_id.clone())
                .or_default()
                .push((item.order, item.id.clone()));
        }

        let mut tree = Self {
            nodes,
            roots: Vec::new(),
        };
        for (parent_id, mut members) in groups {
            members.sort();
            let contiguous = members
                .iter()
                .enumerate()
                .all(|(index, (order, _))| *order as usize == index + 1);
            if !contiguous {
                return Err(TreeError::OrderGap { parent_id });
            }
            let children = members.into_iter().map(|(_, id)| id).collect::<Vec<_>>();
            match parent_id {
                None => tree.roots = children,
                Some(parent_id) => tree.node_mut(&parent_id)?.children = children,
            }
        }

        // Items on a parent cycle are never reachable from a root.
        let mut seen = HashSet::with_capacity(tree.nodes.len());
        let mut stack = tree
            .roots
            .iter()
            .rev()
            .map(|id| (id.clone(), 1u32))
            .collect::<Vec<_>>();
        while let Some((id, level)) = stack.pop() {
            let node = tree.node(&id)?;
            if node.item.level != level {
                return Err(TreeError::LevelMismatch {
                    id,
                    expected: level,
                    actual: node.item.level,
                });
            }
            stack.extend(node.children.iter().rev().map(|child| (child.clone(), level + 1)));
            seen.insert(id);
        }
        if seen.len() != tree.nodes.len() {
            let mut unreachable = items
                .iter()
                .map(|item| &item.id)
                .filter(|id| !seen.contains(*id));
            if let Some(id) = unreachable.next() {
                return Err(TreeError::Cycle(id.clone()));
            }
        }

        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &ItemId) -> Option<&OutlineItem> {
        self.nodes.get(id).map(|node| &node.item)
    }

    pub fn item_mut(&mut self, id: &ItemId) -> Result<&mut OutlineItem, TreeError> {
        Ok(&mut self.node_mut(id)?.item)
    }

    pub fn parent(&self, id: &ItemId) -> Result<Option<&ItemId>, TreeError> {
        Ok(self.node(id)?.parent.as_ref())
    }

    /// Ids of the sibling group under `parent_id` (roots when `None`).
    pub fn group(&self, parent_id: Option<&ItemId>) -> Result<&[ItemId], TreeError> {
        match parent_id {
            None => Ok(&self.roots),
            Some(parent_id) => Ok(&self.node(parent_id)?.children),
        }
    }

    /// 0-based index of `id` inside its sibling group.
    pub fn position(&self, id: &ItemId) -> Result<usize, TreeError> {
        let parent_id = self.parent(id)?;
        self.group(parent_id)?
            .iter()
            .position(|sibling| sibling == id)
            .ok_or_else(|| TreeError::UnknownItem(id.clone()))
    }

    /// Depth of `id`; roots are at depth 1.
    pub fn depth(&self, id: &ItemId) -> Result<u32, TreeError> {
        let mut depth = 1u32;
        let mut cursor = self.parent(id)?;
        while let Some(parent_id) = cursor {
            depth += 1;
            if depth as usize > self.nodes.len() {
                return Err(TreeError::Cycle(id.clone()));
            }
            cursor = self.parent(parent_id)?;
        }
        Ok(depth)
    }

    /// Walks the ancestor chain of `id` up to the root and reports whether
    /// `ancestor` is on it (or is `id` itself).
    pub fn is_self_or_ancestor(&self, ancestor: &ItemId, id: &ItemId) -> Result<bool, TreeError> {
        let mut cursor = Some(id);
        let mut steps = 0usize;
        while let Some(current) = cursor {
            if current == ancestor {
                return Ok(true);
            }
            steps += 1;
            if steps > self.nodes.len() {
                return Err(TreeError::Cycle(id.clone()));
            }
            cursor = self.parent(current)?;
        }
        Ok(false)
    }

    /// Number of levels in the subtree rooted at `id` (a leaf has height 1).
    pub fn subtree_height(&self, id: &ItemId) -> Result<u32, TreeError> {
        let mut height = 0u32;
        let mut stack = vec![(id.clone(), 1u32)];
        while let Some((current, level)) = stack.pop() {
            height = height.max(level);
            stack.extend(
                self.node(&current)?
                    .children
                    .iter()
                    .map(|child| (child.clone(), level + 1)),
            );
        }
        Ok(height)
    }

    /// Inserts a detached item at `index` (0-based) of the group under
    /// `parent_id`.
    pub fn insert(
        &mut self,
        item: OutlineItem,
        parent_id: Option<&ItemId>,
        index: usize,
    ) -> Result<(), TreeError> {
        if self.contains(&item.id) {
            return Err(TreeError::DuplicateId(item.id));
        }
        let id = item.id.clone();
        self.attach_checked(&id, parent_id, index)?;
        self.nodes.insert(
            id,
            Node {
                item,
                parent: parent_id.cloned(),
                children: Vec::new(),
            },
        );
        Ok(())
    }

    /// Moves `id` (with its subtree) to `index` of the group under
    /// `new_parent_id`. The index is interpreted after `id` has left its
    /// current group. Returns the previous parent and 0-based position.
    pub fn relocate(
        &mut self,
        id: &ItemId,
        new_parent_id: Option<&ItemId>,
        index: usize,
    ) -> Result<(Option<ItemId>, usize), TreeError> {
        if let Some(new_parent_id) = new_parent_id
            && self.is_self_or_ancestor(id, new_parent_id)?
        {
            return Err(TreeError::Cycle(id.clone()));
        }
        let old_parent = self.parent(id)?.cloned();
        let old_position = self.position(id)?;

        let dest_len = self.group(new_parent_id)?.len();
        let dest_len = if new_parent_id == old_parent.as_ref() {
            dest_len - 1
        } else {
            dest_len
        };
        if index > dest_len {
            return Err(TreeError::IndexOutOfRange {
                index,
                len: dest_len,
            });
        }

        self.group_mut(old_parent.as_ref())?.remove(old_position);
        self.group_mut(new_parent_id)?.insert(index, id.clone());
        self.node_mut(id)?.parent = new_parent_id.cloned();
        Ok((old_parent, old_position))
    }

    /// Detaches `id` and removes it together with all descendants. The
    /// removed items come back in pre-order, each with its parent and
    /// position at the time of removal.
    pub fn remove_subtree(&mut self, id: &ItemId) -> Result<Vec<RemovedItem>, TreeError> {
        let parent_id = self.parent(id)?.cloned();
        let position = self.position(id)?;
        self.group_mut(parent_id.as_ref())?.remove(position);

        let mut removed = Vec::new();
        let mut stack = vec![(id.clone(), parent_id, position)];
        while let Some((current, parent_id, position)) = stack.pop() {
            let node = self
                .nodes
                .remove(&current)
                .ok_or_else(|| TreeError::UnknownItem(current.clone()))?;
            stack.extend(
                node.children
                    .iter()
                    .enumerate()
                    .rev()
                    .map(|(index, child)| (child.clone(), Some(current.clone()), index)),
            );
            removed.push(RemovedItem {
                item: node.item,
                parent_id,
                position,
            });
        }
        Ok(removed)
    }

    /// Pre-order items with `parent_id`, `level` and `order` recomputed from
    /// the arena.
    pub fn flatten(&self) -> Vec<OutlineItem> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = self
            .roots
            .iter()
            .enumerate()
            .rev()
            .map(|(index, id)| (id, None::<&ItemId>, 1u32, index))
            .collect::<Vec<_>>();
        while let Some((id, parent_id, level, index)) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            let mut item = node.item.clone();
            item.parent_id = parent_id.cloned();
            item.level = level;
            item.order = index as u32 + 1;
            out.push(item);
            stack.extend(
                node.children
                    .iter()
                    .enumerate()
                    .rev()
                    .map(|(index, child)| (child, Some(id), level + 1, index)),
            );
        }
        out
    }

    fn attach_checked(
        &mut self,
        id: &ItemId,
        parent_id: Option<&ItemId>,
        index: usize,
    ) -> Result<(), TreeError> {
        let group = self.group_mut(parent_id)?;
        if index > group.len() {
            return Err(TreeError::IndexOutOfRange {
                index,
                len: group.len(),
            });
        }
        group.insert(index, id.clone());
        Ok(())
    }

    fn node(&self, id: &ItemId) -> Result<&Node, TreeError> {
        self.nodes
            .get(id)
            .ok_or_else(|| TreeError::UnknownItem(id.clone()))
    }

    fn node_mut(&mut self, id: &ItemId) -> Result<&mut Node, TreeError> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| TreeError::UnknownItem(id.clone()))
    }

    fn group_mut(&mut self, parent_id: Option<&ItemId>) -> Result<&mut Vec<ItemId>, TreeError> {
        match parent_id {
            None => Ok(&mut self.roots),
            Some(parent_id) => Ok(&mut self.node_mut(parent_id)?.children),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemStatus;

    fn id(value: &str) -> ItemId {
        ItemId::try_new(value).unwrap()
    }

    fn item(value: &str, parent: Option<&str>, level: u32, order: u32) -> OutlineItem {
        OutlineItem {
            id: id(value),
            parent_id: parent.map(id),
            title: value.to_uppercase(),
            description: None,
            level,
            order,
            status: ItemStatus::Draft,
            word_count: 0,
            estimated_reading_time: 0,
            content_ref: None,
        }
    }

    fn sample() -> Vec<OutlineItem> {
        vec![
            item("b", None, 1, 2),
            item("a", None, 1, 1),
            item("a1", Some("a"), 2, 1),
            item("a2", Some("a"), 2, 2),
            item("a2x", Some("a2"), 3, 1),
        ]
    }

    #[test]
    fn flatten_is_preorder_by_sibling_order() {
        let tree = OutlineTree::from_items(&sample()).unwrap();
        let ids = tree
            .flatten()
            .into_iter()
            .map(|item| item.id.as_str().to_string())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "a1", "a2", "a2x", "b"]);
    }

    #[test]
    fn from_items_rejects_corrupt_rows() {
        let mut rows = sample();
        rows.push(item("a", None, 1, 3));
        assert_eq!(
            OutlineTree::from_items(&rows).unwrap_err(),
            TreeError::DuplicateId(id("a"))
        );

        let rows = vec![item("x", Some("ghost"), 2, 1)];
        assert!(matches!(
            OutlineTree::from_items(&rows).unwrap_err(),
            TreeError::DanglingParent { .. }
        ));

        let rows = vec![item("a", None, 1, 1), item("b", None, 1, 3)];
        assert_eq!(
            OutlineTree::from_items(&rows).unwrap_err(),
            TreeError::OrderGap { parent_id: None }
        );

        let rows = vec![
            item("r", None, 1, 1),
            item("p", Some("q"), 2, 1),
            item("q", Some("p"), 2, 1),
        ];
        assert!(matches!(
            OutlineTree::from_items(&rows).unwrap_err(),
            TreeError::Cycle(_)
        ));

        let rows = vec![item("a", None, 1, 1), item("a1", Some("a"), 3, 1)];
        assert!(matches!(
            OutlineTree::from_items(&rows).unwrap_err(),
            TreeError::LevelMismatch { .. }
        ));
    }

    #[test]
    fn ancestor_walk_and_heights() {
        let tree = OutlineTree::from_items(&sample()).unwrap();
        assert!(tree.is_self_or_ancestor(&id("a"), &id("a2x")).unwrap());
        assert!(tree.is_self_or_ancestor(&id("a2"), &id("a2")).unwrap());
        assert!(!tree.is_self_or_ancestor(&id("b"), &id("a2x")).unwrap());
        assert_eq!(tree.depth(&id("a2x")).unwrap(), 3);
        assert_eq!(tree.subtree_height(&id("a")).unwrap(), 3);
        assert_eq!(tree.subtree_height(&id("b")).unwrap(), 1);
    }

    #[test]
    fn relocate_refuses_descendant_parent() {
        let mut tree = OutlineTree::from_items(&sample()).unwrap();
        assert_eq!(
            tree.relocate(&id("a"), Some(&id("a2x")), 0).unwrap_err(),
            TreeError::Cycle(id("a"))
        );
        let (old_parent, old_position) = tree.relocate(&id("a2"), None, 0).unwrap();
        assert_eq!(old_parent, Some(id("a")));
        assert_eq!(old_position, 1);
        let flat = tree.flatten();
        let moved = flat.iter().find(|item| item.id == id("a2")).unwrap();
        assert_eq!((moved.level, moved.order, moved.parent_id.clone()), (1, 1, None));
        let child = flat.iter().find(|item| item.id == id("a2x")).unwrap();
        assert_eq!(child.level, 2);
    }

    #[test]
    fn remove_subtree_reports_positions_in_preorder() {
        let mut tree = OutlineTree::from_items(&sample()).unwrap();
        let removed = tree.remove_subtree(&id("a")).unwrap();
        let summary = removed
            .iter()
            .map(|r| (r.item.id.as_str().to_string(), r.position))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                ("a".to_string(), 0),
                ("a1".to_string(), 0),
                ("a2".to_string(), 1),
                ("a2x".to_string(), 0)
            ]
        );
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.flatten()[0].order, 1);
    }
}

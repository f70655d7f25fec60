use std::collections::HashMap;
use std::fmt;

use generational_arena::{Arena, Index};
use termtree::Tree;
use tracing::instrument;

use crate::domain::{compare_records, DomainError, EntityId, EntityKind, EntityRecord};

/// Weak handle on a live tree node; becomes stale once the node is removed.
pub type NodeId = Index;

/// `(kind, name)` pair under which a node can be re-found after a rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub kind: EntityKind,
    pub name: String,
}

impl NodeKey {
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn of(kind: EntityKind, key: EntityId) -> Self {
        Self::new(kind, key.to_string())
    }
}

impl From<&EntityRecord> for NodeKey {
    fn from(record: &EntityRecord) -> Self {
        Self::new(record.kind, record.node_name())
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// Node of the live tree.
#[derive(Debug)]
pub struct TreeNode {
    /// Last loaded snapshot of the referenced entity
    pub entity: EntityRecord,
    name: String,
    children_loaded: bool,
    expanded: bool,
    parent: Option<Index>,
    children: Vec<Index>,
}

impl TreeNode {
    fn new(entity: EntityRecord, parent: Option<Index>) -> Self {
        Self {
            name: entity.node_name(),
            entity,
            children_loaded: false,
            expanded: false,
            parent,
            children: Vec::new(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.entity.kind
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> NodeKey {
        NodeKey::new(self.entity.kind, self.name.clone())
    }

    pub fn parent(&self) -> Option<Index> {
        self.parent
    }

    pub fn children(&self) -> &[Index] {
        &self.children
    }

    pub fn children_loaded(&self) -> bool {
        self.children_loaded
    }

    pub fn mark_loaded(&mut self) {
        self.children_loaded = true;
    }

    pub fn invalidate(&mut self) {
        self.children_loaded = false;
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn set_expanded(&mut self, expanded: bool) {
        self.expanded = expanded;
    }
}

/// Arena-based forest holding the live tree.
///
/// Every node is registered under its [`NodeKey`] so all instances of an entity
/// can be found without walking the tree. The index is maintained on every
/// insertion and removal.
#[derive(Debug, Default)]
pub struct TreeArena {
    arena: Arena<TreeNode>,
    roots: Vec<Index>,
    by_key: HashMap<NodeKey, Vec<Index>>,
}

impl TreeArena {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(level = "trace", skip(self, entity), fields(entity = %entity.entity_ref()))]
    pub fn insert_root(&mut self, entity: EntityRecord) -> Index {
        let idx = self.insert(entity, None);
        self.roots.push(idx);
        idx
    }

    #[instrument(level = "trace", skip(self, entity), fields(entity = %entity.entity_ref()))]
    pub fn insert_child(&mut self, parent: Index, entity: EntityRecord) -> Result<Index, DomainError> {
        if !self.arena.contains(parent) {
            return Err(DomainError::NodeNotFound(parent));
        }
        let idx = self.insert(entity, Some(parent));
        if let Some(parent_node) = self.arena.get_mut(parent) {
            parent_node.children.push(idx);
        }
        Ok(idx)
    }

    fn insert(&mut self, entity: EntityRecord, parent: Option<Index>) -> Index {
        let node = TreeNode::new(entity, parent);
        let key = node.key();
        let idx = self.arena.insert(node);
        self.by_key.entry(key).or_default().push(idx);
        idx
    }

    pub fn get(&self, idx: Index) -> Option<&TreeNode> {
        self.arena.get(idx)
    }

    pub fn get_mut(&mut self, idx: Index) -> Option<&mut TreeNode> {
        self.arena.get_mut(idx)
    }

    pub fn node(&self, idx: Index) -> Result<&TreeNode, DomainError> {
        self.arena.get(idx).ok_or(DomainError::NodeNotFound(idx))
    }

    pub fn node_mut(&mut self, idx: Index) -> Result<&mut TreeNode, DomainError> {
        self.arena.get_mut(idx).ok_or(DomainError::NodeNotFound(idx))
    }

    pub fn contains(&self, idx: Index) -> bool {
        self.arena.contains(idx)
    }

    pub fn roots(&self) -> &[Index] {
        &self.roots
    }

    pub fn children(&self, idx: Index) -> &[Index] {
        self.arena
            .get(idx)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    /// Distance from the root, 0 for roots.
    pub fn level(&self, idx: Index) -> Option<usize> {
        let mut node = self.arena.get(idx)?;
        let mut level = 0;
        while let Some(parent) = node.parent {
            node = self.arena.get(parent)?;
            level += 1;
        }
        Some(level)
    }

    /// All live nodes registered under `key`.
    pub fn find(&self, key: &NodeKey) -> &[Index] {
        self.by_key.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct child of `parent` registered under `key`.
    pub fn find_child(&self, parent: Index, key: &NodeKey) -> Option<Index> {
        self.children(parent).iter().copied().find(|&child| {
            self.arena
                .get(child)
                .is_some_and(|node| node.kind() == key.kind && node.name == key.name)
        })
    }

    /// Replaces the entity snapshot, keeping name and children.
    pub fn replace_entity(&mut self, idx: Index, entity: EntityRecord) -> Result<(), DomainError> {
        let node = self.node_mut(idx)?;
        node.entity = entity;
        Ok(())
    }

    /// Detaches and drops `idx` with its whole subtree.
    #[instrument(level = "trace", skip(self))]
    pub fn remove(&mut self, idx: Index) -> Option<TreeNode> {
        let parent = self.arena.get(idx)?.parent;
        match parent {
            Some(parent) => {
                if let Some(parent_node) = self.arena.get_mut(parent) {
                    parent_node.children.retain(|&c| c != idx);
                }
            }
            None => self.roots.retain(|&r| r != idx),
        }
        let children = self.arena.get(idx)?.children.clone();
        for child in children {
            self.drop_subtree(child);
        }
        self.unregister(idx)
    }

    /// Drops all children of `idx` and resets its loaded flag.
    #[instrument(level = "trace", skip(self))]
    pub fn clear_children(&mut self, idx: Index) {
        let children = match self.arena.get_mut(idx) {
            Some(node) => {
                node.children_loaded = false;
                std::mem::take(&mut node.children)
            }
            None => return,
        };
        for child in children {
            self.drop_subtree(child);
        }
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.roots.clear();
        self.by_key.clear();
    }

    fn drop_subtree(&mut self, idx: Index) {
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.unregister(current) {
                stack.extend(node.children);
            }
        }
    }

    fn unregister(&mut self, idx: Index) -> Option<TreeNode> {
        let node = self.arena.remove(idx)?;
        let key = node.key();
        if let Some(instances) = self.by_key.get_mut(&key) {
            instances.retain(|&i| i != idx);
            if instances.is_empty() {
                self.by_key.remove(&key);
            }
        }
        Some(node)
    }

    /// Re-establishes display order among the children of `idx`.
    pub fn sort_children(&mut self, idx: Index) {
        let Some(node) = self.arena.get(idx) else {
            return;
        };
        let mut children = node.children.clone();
        children.sort_by(|&a, &b| compare_records(&self.arena[a].entity, &self.arena[b].entity));
        if let Some(node) = self.arena.get_mut(idx) {
            node.children = children;
        }
    }

    pub fn sort_roots(&mut self) {
        let mut roots = std::mem::take(&mut self.roots);
        roots.sort_by(|&a, &b| compare_records(&self.arena[a].entity, &self.arena[b].entity));
        self.roots = roots;
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn iter(&self) -> TreeIterator<'_> {
        TreeIterator::new(self)
    }

    pub fn depth(&self) -> usize {
        self.roots
            .iter()
            .map(|&root| self.calculate_depth(root))
            .max()
            .unwrap_or(0)
    }

    fn calculate_depth(&self, idx: Index) -> usize {
        match self.get(idx) {
            Some(node) => {
                1 + node
                    .children
                    .iter()
                    .map(|&child| self.calculate_depth(child))
                    .max()
                    .unwrap_or(0)
            }
            None => 0,
        }
    }

    /// Renders the forest below a synthetic `title` root.
    pub fn to_termtree(&self, title: &str) -> Tree<String> {
        let leaves = self.roots.iter().map(|&root| self.subtree(root));
        Tree::new(title.to_string()).with_leaves(leaves)
    }

    fn subtree(&self, idx: Index) -> Tree<String> {
        let node = &self.arena[idx];
        let marker = if node.children_loaded { "" } else { " …" };
        let label = format!("{} [{} {}]{}", node.entity.display, node.kind(), node.name, marker);
        Tree::new(label).with_leaves(node.children.iter().map(|&c| self.subtree(c)))
    }
}

/// Preorder traversal over all roots.
pub struct TreeIterator<'a> {
    arena: &'a TreeArena,
    stack: Vec<Index>,
}

impl<'a> TreeIterator<'a> {
    fn new(arena: &'a TreeArena) -> Self {
        let stack = arena.roots.iter().rev().copied().collect();
        Self { arena, stack }
    }
}

impl<'a> Iterator for TreeIterator<'a> {
    type Item = (Index, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current_idx) = self.stack.pop() {
            if let Some(node) = self.arena.get(current_idx) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current_idx, node));
            }
        }
        None
    }
}

//! Tree engine: owns the live tree and mediates every access to the store
//!
//! The host only keeps [`NodeId`]s and asks the engine to resolve them. Any
//! rebuild may invalidate ids, [`TreeEngine::node`] then returns `None`.

use std::collections::HashSet;

use tracing::{debug, info, instrument};

use crate::application::services::materializer::{fetch_children, Populated};
use crate::application::{ApplicationResult, PersistenceResultExt, ScopedSession};
use crate::domain::{
    EntityKind, EntityRecord, EntityRef, HierarchyFlags, HierarchySchema, NodeId, NodeKey,
    RootFilter, TreeArena, TreeNode,
};
use crate::infrastructure::traits::{OrphanHolder, Store};

pub struct TreeEngine {
    pub(crate) schema: HierarchySchema,
    pub(crate) store: Box<dyn Store>,
    pub(crate) tree: TreeArena,
    pub(crate) orphans: Option<Box<dyn OrphanHolder>>,
    pub(crate) selection: Vec<NodeId>,
}

impl TreeEngine {
    /// Resolves the schema once; later flag changes need a new engine.
    pub fn new(flags: HierarchyFlags, store: Box<dyn Store>) -> Self {
        let schema = HierarchySchema::resolve(flags);
        info!("schema: {}", schema);
        Self {
            schema,
            store,
            tree: TreeArena::new(),
            orphans: None,
            selection: Vec::new(),
        }
    }

    pub fn with_orphans(mut self, orphans: Box<dyn OrphanHolder>) -> Self {
        self.orphans = Some(orphans);
        self
    }

    pub fn orphans(&self) -> Option<&dyn OrphanHolder> {
        self.orphans.as_deref()
    }

    pub fn schema(&self) -> &HierarchySchema {
        &self.schema
    }

    pub fn tree(&self) -> &TreeArena {
        &self.tree
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.tree.get(id)
    }

    pub fn type_level(&self, kind: EntityKind) -> Option<usize> {
        self.schema.level_of(kind)
    }

    pub fn child_type(&self, kind: EntityKind) -> Option<EntityKind> {
        self.schema.child_of(kind)
    }

    pub fn parent_type(&self, kind: EntityKind) -> Option<EntityKind> {
        self.schema.parent_of(kind)
    }

    /// All live nodes for `(kind, name)`.
    pub fn find_nodes(&self, kind: EntityKind, name: &str) -> Vec<NodeId> {
        self.tree.find(&NodeKey::new(kind, name)).to_vec()
    }

    pub fn selection(&self) -> &[NodeId] {
        &self.selection
    }

    pub fn select(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        self.selection = nodes.into_iter().filter(|&n| self.tree.contains(n)).collect();
    }

    pub(crate) fn prune_selection(&mut self) {
        let tree = &self.tree;
        self.selection.retain(|&n| tree.contains(n));
    }

    /// Looks an entity up in the store.
    pub fn find_entity(&mut self, entity: EntityRef) -> ApplicationResult<Option<EntityRecord>> {
        let mut session = ScopedSession::open(self.store.as_mut())?;
        session.find_by_id(entity).with_context("find entity")
    }

    /// Replaces the tree with the level-0 entities and their first tier.
    ///
    /// Filter settings the schema gives no meaning to are ignored. Returns the
    /// number of roots.
    #[instrument(level = "debug", skip(self))]
    pub fn load_roots(&mut self, filter: &RootFilter) -> ApplicationResult<usize> {
        let filter = filter.restricted_to(self.schema.filter_support());
        let root_kind = self.schema.root_kind();
        let child_kind = self.schema.child_of(root_kind);
        let single_path = self.schema.single_path();
        let mut warnings = Vec::new();

        let loaded = {
            let mut session = ScopedSession::open(self.store.as_mut())?;
            let roots = session
                .find_roots(root_kind, &filter)
                .with_context("load roots")?;
            let mut loaded = Vec::with_capacity(roots.len());
            for root in roots {
                let children = match child_kind {
                    Some(child_kind) => {
                        fetch_children(&mut *session, &root, child_kind, single_path, &mut warnings)?
                            .into_iter()
                            .filter(|child| filter.admits_child(child))
                            .collect()
                    }
                    None => Vec::new(),
                };
                loaded.push((root, children));
            }
            loaded
        };

        self.tree.clear();
        self.selection.clear();
        let count = loaded.len();
        for (root, children) in loaded {
            let idx = self.tree.insert_root(root);
            self.attach_children(idx, children)?;
        }
        self.tree.sort_roots();
        debug!("load_roots: kind={} roots={} warnings={}", root_kind, count, warnings.len());
        Ok(count)
    }

    /// Populates `node` and prefetches its children's children so the host
    /// knows which of them are expandable.
    #[instrument(level = "debug", skip(self))]
    pub fn expand(&mut self, node: NodeId) -> ApplicationResult<Populated> {
        let mut populated = self.populate_children(node, false)?;
        self.tree.node_mut(node)?.set_expanded(true);
        for child in self.tree.children(node).to_vec() {
            let prefetched = self.populate_children(child, false)?;
            populated.warnings.extend(prefetched.warnings);
        }
        Ok(populated)
    }

    pub fn collapse(&mut self, node: NodeId) -> ApplicationResult<()> {
        self.tree.node_mut(node)?.set_expanded(false);
        Ok(())
    }

    /// Attaches freshly fetched children in display order and marks `node` loaded.
    ///
    /// A second record with the same `(kind, name)` is dropped.
    pub(crate) fn attach_children(
        &mut self,
        node: NodeId,
        records: Vec<EntityRecord>,
    ) -> ApplicationResult<usize> {
        let mut seen = HashSet::new();
        let mut added = 0;
        for record in records {
            if !seen.insert(NodeKey::from(&record)) {
                debug!("attach_children: skipping duplicate {}", NodeKey::from(&record));
                continue;
            }
            self.tree.insert_child(node, record)?;
            added += 1;
        }
        self.tree.sort_children(node);
        self.tree.node_mut(node)?.mark_loaded();
        Ok(added)
    }
}

//! Node materialization: turns persisted children into tree nodes on demand

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, instrument, warn};

use crate::application::{ApplicationResult, PersistenceResultExt, ScopedSession, TreeEngine};
use crate::domain::{EntityKind, EntityRecord, EntityRef, NodeId, NodeKey};
use crate::infrastructure::traits::{Relation, Store};

/// Non-fatal condition met while materializing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializeWarning {
    /// Single-path mode, but the operation owns several paths; only the first is shown
    MultiplePathsInSinglePathMode { operation: EntityRef, paths: usize },
}

impl fmt::Display for MaterializeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaterializeWarning::MultiplePathsInSinglePathMode { operation, paths } => write!(
                f,
                "{operation} has {paths} paths in single path mode, showing the first"
            ),
        }
    }
}

/// Result of a populate call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Populated {
    /// Nodes attached by this call, 0 when the node was already loaded
    pub added: usize,
    pub warnings: Vec<MaterializeWarning>,
}

/// Reads the children of `parent` that belong on the `child_kind` level.
///
/// Locks `parent` first. Operation and SimpleOperation children at the
/// Sequence level come from the first path only.
pub(crate) fn fetch_children(
    store: &mut dyn Store,
    parent: &EntityRecord,
    child_kind: EntityKind,
    single_path: bool,
    warnings: &mut Vec<MaterializeWarning>,
) -> ApplicationResult<Vec<EntityRecord>> {
    let owner = parent.entity_ref();
    store.lock(owner).with_context("lock parent")?;

    match (parent.kind, child_kind) {
        (EntityKind::Operation | EntityKind::SimpleOperation, EntityKind::Sequence) => {
            if !single_path {
                debug!("fetch_children: sequences below {} outside single path mode", owner);
            }
            let relation = match parent.kind {
                EntityKind::Operation => Relation::OperationPaths,
                _ => Relation::SimpleOperationPaths,
            };
            let paths = store.related(owner, relation).with_context("read paths")?;
            if paths.len() > 1 {
                warn!("more than one path in single path mode: {} has {}", owner, paths.len());
                warnings.push(MaterializeWarning::MultiplePathsInSinglePathMode {
                    operation: owner,
                    paths: paths.len(),
                });
            }
            match paths.first() {
                Some(path) => store
                    .related(path.entity_ref(), Relation::PathSequences)
                    .with_context("read sequences"),
                None => Ok(Vec::new()),
            }
        }
        (parent_kind, child_kind) => match Relation::children(parent_kind, child_kind) {
            Some(relation) => store.related(owner, relation).with_context("read children"),
            None => {
                debug!("fetch_children: {} has no {} children", parent_kind, child_kind);
                Ok(Vec::new())
            }
        },
    }
}

impl TreeEngine {
    /// Loads the children of `node` once.
    ///
    /// A no-op while the node is loaded, unless `force_reload` is set: the
    /// children are then discarded and fetched again. On failure the node is
    /// left as it was.
    #[instrument(level = "debug", skip(self))]
    pub fn populate_children(
        &mut self,
        node: NodeId,
        force_reload: bool,
    ) -> ApplicationResult<Populated> {
        let current = self.tree.node(node)?;
        if current.children_loaded() && !force_reload {
            return Ok(Populated::default());
        }
        let parent = current.entity.clone();

        let Some(child_kind) = self.schema.child_of(parent.kind) else {
            self.tree.clear_children(node);
            self.tree.node_mut(node)?.mark_loaded();
            return Ok(Populated::default());
        };

        let mut warnings = Vec::new();
        let records = {
            let mut session = ScopedSession::open(self.store.as_mut())?;
            fetch_children(
                &mut *session,
                &parent,
                child_kind,
                self.schema.single_path(),
                &mut warnings,
            )?
        };

        self.tree.clear_children(node);
        let added = self.attach_children(node, records)?;
        debug!("populate: node={} added={}", parent.entity_ref(), added);
        Ok(Populated { added, warnings })
    }

    /// Refreshes the entity of every node registered under `(kind, name)`,
    /// leaving children untouched.
    ///
    /// The entity is read once for all instances. On failure every node keeps
    /// its previous snapshot. Returns the number of nodes refreshed.
    #[instrument(level = "debug", skip(self))]
    pub fn reload_tree_nodes(&mut self, kind: EntityKind, name: &str) -> ApplicationResult<usize> {
        let nodes = self.find_nodes(kind, name);
        let Some(&first) = nodes.first() else {
            return Ok(0);
        };
        let entity = self.tree.node(first)?.entity.entity_ref();

        let record = {
            let mut session = ScopedSession::open(self.store.as_mut())?;
            session.reload(entity).with_context("reload entity")?
        };

        let mut parents = HashSet::new();
        for &node in &nodes {
            self.tree.replace_entity(node, record.clone())?;
            parents.insert(self.tree.node(node)?.parent());
        }
        for parent in parents {
            match parent {
                Some(parent) => self.tree.sort_children(parent),
                None => self.tree.sort_roots(),
            }
        }
        Ok(nodes.len())
    }

    /// Reloads and regenerates the children of every node registered under
    /// `(kind, name)`.
    ///
    /// Children that were expanded before are populated again and stay
    /// expanded; deeper levels are left to later calls. Returns the number of
    /// nodes rebuilt.
    #[instrument(level = "debug", skip(self))]
    pub fn build_tree_nodes(&mut self, kind: EntityKind, name: &str) -> ApplicationResult<usize> {
        let nodes = self.find_nodes(kind, name);
        if nodes.is_empty() {
            return Ok(0);
        }
        self.reload_tree_nodes(kind, name)?;

        for &node in &nodes {
            let expanded: HashSet<NodeKey> = self
                .tree
                .children(node)
                .iter()
                .filter_map(|&child| self.tree.get(child))
                .filter(|child| child.is_expanded())
                .map(|child| child.key())
                .collect();

            self.populate_children(node, true)?;

            for child in self.tree.children(node).to_vec() {
                let key = self.tree.node(child)?.key();
                if expanded.contains(&key) {
                    self.populate_children(child, false)?;
                    self.tree.node_mut(child)?.set_expanded(true);
                }
            }
        }
        self.prune_selection();
        Ok(nodes.len())
    }

    pub(crate) fn build_key(&mut self, key: &NodeKey) -> ApplicationResult<usize> {
        self.build_tree_nodes(key.kind, &key.name)
    }
}

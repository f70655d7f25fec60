//! Branch location: where does an entity sit, and which live nodes show it

use std::fmt;

use itertools::Itertools;
use tracing::{debug, instrument, warn};

use crate::application::{ApplicationResult, PersistenceResultExt, ScopedSession, TreeEngine};
use crate::domain::{EntityId, EntityKind, EntityRecord, HierarchySchema, NodeId, NodeKey};
use crate::infrastructure::traits::{Relation, Store};

/// One level of a branch: the node kind and its addressable key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BranchStep {
    pub kind: EntityKind,
    pub key: EntityId,
}

impl BranchStep {
    pub fn of(record: &EntityRecord) -> Self {
        Self {
            kind: record.kind,
            key: record.key,
        }
    }

    pub fn node_key(&self) -> NodeKey {
        NodeKey::of(self.kind, self.key)
    }
}

impl fmt::Display for BranchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.key)
    }
}

/// Path from the top of the hierarchy down to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Branch(pub Vec<BranchStep>);

impl Branch {
    pub fn steps(&self) -> &[BranchStep] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join(" / "))
    }
}

/// Walks upwards from `entity`, emitting one branch per distinct ancestry.
///
/// `trail` holds the steps from the focused entity up to `entity`.
fn collect_branches(
    store: &mut dyn Store,
    schema: &HierarchySchema,
    entity: &EntityRecord,
    trail: &mut Vec<BranchStep>,
    branches: &mut Vec<Branch>,
) -> ApplicationResult<()> {
    trail.push(BranchStep::of(entity));

    let relation = schema
        .parent_of(entity.kind)
        .and_then(|parent_kind| Relation::parents(entity.kind, parent_kind));
    let parents = match relation {
        Some(relation) => store
            .related(entity.entity_ref(), relation)
            .with_context("read parents")?,
        None => Vec::new(),
    };

    if parents.is_empty() {
        branches.push(Branch(trail.iter().rev().copied().collect()));
    } else {
        for parent in &parents {
            collect_branches(store, schema, parent, trail, branches)?;
        }
    }

    trail.pop();
    Ok(())
}

impl TreeEngine {
    /// Every position of `entity` in the hierarchy, each ordered from the top
    /// level down to `entity`.
    ///
    /// Reads parents only; the live tree is not touched. An entity without a
    /// parent yields a branch that does not start at level 0.
    #[instrument(level = "debug", skip(self, entity), fields(entity = %entity.entity_ref()))]
    pub fn all_branches(&mut self, entity: &EntityRecord) -> ApplicationResult<Vec<Branch>> {
        self.schema.require_level(entity.kind)?;

        let mut session = ScopedSession::open(self.store.as_mut())?;
        session
            .lock(entity.entity_ref())
            .with_context("lock focused entity")?;

        let mut branches = Vec::new();
        collect_branches(&mut *session, &self.schema, entity, &mut Vec::new(), &mut branches)?;
        debug!("all_branches: {} branches", branches.len());
        Ok(branches)
    }

    /// Finds the live node at the end of each branch, expanding on the way.
    ///
    /// The first step is looked up globally, every later one among the
    /// children of the node found for the previous step. A branch whose step
    /// cannot be found is skipped.
    #[instrument(level = "debug", skip_all, fields(branches = branches.len()))]
    pub fn locate_branches(&mut self, branches: &[Branch]) -> ApplicationResult<Vec<NodeId>> {
        let mut located = Vec::new();

        'branches: for branch in branches {
            let Some((first, rest)) = branch.steps().split_first() else {
                continue;
            };
            let Some(&start) = self.tree.find(&first.node_key()).first() else {
                debug!("locate: no live node for {}, skipping {}", first, branch);
                continue;
            };

            let mut current = start;
            for step in rest {
                if let Err(e) = self.populate_children(current, false) {
                    warn!("locate: cannot expand towards {}: {}", step, e);
                    continue 'branches;
                }
                self.tree.node_mut(current)?.set_expanded(true);

                match self.tree.find_child(current, &step.node_key()) {
                    Some(child) => current = child,
                    None => {
                        debug!("locate: {} not found, skipping {}", step, branch);
                        continue 'branches;
                    }
                }
            }
            located.push(current);
        }
        Ok(located)
    }

    /// Brings every node showing `entity` into the tree and selects them.
    ///
    /// When the main tree has none and an orphan holder is present, the
    /// search is repeated there. Returns the number of nodes selected.
    #[instrument(level = "debug", skip(self, entity), fields(entity = %entity.entity_ref()))]
    pub fn focus_all_instances(&mut self, entity: &EntityRecord) -> ApplicationResult<usize> {
        let branches = self.all_branches(entity)?;
        self.locate_branches(&branches)?;

        let found = self.tree.find(&NodeKey::from(entity)).to_vec();
        let count = found.len();
        self.selection = found;

        if count == 0 {
            if let Some(orphans) = self.orphans.as_mut() {
                debug!("focus: not in tree, trying orphans");
                return Ok(orphans.focus_all_instances(entity.kind, entity.key));
            }
        }
        Ok(count)
    }
}

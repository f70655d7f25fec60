//! Structural edits: drag-drop moves, copies, merges, reorders, unlinks and deletes
//!
//! Every edit runs in one transaction. The live tree is only touched after
//! the commit went through, so a failed edit leaves it exactly as it was.
//!
//! ```text
//! drop_node(drag, drop, effect)
//!   same level, sequences of one parent  -> reorder
//!   same level, Move                     -> merge
//!   drop one level above, not the parent -> move / copy
//!   anything else                        -> UnsupportedRelation
//! ```

use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};

use crate::application::{
    ApplicationError, ApplicationResult, PersistenceResultExt, ScopedSession, TreeEngine,
};
use crate::domain::{
    ConflictResolution, EntityId, EntityKind, EntityRecord, EntityRef, ModificationKind, NodeId,
    NodeKey, UpdateRecord,
};
use crate::infrastructure::traits::{Link, Relation, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropEffect {
    Move,
    Copy,
}

impl DropEffect {
    fn as_str(self) -> &'static str {
        match self {
            DropEffect::Move => "move",
            DropEffect::Copy => "copy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    /// Nothing to do; the store and the tree are unchanged
    Ignored { reason: &'static str },
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied)
    }
}

/// Single write of an edit, replayed inside the transaction.
#[derive(Debug)]
enum Write {
    Attach(Link, EntityId, EntityId),
    Detach(Link, EntityId, EntityId),
    Audit(UpdateRecord),
    SetOrder(EntityId, i32),
    Transient(EntityRef),
    Merge {
        kind: EntityKind,
        source: EntityId,
        target: EntityId,
    },
}

impl Write {
    fn apply(self, store: &mut dyn Store) -> ApplicationResult<()> {
        match self {
            Write::Attach(link, owner, item) => store.attach(link, owner, item).with_context("attach"),
            Write::Detach(link, owner, item) => store.detach(link, owner, item).with_context("detach"),
            Write::Audit(update) => store.make_persistent(update).with_context("write audit record"),
            Write::SetOrder(sequence, order) => store
                .set_sequence_order(sequence, order)
                .with_context("set sequence order"),
            Write::Transient(entity) => store.make_transient(entity).with_context("delete"),
            Write::Merge {
                kind,
                source,
                target,
            } => store
                .merge(kind, source, target, ConflictResolution::Keep)
                .map(|merged| debug!("merged into {}", merged.entity_ref()))
                .with_context("merge"),
        }
    }
}

/// Component addressed by a Component or Part record.
fn component_id(record: &EntityRecord) -> EntityId {
    match record.kind {
        EntityKind::Part => record.key,
        _ => record.id,
    }
}

/// Intermediate work piece addressed by an IntermediateWorkPiece or SimpleOperation record.
fn work_piece_id(record: &EntityRecord) -> EntityId {
    record.key
}

/// Fails when `target` already has a child keyed like `item`.
///
/// Project and Job targets additionally reject a component whose code or
/// name is taken by another component.
fn ensure_not_contained(
    store: &mut dyn Store,
    target: &EntityRecord,
    item: &EntityRecord,
) -> ApplicationResult<()> {
    let relations: Vec<Relation> = match (target.kind, item.kind) {
        (EntityKind::IntermediateWorkPiece, EntityKind::Operation) => vec![
            Relation::IntermediateWorkPieceOperation,
            Relation::IntermediateWorkPieceNextOperations,
        ],
        (parent, child) => Relation::children(parent, child).into_iter().collect(),
    };

    for relation in relations {
        let existing = store
            .related(target.entity_ref(), relation)
            .with_context("read target children")?;

        if existing.iter().any(|child| child.key == item.key) {
            return Err(ApplicationError::DuplicateChild {
                target: target.entity_ref(),
                kind: item.kind,
                key: item.node_name(),
            });
        }

        if matches!(target.kind, EntityKind::Project | EntityKind::Job) {
            for sibling in existing.iter().filter(|s| s.id != item.id) {
                let clash = [("code", &sibling.code, &item.code), ("name", &sibling.name, &item.name)]
                    .into_iter()
                    .find(|(_, theirs, ours)| ours.is_some() && theirs == ours);
                if let Some((field, _, value)) = clash {
                    return Err(ApplicationError::ConflictingName {
                        target: target.entity_ref(),
                        kind: item.kind,
                        field,
                        value: value.clone().unwrap_or_default(),
                    });
                }
            }
        }
    }
    Ok(())
}

impl TreeEngine {
    // ============================================================
    // Shared plumbing
    // ============================================================

    fn record_of(&self, node: NodeId) -> ApplicationResult<EntityRecord> {
        Ok(self.tree.node(node)?.entity.clone())
    }

    fn parent_record_of(&self, node: NodeId) -> ApplicationResult<Option<EntityRecord>> {
        match self.tree.node(node)?.parent() {
            Some(parent) => Ok(Some(self.record_of(parent)?)),
            None => Ok(None),
        }
    }

    /// Locks `locks`, lets `plan` read and decide, then replays its writes in
    /// one transaction.
    ///
    /// `plan` runs before the transaction opens, so a rejected edit never
    /// writes anything.
    fn commit_edit<F>(&mut self, locks: &[EntityRef], plan: F) -> ApplicationResult<()>
    where
        F: FnOnce(&mut dyn Store) -> ApplicationResult<Vec<Write>>,
    {
        let mut session = ScopedSession::open(self.store.as_mut())?;
        for &entity in locks {
            session.lock(entity).with_context("lock entity")?;
        }
        let writes = plan(&mut *session)?;
        debug!("commit_edit: {} writes", writes.len());

        let mut tx = session.begin_transaction()?;
        for write in writes {
            write.apply(&mut *tx)?;
        }
        tx.commit()
    }

    /// Rebuilds every node under each key once the store has moved on.
    ///
    /// The edit is already committed, so failures are only logged.
    fn rebuild_after_commit(&mut self, keys: impl IntoIterator<Item = NodeKey>) {
        let mut seen = HashSet::new();
        for key in keys {
            if !seen.insert(key.clone()) {
                continue;
            }
            if let Err(e) = self.build_key(&key) {
                warn!("rebuild of {} after commit failed: {}", key, e);
            }
        }
        self.prune_selection();
    }

    fn remove_nodes(&mut self, key: &NodeKey) {
        for node in self.tree.find(key).to_vec() {
            self.tree.remove(node);
        }
    }

    // ============================================================
    // Drag and drop
    // ============================================================

    /// Dispatches a drop of `drag` onto `drop`.
    #[instrument(level = "debug", skip(self))]
    pub fn drop_node(
        &mut self,
        drag: NodeId,
        drop: NodeId,
        effect: DropEffect,
    ) -> ApplicationResult<EditOutcome> {
        let drag_node = self.tree.node(drag)?;
        let drop_node = self.tree.node(drop)?;
        let (drag_kind, drop_kind) = (drag_node.kind(), drop_node.kind());
        let drag_level = self.schema.require_level(drag_kind)?;
        let drop_level = self.schema.require_level(drop_kind)?;

        if drag_level == drop_level {
            let siblings = drag_node.parent().is_some() && drag_node.parent() == drop_node.parent();
            if drag_kind == EntityKind::Sequence && siblings {
                return self.reorder(drag, drop);
            }
            return match effect {
                DropEffect::Move => self.merge_nodes(drag, drop),
                DropEffect::Copy => Err(ApplicationError::unsupported("copy", drag_kind, drop_kind)),
            };
        }

        let onto_own_parent = match drag_node.parent() {
            Some(parent) => self.tree.node(parent)?.key() == drop_node.key(),
            None => false,
        };
        if drop_level + 1 == drag_level && !onto_own_parent {
            return match effect {
                DropEffect::Move => self.move_node(drag, drop),
                DropEffect::Copy => self.copy_node(drag, drop),
            };
        }
        Err(ApplicationError::unsupported(effect.as_str(), drag_kind, drop_kind))
    }

    /// Detaches `drag` from its parent and attaches it below `drop`.
    ///
    /// Rebuilds the former parent and the drop target on success.
    #[instrument(level = "debug", skip(self))]
    pub fn move_node(&mut self, drag: NodeId, drop: NodeId) -> ApplicationResult<EditOutcome> {
        let item = self.record_of(drag)?;
        let target = self.record_of(drop)?;
        if item.kind == target.kind {
            return self.merge_nodes(drag, drop);
        }
        if self.schema.parent_of(item.kind) != Some(target.kind) {
            return Err(ApplicationError::unsupported("move", item.kind, target.kind));
        }
        let Some(former) = self.parent_record_of(drag)? else {
            return Err(ApplicationError::unsupported("move", item.kind, target.kind));
        };
        if former.entity_ref() == target.entity_ref() {
            return Ok(EditOutcome::Ignored {
                reason: "already below the drop target",
            });
        }

        let locks = [item.entity_ref(), former.entity_ref(), target.entity_ref()];
        let (guard_former, guard_target, guard_item) = (former.clone(), target.clone(), item.clone());
        self.commit_edit(&locks, move |store| {
            ensure_not_contained(store, &guard_target, &guard_item)?;
            move_writes(store, &guard_item, &guard_former, &guard_target)
        })?;

        info!("moved {} from {} to {}", item.entity_ref(), former.entity_ref(), target.entity_ref());
        self.rebuild_after_commit([NodeKey::from(&former), NodeKey::from(&target)]);
        Ok(EditOutcome::Applied)
    }

    /// Attaches `drag` below `drop` as well, keeping its current parent.
    ///
    /// Components are owned by exactly one project, so copies onto a Project
    /// or Job are ignored.
    #[instrument(level = "debug", skip(self))]
    pub fn copy_node(&mut self, drag: NodeId, drop: NodeId) -> ApplicationResult<EditOutcome> {
        let item = self.record_of(drag)?;
        let target = self.record_of(drop)?;
        if self.schema.parent_of(item.kind) != Some(target.kind) {
            return Err(ApplicationError::unsupported("copy", item.kind, target.kind));
        }
        if matches!(target.kind, EntityKind::Project | EntityKind::Job) {
            debug!("copy onto {} ignored", target.kind);
            return Ok(EditOutcome::Ignored {
                reason: "components belong to a single project",
            });
        }

        let writes = attach_writes("copy", &item, &target)?;
        let locks = [item.entity_ref(), target.entity_ref()];
        let (guard_target, guard_item) = (target.clone(), item.clone());
        self.commit_edit(&locks, move |store| {
            ensure_not_contained(store, &guard_target, &guard_item)?;
            Ok(writes)
        })?;

        info!("copied {} to {}", item.entity_ref(), target.entity_ref());
        self.rebuild_after_commit([NodeKey::from(&target)]);
        Ok(EditOutcome::Applied)
    }

    /// Folds the entity of `drag` into the entity of `drop`, target fields win.
    ///
    /// A merge can change several places of the tree at once: every parent of
    /// a node showing either entity is rebuilt.
    #[instrument(level = "debug", skip(self))]
    pub fn merge_nodes(&mut self, drag: NodeId, drop: NodeId) -> ApplicationResult<EditOutcome> {
        let source = self.record_of(drag)?;
        let target = self.record_of(drop)?;
        if source.kind != target.kind || matches!(target.kind, EntityKind::Path | EntityKind::Sequence) {
            return Err(ApplicationError::unsupported("merge", source.kind, target.kind));
        }
        if source.id == target.id {
            return Ok(EditOutcome::Ignored {
                reason: "cannot merge an entity with itself",
            });
        }

        let source_key = NodeKey::from(&source);
        let target_key = NodeKey::from(&target);
        let at_root = self.tree.node(drop)?.parent().is_none();
        let write = Write::Merge {
            kind: target.kind,
            source: source.id,
            target: target.id,
        };
        self.commit_edit(&[source.entity_ref(), target.entity_ref()], move |_| Ok(vec![write]))?;
        info!("merged {} into {}", source.entity_ref(), target.entity_ref());

        if at_root {
            self.remove_nodes(&source_key);
            self.rebuild_after_commit([target_key]);
            return Ok(EditOutcome::Applied);
        }

        let mut parents = Vec::new();
        for key in [&source_key, &target_key] {
            for &node in self.tree.find(key) {
                if let Some(parent) = self.tree.get(node).and_then(|n| n.parent()) {
                    if let Some(parent) = self.tree.get(parent) {
                        parents.push(parent.key());
                    }
                }
            }
        }
        self.remove_nodes(&source_key);
        self.rebuild_after_commit(parents);
        if let Err(e) = self.reload_tree_nodes(target_key.kind, &target_key.name) {
            warn!("reload of {} after merge failed: {}", target_key, e);
        }
        Ok(EditOutcome::Applied)
    }

    /// Moves sequence `drag` to the position of its sibling `drop`.
    ///
    /// The order values between both positions rotate by one slot, so the
    /// set of values used below the parent stays the same.
    #[instrument(level = "debug", skip(self))]
    pub fn reorder(&mut self, drag: NodeId, drop: NodeId) -> ApplicationResult<EditOutcome> {
        let drag_node = self.tree.node(drag)?;
        let drop_node = self.tree.node(drop)?;
        let (drag_kind, drop_kind) = (drag_node.kind(), drop_node.kind());
        let parent = match (drag_node.parent(), drop_node.parent()) {
            (Some(a), Some(b)) if a == b => a,
            _ => return Err(ApplicationError::unsupported("reorder", drag_kind, drop_kind)),
        };
        if drag_kind != EntityKind::Sequence || drop_kind != EntityKind::Sequence {
            return Err(ApplicationError::unsupported("reorder", drag_kind, drop_kind));
        }

        let siblings: Vec<EntityRecord> = self
            .tree
            .children(parent)
            .iter()
            .filter_map(|&child| self.tree.get(child))
            .map(|child| child.entity.clone())
            .collect();
        let position = |id| siblings.iter().position(|s: &EntityRecord| s.id == id);
        let (Some(from), Some(to)) = (
            position(drag_node.entity_id()),
            position(drop_node.entity_id()),
        ) else {
            return Err(ApplicationError::unsupported("reorder", drag_kind, drop_kind));
        };
        if from == to {
            return Ok(EditOutcome::Ignored {
                reason: "dropped onto itself",
            });
        }

        let window = from.min(to)..=from.max(to);
        let orders: Vec<i32> = siblings[window.clone()]
            .iter()
            .map(|s| s.order.unwrap_or_default())
            .collect();
        let mut moved: Vec<&EntityRecord> = siblings[window].iter().collect();
        if from < to {
            moved.rotate_left(1);
        } else {
            moved.rotate_right(1);
        }
        let writes: Vec<Write> = moved
            .iter()
            .zip(&orders)
            .filter(|(sequence, order)| sequence.order != Some(**order))
            .map(|(sequence, order)| Write::SetOrder(sequence.id, *order))
            .collect();

        let parent_record = self.record_of(parent)?;
        let mut locks = vec![parent_record.entity_ref()];
        locks.extend(moved.iter().map(|s| s.entity_ref()));
        self.commit_edit(&locks, move |_| Ok(writes))?;

        info!("reordered below {}", parent_record.entity_ref());
        self.rebuild_after_commit([NodeKey::from(&parent_record)]);
        Ok(EditOutcome::Applied)
    }

    // ============================================================
    // Unlink, delete, adopt
    // ============================================================

    /// Removes the link between `node` and its parent.
    ///
    /// An entity left without any parent is handed to the orphan holder.
    #[instrument(level = "debug", skip(self))]
    pub fn unlink(&mut self, node: NodeId) -> ApplicationResult<EditOutcome> {
        let item = self.record_of(node)?;
        let Some(parent) = self.parent_record_of(node)? else {
            return Err(ApplicationError::unsupported("unlink", item.kind, item.kind));
        };

        let (writes, remaining) = match (parent.kind, item.kind) {
            (EntityKind::WorkOrder, EntityKind::Project | EntityKind::Part) => (
                vec![
                    Write::Detach(Link::WorkOrderProject, parent.id, item.id),
                    Write::Audit(UpdateRecord::work_order_project(
                        parent.id,
                        item.id,
                        ModificationKind::Delete,
                    )),
                ],
                match item.kind {
                    EntityKind::Part => Relation::PartWorkOrders,
                    _ => Relation::ProjectWorkOrders,
                },
            ),
            (
                EntityKind::Component | EntityKind::Part,
                EntityKind::IntermediateWorkPiece | EntityKind::SimpleOperation,
            ) => {
                let (component, piece) = (component_id(&parent), work_piece_id(&item));
                (
                    vec![
                        Write::Detach(Link::ComponentIntermediateWorkPiece, component, piece),
                        Write::Audit(UpdateRecord::component_intermediate_work_piece(
                            component,
                            piece,
                            ModificationKind::Delete,
                        )),
                    ],
                    match item.kind {
                        EntityKind::SimpleOperation => Relation::SimpleOperationComponents,
                        _ => Relation::IntermediateWorkPieceComponents,
                    },
                )
            }
            (parent_kind, kind) => return Err(ApplicationError::unsupported("unlink", kind, parent_kind)),
        };

        self.commit_edit(&[item.entity_ref(), parent.entity_ref()], move |_| Ok(writes))?;
        info!("unlinked {} from {}", item.entity_ref(), parent.entity_ref());

        let orphaned = {
            let mut session = ScopedSession::open(self.store.as_mut())?;
            match session.related(item.entity_ref(), remaining) {
                Ok(parents) if parents.is_empty() => session
                    .find_by_id(item.entity_ref())
                    .ok()
                    .flatten()
                    .or_else(|| Some(item.clone())),
                Ok(_) => None,
                Err(e) => {
                    warn!("unlink: cannot tell whether {} is orphaned: {}", item.entity_ref(), e);
                    None
                }
            }
        };
        if let Some(orphan) = orphaned {
            match self.orphans.as_mut() {
                Some(holder) => holder.insert_node(&orphan),
                None => debug!("unlink: {} orphaned, no holder", orphan.entity_ref()),
            }
        }

        self.tree.remove(node);
        self.rebuild_after_commit([NodeKey::from(&parent)]);
        Ok(EditOutcome::Applied)
    }

    /// Destroys a path or a sequence.
    #[instrument(level = "debug", skip(self))]
    pub fn delete(&mut self, node: NodeId) -> ApplicationResult<EditOutcome> {
        let item = self.record_of(node)?;
        let parent = self.parent_record_of(node)?;
        let parent_kind = parent.as_ref().map_or(item.kind, |p| p.kind);

        let owner = item.entity_ref();
        match item.kind {
            EntityKind::Path => {
                let Some(operation) = parent.as_ref() else {
                    return Err(ApplicationError::unsupported("delete", item.kind, parent_kind));
                };
                let operation_id = operation.id;
                self.commit_edit(&[owner, operation.entity_ref()], move |_| {
                    Ok(vec![
                        Write::Detach(Link::OperationPath, operation_id, owner.id),
                        Write::Transient(owner),
                    ])
                })?;
            }
            EntityKind::Sequence => {
                self.commit_edit(&[owner], move |store| {
                    let paths = store
                        .related(owner, Relation::SequencePath)
                        .with_context("read owning path")?;
                    let mut writes: Vec<Write> = paths
                        .iter()
                        .map(|path| Write::Detach(Link::PathSequence, path.id, owner.id))
                        .collect();
                    writes.push(Write::Transient(owner));
                    Ok(writes)
                })?;
            }
            kind => return Err(ApplicationError::unsupported("delete", kind, parent_kind)),
        }
        info!("deleted {}", owner);

        self.remove_nodes(&NodeKey::from(&item));
        if let Some(parent) = parent {
            self.rebuild_after_commit([NodeKey::from(&parent)]);
        } else {
            self.prune_selection();
        }
        Ok(EditOutcome::Applied)
    }

    /// Gives an orphan a parent again and takes it out of the orphan holder.
    #[instrument(level = "debug", skip(self, orphan), fields(orphan = %orphan.entity_ref()))]
    pub fn adopt_orphan(&mut self, orphan: &EntityRecord, drop: NodeId) -> ApplicationResult<EditOutcome> {
        let target = self.record_of(drop)?;
        if self.schema.parent_of(orphan.kind) != Some(target.kind) {
            return Err(ApplicationError::unsupported("adopt", orphan.kind, target.kind));
        }
        let writes = match (target.kind, orphan.kind) {
            (EntityKind::WorkOrder, EntityKind::Project | EntityKind::Part)
            | (
                EntityKind::Component | EntityKind::Part,
                EntityKind::IntermediateWorkPiece | EntityKind::SimpleOperation,
            ) => attach_writes("adopt", orphan, &target)?,
            (drop_kind, kind) => return Err(ApplicationError::unsupported("adopt", kind, drop_kind)),
        };

        let (guard_target, guard_item) = (target.clone(), orphan.clone());
        self.commit_edit(&[orphan.entity_ref(), target.entity_ref()], move |store| {
            ensure_not_contained(store, &guard_target, &guard_item)?;
            Ok(writes)
        })?;
        info!("adopted {} into {}", orphan.entity_ref(), target.entity_ref());

        if let Some(holder) = self.orphans.as_mut() {
            holder.remove_node(orphan);
        }
        self.rebuild_after_commit([NodeKey::from(&target)]);
        Ok(EditOutcome::Applied)
    }
}

/// Writes linking `item` below `target` without touching other parents.
fn attach_writes(
    operation: &'static str,
    item: &EntityRecord,
    target: &EntityRecord,
) -> ApplicationResult<Vec<Write>> {
    let writes = match (target.kind, item.kind) {
        (EntityKind::WorkOrder, EntityKind::Project | EntityKind::Part) => vec![
            Write::Attach(Link::WorkOrderProject, target.id, item.id),
            Write::Audit(UpdateRecord::work_order_project(
                target.id,
                item.id,
                ModificationKind::New,
            )),
        ],
        (
            EntityKind::Component | EntityKind::Part,
            EntityKind::IntermediateWorkPiece | EntityKind::SimpleOperation,
        ) => {
            let (component, piece) = (component_id(target), work_piece_id(item));
            vec![
                Write::Attach(Link::ComponentIntermediateWorkPiece, component, piece),
                Write::Audit(UpdateRecord::component_intermediate_work_piece(
                    component,
                    piece,
                    ModificationKind::New,
                )),
            ]
        }
        (EntityKind::IntermediateWorkPiece, EntityKind::Operation) => vec![
            Write::Attach(Link::IntermediateWorkPieceNextOperation, target.id, item.id),
            Write::Audit(UpdateRecord::intermediate_work_piece_operation(
                target.id,
                None,
                Some(item.id),
            )),
        ],
        (drop_kind, kind) => return Err(ApplicationError::unsupported(operation, kind, drop_kind)),
    };
    Ok(writes)
}

/// Writes re-linking `item` from `former` to `target`.
///
/// Operations are moved between next-operation lists. A work piece showing
/// the operation as its own operation does not list it there, so only the
/// attach is written in that case.
fn move_writes(
    store: &mut dyn Store,
    item: &EntityRecord,
    former: &EntityRecord,
    target: &EntityRecord,
) -> ApplicationResult<Vec<Write>> {
    let writes = match (target.kind, item.kind) {
        (EntityKind::WorkOrder, EntityKind::Project | EntityKind::Part) => vec![
            Write::Detach(Link::WorkOrderProject, former.id, item.id),
            Write::Audit(UpdateRecord::work_order_project(
                former.id,
                item.id,
                ModificationKind::Delete,
            )),
            Write::Attach(Link::WorkOrderProject, target.id, item.id),
            Write::Audit(UpdateRecord::work_order_project(
                target.id,
                item.id,
                ModificationKind::New,
            )),
        ],
        (EntityKind::Project | EntityKind::Job, EntityKind::Component) => vec![
            Write::Attach(Link::ProjectComponent, target.id, item.id),
            Write::Audit(UpdateRecord::project_component(item.id, former.id, target.id)),
        ],
        (
            EntityKind::Component | EntityKind::Part,
            EntityKind::IntermediateWorkPiece | EntityKind::SimpleOperation,
        ) => {
            let piece = work_piece_id(item);
            let (from, into) = (component_id(former), component_id(target));
            vec![
                Write::Detach(Link::ComponentIntermediateWorkPiece, from, piece),
                Write::Audit(UpdateRecord::component_intermediate_work_piece(
                    from,
                    piece,
                    ModificationKind::Delete,
                )),
                Write::Attach(Link::ComponentIntermediateWorkPiece, into, piece),
                Write::Audit(UpdateRecord::component_intermediate_work_piece(
                    into,
                    piece,
                    ModificationKind::New,
                )),
            ]
        }
        (EntityKind::IntermediateWorkPiece, EntityKind::Operation) => {
            let listed = store
                .related(former.entity_ref(), Relation::IntermediateWorkPieceNextOperations)
                .with_context("read next operations")?
                .iter()
                .any(|op| op.id == item.id);
            let mut writes = Vec::with_capacity(4);
            if listed {
                writes.push(Write::Detach(Link::IntermediateWorkPieceNextOperation, former.id, item.id));
                writes.push(Write::Audit(UpdateRecord::intermediate_work_piece_operation(
                    former.id,
                    Some(item.id),
                    None,
                )));
            } else {
                debug!("move: {} is not a next operation of {}", item.entity_ref(), former.entity_ref());
            }
            writes.push(Write::Attach(Link::IntermediateWorkPieceNextOperation, target.id, item.id));
            writes.push(Write::Audit(UpdateRecord::intermediate_work_piece_operation(
                target.id,
                None,
                Some(item.id),
            )));
            writes
        }
        (drop_kind, kind) => return Err(ApplicationError::unsupported("move", kind, drop_kind)),
    };
    Ok(writes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_part_and_component_when_resolving_component_then_uses_part_key() {
        let part = EntityRecord::new(EntityKind::Part, 10, "P-10").with_key(100);
        let component = EntityRecord::new(EntityKind::Component, 100, "C-100");
        assert_eq!(component_id(&part), 100);
        assert_eq!(component_id(&component), 100);
    }

    #[test]
    fn given_copy_between_owning_kinds_when_planning_then_unsupported() {
        let component = EntityRecord::new(EntityKind::Component, 100, "C-100");
        let path = EntityRecord::new(EntityKind::Path, 50, "path 1");
        let result = attach_writes("copy", &path, &component);
        assert!(matches!(result, Err(ApplicationError::UnsupportedRelation { .. })));
    }
}

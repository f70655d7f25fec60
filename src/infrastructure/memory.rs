//! In-process implementation of the persistence boundary
//!
//! Transactions snapshot the tables and restore them on rollback. The
//! sequence-order uniqueness constraint and dangling owned entities are only
//! checked at commit, so reorders may pass through duplicate orders.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, instrument, warn};

use crate::domain::{
    ConflictResolution, EntityId, EntityKind, EntityRecord, EntityRef, RootFilter, UpdateRecord,
};
use crate::infrastructure::fixture::{
    ComponentRow, Dataset, IntermediateWorkPieceRow, OperationRow, PathRow, ProjectRow,
    SequenceRow, WorkOrderRow,
};
use crate::infrastructure::traits::{Link, PersistenceError, PersistenceResult, Relation, Store};

#[derive(Debug, Clone, Default)]
struct Tables {
    work_orders: BTreeMap<EntityId, WorkOrderRow>,
    projects: BTreeMap<EntityId, ProjectRow>,
    components: BTreeMap<EntityId, ComponentRow>,
    intermediate_work_pieces: BTreeMap<EntityId, IntermediateWorkPieceRow>,
    operations: BTreeMap<EntityId, OperationRow>,
    paths: BTreeMap<EntityId, PathRow>,
    sequences: BTreeMap<EntityId, SequenceRow>,
    updates: Vec<UpdateRecord>,
    /// Owned entities detached from their owner and not yet made transient
    dangling: BTreeSet<(EntityKind, EntityId)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: Tables,
    snapshot: Option<Tables>,
    sessions: usize,
    sessions_opened: usize,
    reads: usize,
    commits: usize,
    fail_next_commit: bool,
}

/// Shared handle on an in-memory entity graph.
///
/// Clones share the same state, so a test can keep one handle for inspection
/// while the engine owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryState>>,
}

fn display(name: &Option<String>, code: &Option<String>, fallback: impl FnOnce() -> String) -> String {
    match (code, name) {
        (Some(code), Some(name)) => format!("{code} {name}"),
        (None, Some(name)) => name.clone(),
        (Some(code), None) => code.clone(),
        (None, None) => fallback(),
    }
}

fn keep_or(policy: ConflictResolution, target: &mut Option<String>, source: Option<String>) {
    match policy {
        ConflictResolution::Keep => {
            if target.is_none() {
                *target = source;
            }
        }
        ConflictResolution::Overwrite => {
            if source.is_some() {
                *target = source;
            }
        }
    }
}

impl Tables {
    fn work_order_record(&self, row: &WorkOrderRow) -> EntityRecord {
        EntityRecord::new(
            EntityKind::WorkOrder,
            row.id,
            display(&row.name, &row.code, || format!("work order {}", row.id)),
        )
        .with_code(row.code.clone())
        .with_name(row.name.clone())
        .with_status(row.status)
    }

    fn project_display(row: &ProjectRow) -> String {
        display(&row.name, &row.code, || format!("project {}", row.id))
    }

    fn project_record(&self, row: &ProjectRow) -> EntityRecord {
        EntityRecord::new(EntityKind::Project, row.id, Self::project_display(row))
            .with_code(row.code.clone())
            .with_name(row.name.clone())
            .with_archived(row.archived)
    }

    fn job_record(&self, row: &ProjectRow) -> EntityRecord {
        let status = row
            .work_orders
            .iter()
            .find_map(|wo| self.work_orders.get(wo))
            .and_then(|wo| wo.status);
        EntityRecord::new(EntityKind::Job, row.id, Self::project_display(row))
            .with_code(row.code.clone())
            .with_name(row.name.clone())
            .with_archived(row.archived)
            .with_status(status)
    }

    fn component_of_project(&self, project: EntityId) -> Option<&ComponentRow> {
        self.components.values().find(|c| c.project == project)
    }

    /// A part is a project seen together with its single component.
    ///
    /// Keyed by the first component; `Dataset::validate_parts` rejects
    /// projects with more than one when the container shows parts.
    fn part_record(&self, row: &ProjectRow) -> Option<EntityRecord> {
        let component = self.component_of_project(row.id)?;
        Some(
            EntityRecord::new(EntityKind::Part, row.id, Self::project_display(row))
                .with_key(component.id)
                .with_code(row.code.clone())
                .with_name(row.name.clone())
                .with_archived(row.archived),
        )
    }

    fn part_of_component(&self, component: EntityId) -> Option<EntityRecord> {
        let row = self.components.get(&component)?;
        self.projects.get(&row.project).and_then(|p| self.part_record(p))
    }

    fn component_record(&self, row: &ComponentRow) -> EntityRecord {
        EntityRecord::new(
            EntityKind::Component,
            row.id,
            display(&row.name, &row.code, || format!("component {}", row.id)),
        )
        .with_code(row.code.clone())
        .with_name(row.name.clone())
    }

    fn operation_archived(&self, operation: Option<EntityId>) -> bool {
        operation
            .and_then(|op| self.operations.get(&op))
            .is_some_and(|op| op.archived)
    }

    fn iwp_display(row: &IntermediateWorkPieceRow) -> String {
        display(&row.name, &row.code, || format!("work piece {}", row.id))
    }

    fn iwp_record(&self, row: &IntermediateWorkPieceRow) -> EntityRecord {
        EntityRecord::new(EntityKind::IntermediateWorkPiece, row.id, Self::iwp_display(row))
            .with_code(row.code.clone())
            .with_name(row.name.clone())
            .with_archived(self.operation_archived(row.operation))
    }

    /// A simple operation is a work piece seen together with its operation.
    fn simple_operation_record(&self, row: &IntermediateWorkPieceRow) -> Option<EntityRecord> {
        let operation = row.operation?;
        Some(
            EntityRecord::new(EntityKind::SimpleOperation, operation, Self::iwp_display(row))
                .with_key(row.id)
                .with_code(row.code.clone())
                .with_name(row.name.clone())
                .with_archived(self.operation_archived(Some(operation))),
        )
    }

    fn iwp_of_operation(&self, operation: EntityId) -> Option<&IntermediateWorkPieceRow> {
        self.intermediate_work_pieces
            .values()
            .find(|iwp| iwp.operation == Some(operation))
    }

    fn operation_record(&self, row: &OperationRow) -> EntityRecord {
        EntityRecord::new(
            EntityKind::Operation,
            row.id,
            display(&row.name, &row.code, || format!("operation {}", row.id)),
        )
        .with_code(row.code.clone())
        .with_name(row.name.clone())
        .with_archived(row.archived)
    }

    fn path_record(&self, row: &PathRow) -> EntityRecord {
        EntityRecord::new(EntityKind::Path, row.id, format!("path {}", row.number))
            .with_number(row.number)
    }

    fn sequence_record(&self, row: &SequenceRow) -> EntityRecord {
        let fallback = format!("sequence {}", row.order);
        EntityRecord::new(
            EntityKind::Sequence,
            row.id,
            row.name.clone().unwrap_or(fallback),
        )
        .with_name(row.name.clone())
        .with_order(row.order)
    }

    fn record(&self, entity: EntityRef) -> Option<EntityRecord> {
        let id = entity.id;
        match entity.kind {
            EntityKind::WorkOrder => self.work_orders.get(&id).map(|r| self.work_order_record(r)),
            EntityKind::Project => self.projects.get(&id).map(|r| self.project_record(r)),
            EntityKind::Job => self.projects.get(&id).map(|r| self.job_record(r)),
            EntityKind::Part => self.projects.get(&id).and_then(|r| self.part_record(r)),
            EntityKind::Component => self.components.get(&id).map(|r| self.component_record(r)),
            EntityKind::IntermediateWorkPiece => self
                .intermediate_work_pieces
                .get(&id)
                .map(|r| self.iwp_record(r)),
            EntityKind::SimpleOperation => self
                .iwp_of_operation(id)
                .and_then(|r| self.simple_operation_record(r)),
            EntityKind::Operation => self.operations.get(&id).map(|r| self.operation_record(r)),
            EntityKind::Path => self.paths.get(&id).map(|r| self.path_record(r)),
            EntityKind::Sequence => self.sequences.get(&id).map(|r| self.sequence_record(r)),
        }
    }

    fn require(&self, entity: EntityRef) -> PersistenceResult<EntityRecord> {
        self.record(entity).ok_or(PersistenceError::NotFound(entity))
    }

    fn projects_of_work_order(&self, work_order: EntityId) -> impl Iterator<Item = &ProjectRow> {
        self.projects
            .values()
            .filter(move |p| p.work_orders.contains(&work_order))
    }

    fn iwps_of_component(&self, component: EntityId) -> impl Iterator<Item = &IntermediateWorkPieceRow> {
        self.intermediate_work_pieces
            .values()
            .filter(move |iwp| iwp.components.contains(&component))
    }

    fn work_orders_of_project(&self, project: EntityId) -> Vec<EntityRecord> {
        self.projects
            .get(&project)
            .map(|p| {
                p.work_orders
                    .iter()
                    .filter_map(|wo| self.work_orders.get(wo))
                    .map(|wo| self.work_order_record(wo))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn components_of_iwp(&self, iwp: Option<&IntermediateWorkPieceRow>) -> Vec<&ComponentRow> {
        iwp.map(|iwp| {
            iwp.components
                .iter()
                .filter_map(|c| self.components.get(c))
                .collect()
        })
        .unwrap_or_default()
    }

    fn paths_of_operation(&self, operation: EntityId) -> Vec<EntityRecord> {
        let mut paths: Vec<&PathRow> = self
            .paths
            .values()
            .filter(|p| p.operation == operation && !self.dangling.contains(&(EntityKind::Path, p.id)))
            .collect();
        paths.sort_by_key(|p| p.number);
        paths.into_iter().map(|p| self.path_record(p)).collect()
    }

    fn sequences_of_path(&self, path: EntityId) -> Vec<EntityRecord> {
        let mut sequences: Vec<&SequenceRow> = self
            .sequences
            .values()
            .filter(|s| s.path == path && !self.dangling.contains(&(EntityKind::Sequence, s.id)))
            .collect();
        sequences.sort_by_key(|s| s.order);
        sequences.into_iter().map(|s| self.sequence_record(s)).collect()
    }

    fn related(&self, entity: EntityRef, relation: Relation) -> Vec<EntityRecord> {
        let id = entity.id;
        match relation {
            Relation::WorkOrderProjects => self
                .projects_of_work_order(id)
                .map(|p| self.project_record(p))
                .collect(),
            Relation::WorkOrderParts => self
                .projects_of_work_order(id)
                .filter_map(|p| self.part_record(p))
                .collect(),
            Relation::JobComponents | Relation::ProjectComponents => self
                .components
                .values()
                .filter(|c| c.project == id)
                .map(|c| self.component_record(c))
                .collect(),
            Relation::ComponentIntermediateWorkPieces => self
                .iwps_of_component(id)
                .map(|iwp| self.iwp_record(iwp))
                .collect(),
            Relation::ComponentSimpleOperations => self
                .iwps_of_component(id)
                .filter_map(|iwp| self.simple_operation_record(iwp))
                .collect(),
            Relation::PartIntermediateWorkPieces => match self.component_of_project(id) {
                Some(component) => self
                    .iwps_of_component(component.id)
                    .map(|iwp| self.iwp_record(iwp))
                    .collect(),
                None => Vec::new(),
            },
            Relation::PartSimpleOperations => match self.component_of_project(id) {
                Some(component) => self
                    .iwps_of_component(component.id)
                    .filter_map(|iwp| self.simple_operation_record(iwp))
                    .collect(),
                None => Vec::new(),
            },
            Relation::IntermediateWorkPieceOperation => self
                .intermediate_work_pieces
                .get(&id)
                .and_then(|iwp| iwp.operation)
                .and_then(|op| self.operations.get(&op))
                .map(|op| vec![self.operation_record(op)])
                .unwrap_or_default(),
            Relation::IntermediateWorkPieceNextOperations => self
                .intermediate_work_pieces
                .get(&id)
                .map(|iwp| {
                    iwp.next_operations
                        .iter()
                        .filter_map(|op| self.operations.get(op))
                        .map(|op| self.operation_record(op))
                        .collect()
                })
                .unwrap_or_default(),
            Relation::OperationPaths | Relation::SimpleOperationPaths => self.paths_of_operation(id),
            Relation::PathSequences => self.sequences_of_path(id),

            Relation::ProjectWorkOrders | Relation::PartWorkOrders => self.work_orders_of_project(id),
            Relation::ComponentProject => self
                .components
                .get(&id)
                .and_then(|c| self.projects.get(&c.project))
                .map(|p| vec![self.project_record(p)])
                .unwrap_or_default(),
            Relation::ComponentJob => self
                .components
                .get(&id)
                .and_then(|c| self.projects.get(&c.project))
                .map(|p| vec![self.job_record(p)])
                .unwrap_or_default(),
            Relation::IntermediateWorkPieceComponents => self
                .components_of_iwp(self.intermediate_work_pieces.get(&id))
                .into_iter()
                .map(|c| self.component_record(c))
                .collect(),
            Relation::IntermediateWorkPieceParts => self
                .components_of_iwp(self.intermediate_work_pieces.get(&id))
                .into_iter()
                .filter_map(|c| self.part_of_component(c.id))
                .collect(),
            Relation::SimpleOperationComponents => self
                .components_of_iwp(self.iwp_of_operation(id))
                .into_iter()
                .map(|c| self.component_record(c))
                .collect(),
            Relation::SimpleOperationParts => self
                .components_of_iwp(self.iwp_of_operation(id))
                .into_iter()
                .filter_map(|c| self.part_of_component(c.id))
                .collect(),
            Relation::OperationIntermediateWorkPieces => self
                .intermediate_work_pieces
                .values()
                .filter(|iwp| iwp.operation == Some(id))
                .map(|iwp| self.iwp_record(iwp))
                .collect(),
            Relation::PathOperation => self
                .paths
                .get(&id)
                .and_then(|p| self.operations.get(&p.operation))
                .map(|op| vec![self.operation_record(op)])
                .unwrap_or_default(),
            Relation::PathSimpleOperation => self
                .paths
                .get(&id)
                .and_then(|p| self.iwp_of_operation(p.operation))
                .and_then(|iwp| self.simple_operation_record(iwp))
                .into_iter()
                .collect(),
            Relation::SequencePath => self
                .sequences
                .get(&id)
                .and_then(|s| self.paths.get(&s.path))
                .map(|p| vec![self.path_record(p)])
                .unwrap_or_default(),
            Relation::SequenceOperation => self
                .sequences
                .get(&id)
                .and_then(|s| self.paths.get(&s.path))
                .and_then(|p| self.operations.get(&p.operation))
                .map(|op| vec![self.operation_record(op)])
                .unwrap_or_default(),
            Relation::SequenceSimpleOperation => self
                .sequences
                .get(&id)
                .and_then(|s| self.paths.get(&s.path))
                .and_then(|p| self.iwp_of_operation(p.operation))
                .and_then(|iwp| self.simple_operation_record(iwp))
                .into_iter()
                .collect(),
        }
    }

    fn roots(&self, kind: EntityKind, filter: &RootFilter) -> Vec<EntityRecord> {
        let project_visible = |p: &&ProjectRow| filter.admits_project(p.archived);
        let status_matches = |p: &ProjectRow| {
            filter.work_order_status.is_none()
                || p.work_orders
                    .iter()
                    .filter_map(|wo| self.work_orders.get(wo))
                    .any(|wo| filter.admits_status(wo.status))
        };
        match kind {
            EntityKind::WorkOrder => self
                .work_orders
                .values()
                .filter(|wo| filter.admits_status(wo.status))
                .map(|wo| self.work_order_record(wo))
                .collect(),
            EntityKind::Job => self
                .projects
                .values()
                .filter(|p| !p.work_orders.is_empty())
                .filter(project_visible)
                .filter(|p| status_matches(p))
                .map(|p| self.job_record(p))
                .collect(),
            EntityKind::Part => self
                .projects
                .values()
                .filter(project_visible)
                .filter(|p| status_matches(p))
                .filter_map(|p| self.part_record(p))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn orphans(&self, kind: EntityKind) -> Vec<EntityRecord> {
        let unlinked_projects = self.projects.values().filter(|p| p.work_orders.is_empty());
        let unused_iwps = self
            .intermediate_work_pieces
            .values()
            .filter(|iwp| iwp.components.is_empty());
        match kind {
            EntityKind::Project => unlinked_projects.map(|p| self.project_record(p)).collect(),
            EntityKind::Part => unlinked_projects.filter_map(|p| self.part_record(p)).collect(),
            EntityKind::IntermediateWorkPiece => unused_iwps.map(|iwp| self.iwp_record(iwp)).collect(),
            EntityKind::SimpleOperation => unused_iwps
                .filter_map(|iwp| self.simple_operation_record(iwp))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn attach(&mut self, link: Link, owner: EntityId, item: EntityId) -> PersistenceResult<()> {
        match link {
            Link::WorkOrderProject => {
                self.exists(EntityKind::WorkOrder, owner)?;
                self.project_mut(item)?.work_orders.insert(owner);
            }
            Link::ProjectComponent => {
                self.exists(EntityKind::Project, owner)?;
                self.component_mut(item)?.project = owner;
            }
            Link::ComponentIntermediateWorkPiece => {
                self.exists(EntityKind::Component, owner)?;
                self.iwp_mut(item)?.components.insert(owner);
            }
            Link::IntermediateWorkPieceNextOperation => {
                self.exists(EntityKind::Operation, item)?;
                self.iwp_mut(owner)?.next_operations.insert(item);
            }
            Link::OperationPath => {
                self.exists(EntityKind::Operation, owner)?;
                let path = self
                    .paths
                    .get_mut(&item)
                    .ok_or(PersistenceError::NotFound(EntityRef::new(EntityKind::Path, item)))?;
                path.operation = owner;
                self.dangling.remove(&(EntityKind::Path, item));
            }
            Link::PathSequence => {
                self.exists(EntityKind::Path, owner)?;
                let sequence = self.sequences.get_mut(&item).ok_or(PersistenceError::NotFound(
                    EntityRef::new(EntityKind::Sequence, item),
                ))?;
                sequence.path = owner;
                self.dangling.remove(&(EntityKind::Sequence, item));
            }
        }
        Ok(())
    }

    fn detach(&mut self, link: Link, owner: EntityId, item: EntityId) -> PersistenceResult<()> {
        let not_linked = || PersistenceError::Constraint(format!("{link:?} {owner} -> {item} does not exist"));
        match link {
            Link::WorkOrderProject => {
                if !self.project_mut(item)?.work_orders.remove(&owner) {
                    return Err(not_linked());
                }
            }
            Link::ProjectComponent => {
                return Err(PersistenceError::Constraint(format!(
                    "component {item} cannot exist without a project"
                )));
            }
            Link::ComponentIntermediateWorkPiece => {
                if !self.iwp_mut(item)?.components.remove(&owner) {
                    return Err(not_linked());
                }
            }
            Link::IntermediateWorkPieceNextOperation => {
                if !self.iwp_mut(owner)?.next_operations.remove(&item) {
                    return Err(not_linked());
                }
            }
            Link::OperationPath => {
                let path = self
                    .paths
                    .get(&item)
                    .ok_or(PersistenceError::NotFound(EntityRef::new(EntityKind::Path, item)))?;
                if path.operation != owner {
                    return Err(not_linked());
                }
                self.dangling.insert((EntityKind::Path, item));
            }
            Link::PathSequence => {
                let sequence = self.sequences.get(&item).ok_or(PersistenceError::NotFound(
                    EntityRef::new(EntityKind::Sequence, item),
                ))?;
                if sequence.path != owner {
                    return Err(not_linked());
                }
                self.dangling.insert((EntityKind::Sequence, item));
            }
        }
        Ok(())
    }

    fn exists(&self, kind: EntityKind, id: EntityId) -> PersistenceResult<()> {
        let found = match kind {
            EntityKind::WorkOrder => self.work_orders.contains_key(&id),
            EntityKind::Project => self.projects.contains_key(&id),
            EntityKind::Component => self.components.contains_key(&id),
            EntityKind::Operation => self.operations.contains_key(&id),
            EntityKind::Path => self.paths.contains_key(&id),
            _ => self.record(EntityRef::new(kind, id)).is_some(),
        };
        if found {
            Ok(())
        } else {
            Err(PersistenceError::NotFound(EntityRef::new(kind, id)))
        }
    }

    fn project_mut(&mut self, id: EntityId) -> PersistenceResult<&mut ProjectRow> {
        self.projects
            .get_mut(&id)
            .ok_or(PersistenceError::NotFound(EntityRef::new(EntityKind::Project, id)))
    }

    fn component_mut(&mut self, id: EntityId) -> PersistenceResult<&mut ComponentRow> {
        self.components
            .get_mut(&id)
            .ok_or(PersistenceError::NotFound(EntityRef::new(EntityKind::Component, id)))
    }

    fn iwp_mut(&mut self, id: EntityId) -> PersistenceResult<&mut IntermediateWorkPieceRow> {
        self.intermediate_work_pieces.get_mut(&id).ok_or(PersistenceError::NotFound(
            EntityRef::new(EntityKind::IntermediateWorkPiece, id),
        ))
    }

    fn make_transient(&mut self, entity: EntityRef) -> PersistenceResult<()> {
        match entity.kind {
            EntityKind::Path => {
                self.paths
                    .remove(&entity.id)
                    .ok_or(PersistenceError::NotFound(entity))?;
                let owned: Vec<EntityId> = self
                    .sequences
                    .values()
                    .filter(|s| s.path == entity.id)
                    .map(|s| s.id)
                    .collect();
                for sequence in owned {
                    self.sequences.remove(&sequence);
                    self.dangling.remove(&(EntityKind::Sequence, sequence));
                }
            }
            EntityKind::Sequence => {
                self.sequences
                    .remove(&entity.id)
                    .ok_or(PersistenceError::NotFound(entity))?;
            }
            other => {
                return Err(PersistenceError::Backend(format!(
                    "deleting {other} entities is not supported"
                )))
            }
        }
        self.dangling.remove(&(entity.kind, entity.id));
        Ok(())
    }

    /// Deferred constraints, checked at commit.
    fn check_constraints(&self) -> PersistenceResult<()> {
        if let Some((kind, id)) = self.dangling.iter().next() {
            return Err(PersistenceError::Constraint(format!(
                "{kind} {id} was detached but not deleted"
            )));
        }
        let mut orders: HashMap<(EntityId, i32), EntityId> = HashMap::new();
        for sequence in self.sequences.values() {
            if let Some(other) = orders.insert((sequence.path, sequence.order), sequence.id) {
                return Err(PersistenceError::Constraint(format!(
                    "sequences {other} and {} share order {} in path {}",
                    sequence.id, sequence.order, sequence.path
                )));
            }
        }
        Ok(())
    }

    fn merge(
        &mut self,
        kind: EntityKind,
        source: EntityId,
        target: EntityId,
        policy: ConflictResolution,
    ) -> PersistenceResult<EntityRecord> {
        let source_ref = EntityRef::new(kind, source);
        let target_ref = EntityRef::new(kind, target);
        self.require(source_ref)?;
        self.require(target_ref)?;

        match kind {
            EntityKind::WorkOrder => self.merge_work_orders(source, target, policy),
            EntityKind::Project | EntityKind::Job => self.merge_projects(source, target, policy),
            EntityKind::Part => {
                let source_component = self.component_of_project(source).map(|c| c.id);
                let target_component = self.component_of_project(target).map(|c| c.id);
                if let (Some(from), Some(into)) = (source_component, target_component) {
                    self.merge_components(from, into, policy);
                }
                self.merge_projects(source, target, policy);
            }
            EntityKind::Component => self.merge_components(source, target, policy),
            EntityKind::IntermediateWorkPiece => self.merge_iwps(source, target, policy),
            EntityKind::SimpleOperation => {
                let source_iwp = self.iwp_of_operation(source).map(|iwp| iwp.id);
                let target_iwp = self.iwp_of_operation(target).map(|iwp| iwp.id);
                if let (Some(from), Some(into)) = (source_iwp, target_iwp) {
                    if let Some(iwp) = self.intermediate_work_pieces.get_mut(&from) {
                        iwp.operation = None;
                    }
                    self.merge_iwps(from, into, policy);
                }
                self.merge_operations(source, target, policy);
            }
            EntityKind::Operation => self.merge_operations(source, target, policy),
            EntityKind::Path | EntityKind::Sequence => {
                return Err(PersistenceError::Backend(format!("{kind} entities cannot be merged")))
            }
        }
        self.require(target_ref)
    }

    fn merge_work_orders(&mut self, source: EntityId, target: EntityId, policy: ConflictResolution) {
        for project in self.projects.values_mut() {
            if project.work_orders.remove(&source) {
                project.work_orders.insert(target);
            }
        }
        if let Some(from) = self.work_orders.remove(&source) {
            if let Some(into) = self.work_orders.get_mut(&target) {
                keep_or(policy, &mut into.name, from.name);
                keep_or(policy, &mut into.code, from.code);
                if into.status.is_none() || (policy == ConflictResolution::Overwrite && from.status.is_some()) {
                    into.status = from.status;
                }
            }
        }
    }

    fn merge_projects(&mut self, source: EntityId, target: EntityId, policy: ConflictResolution) {
        for component in self.components.values_mut() {
            if component.project == source {
                component.project = target;
            }
        }
        if let Some(from) = self.projects.remove(&source) {
            if let Some(into) = self.projects.get_mut(&target) {
                into.work_orders.extend(from.work_orders);
                keep_or(policy, &mut into.name, from.name);
                keep_or(policy, &mut into.code, from.code);
            }
        }
    }

    fn merge_components(&mut self, source: EntityId, target: EntityId, policy: ConflictResolution) {
        for iwp in self.intermediate_work_pieces.values_mut() {
            if iwp.components.remove(&source) {
                iwp.components.insert(target);
            }
        }
        if let Some(from) = self.components.remove(&source) {
            if let Some(into) = self.components.get_mut(&target) {
                keep_or(policy, &mut into.name, from.name);
                keep_or(policy, &mut into.code, from.code);
            }
        }
    }

    fn merge_iwps(&mut self, source: EntityId, target: EntityId, policy: ConflictResolution) {
        if let Some(from) = self.intermediate_work_pieces.remove(&source) {
            if let Some(into) = self.intermediate_work_pieces.get_mut(&target) {
                into.components.extend(from.components);
                into.next_operations.extend(from.next_operations);
                if into.operation.is_none() {
                    into.operation = from.operation;
                }
                keep_or(policy, &mut into.name, from.name);
                keep_or(policy, &mut into.code, from.code);
            }
        }
    }

    fn merge_operations(&mut self, source: EntityId, target: EntityId, policy: ConflictResolution) {
        for path in self.paths.values_mut() {
            if path.operation == source {
                path.operation = target;
            }
        }
        for iwp in self.intermediate_work_pieces.values_mut() {
            if iwp.operation == Some(source) {
                iwp.operation = Some(target);
            }
            if iwp.next_operations.remove(&source) {
                iwp.next_operations.insert(target);
            }
        }
        if let Some(from) = self.operations.remove(&source) {
            if let Some(into) = self.operations.get_mut(&target) {
                keep_or(policy, &mut into.name, from.name);
                keep_or(policy, &mut into.code, from.code);
            }
        }
    }
}

impl From<Dataset> for MemoryStore {
    fn from(dataset: Dataset) -> Self {
        let tables = Tables {
            work_orders: dataset.work_orders.into_iter().map(|r| (r.id, r)).collect(),
            projects: dataset.projects.into_iter().map(|r| (r.id, r)).collect(),
            components: dataset.components.into_iter().map(|r| (r.id, r)).collect(),
            intermediate_work_pieces: dataset
                .intermediate_work_pieces
                .into_iter()
                .map(|r| (r.id, r))
                .collect(),
            operations: dataset.operations.into_iter().map(|r| (r.id, r)).collect(),
            paths: dataset.paths.into_iter().map(|r| (r.id, r)).collect(),
            sequences: dataset.sequences.into_iter().map(|r| (r.id, r)).collect(),
            ..Tables::default()
        };
        Self {
            inner: Arc::new(Mutex::new(MemoryState {
                tables,
                ..MemoryState::default()
            })),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_session<T>(&self, f: impl FnOnce(&mut MemoryState) -> PersistenceResult<T>) -> PersistenceResult<T> {
        let mut state = self.state();
        if state.sessions == 0 {
            return Err(PersistenceError::NoSession);
        }
        f(&mut *state)
    }

    fn with_transaction<T>(&self, f: impl FnOnce(&mut Tables) -> PersistenceResult<T>) -> PersistenceResult<T> {
        self.with_session(|state| {
            if state.snapshot.is_none() {
                return Err(PersistenceError::NoTransaction);
            }
            f(&mut state.tables)
        })
    }

    /// Number of relation reads served so far.
    pub fn read_count(&self) -> usize {
        self.state().reads
    }

    pub fn commit_count(&self) -> usize {
        self.state().commits
    }

    pub fn sessions_opened(&self) -> usize {
        self.state().sessions_opened
    }

    /// True while any session or transaction is still open.
    pub fn has_open_scope(&self) -> bool {
        let state = self.state();
        state.sessions > 0 || state.snapshot.is_some()
    }

    pub fn updates(&self) -> Vec<UpdateRecord> {
        self.state().tables.updates.clone()
    }

    /// Current snapshot of an entity, outside any session.
    pub fn peek(&self, entity: EntityRef) -> Option<EntityRecord> {
        self.state().tables.record(entity)
    }

    /// Children of an entity, outside any session.
    pub fn peek_related(&self, entity: EntityRef, relation: Relation) -> Vec<EntityRecord> {
        self.state().tables.related(entity, relation)
    }

    /// Makes the next commit fail and roll back.
    pub fn fail_next_commit(&self) {
        self.state().fail_next_commit = true;
    }

    /// Removes an entity behind the engine's back, as a concurrent user would.
    pub fn delete_concurrently(&self, entity: EntityRef) {
        let mut state = self.state();
        let tables = &mut state.tables;
        let id = entity.id;
        match entity.kind {
            EntityKind::WorkOrder => {
                tables.work_orders.remove(&id);
                for project in tables.projects.values_mut() {
                    project.work_orders.remove(&id);
                }
            }
            EntityKind::Project | EntityKind::Job | EntityKind::Part => {
                tables.projects.remove(&id);
            }
            EntityKind::Component => {
                tables.components.remove(&id);
            }
            EntityKind::IntermediateWorkPiece => {
                tables.intermediate_work_pieces.remove(&id);
            }
            EntityKind::SimpleOperation | EntityKind::Operation => {
                tables.operations.remove(&id);
                for iwp in tables.intermediate_work_pieces.values_mut() {
                    if iwp.operation == Some(id) {
                        iwp.operation = None;
                    }
                }
            }
            EntityKind::Path => {
                tables.paths.remove(&id);
            }
            EntityKind::Sequence => {
                tables.sequences.remove(&id);
            }
        }
    }
}

impl Store for MemoryStore {
    fn begin_session(&mut self) -> PersistenceResult<()> {
        let mut state = self.state();
        state.sessions += 1;
        state.sessions_opened += 1;
        Ok(())
    }

    fn end_session(&mut self) {
        let mut state = self.state();
        state.sessions = state.sessions.saturating_sub(1);
    }

    fn begin_transaction(&mut self) -> PersistenceResult<()> {
        self.with_session(|state| {
            if state.snapshot.is_some() {
                return Err(PersistenceError::Backend("transaction already open".into()));
            }
            state.snapshot = Some(state.tables.clone());
            Ok(())
        })
    }

    #[instrument(level = "debug", skip(self))]
    fn commit(&mut self) -> PersistenceResult<()> {
        self.with_session(|state| {
            let snapshot = state.snapshot.take().ok_or(PersistenceError::NoTransaction)?;
            let outcome = if std::mem::take(&mut state.fail_next_commit) {
                Err(PersistenceError::Backend("commit rejected".into()))
            } else {
                state.tables.check_constraints()
            };
            match outcome {
                Ok(()) => {
                    state.commits += 1;
                    Ok(())
                }
                Err(e) => {
                    warn!("commit: rolling back: {}", e);
                    state.tables = snapshot;
                    Err(e)
                }
            }
        })
    }

    fn rollback(&mut self) {
        let mut state = self.state();
        if let Some(snapshot) = state.snapshot.take() {
            debug!("rollback");
            state.tables = snapshot;
        }
    }

    fn lock(&mut self, entity: EntityRef) -> PersistenceResult<()> {
        self.with_session(|state| state.tables.require(entity).map(|_| ()))
    }

    fn reload(&mut self, entity: EntityRef) -> PersistenceResult<EntityRecord> {
        self.with_session(|state| state.tables.require(entity))
    }

    fn find_by_id(&mut self, entity: EntityRef) -> PersistenceResult<Option<EntityRecord>> {
        self.with_session(|state| Ok(state.tables.record(entity)))
    }

    fn find_roots(&mut self, kind: EntityKind, filter: &RootFilter) -> PersistenceResult<Vec<EntityRecord>> {
        self.with_session(|state| {
            state.reads += 1;
            Ok(state.tables.roots(kind, filter))
        })
    }

    fn related(&mut self, entity: EntityRef, relation: Relation) -> PersistenceResult<Vec<EntityRecord>> {
        let (from, _) = relation.endpoints();
        if from != entity.kind {
            return Err(PersistenceError::InvalidRelation {
                relation,
                kind: entity.kind,
            });
        }
        self.with_session(|state| {
            state.reads += 1;
            state.tables.require(entity)?;
            Ok(state.tables.related(entity, relation))
        })
    }

    fn orphans(&mut self, kind: EntityKind) -> PersistenceResult<Vec<EntityRecord>> {
        self.with_session(|state| Ok(state.tables.orphans(kind)))
    }

    fn attach(&mut self, link: Link, owner: EntityId, item: EntityId) -> PersistenceResult<()> {
        self.with_transaction(|tables| tables.attach(link, owner, item))
    }

    fn detach(&mut self, link: Link, owner: EntityId, item: EntityId) -> PersistenceResult<()> {
        self.with_transaction(|tables| tables.detach(link, owner, item))
    }

    fn set_sequence_order(&mut self, sequence: EntityId, order: i32) -> PersistenceResult<()> {
        self.with_transaction(|tables| {
            let row = tables.sequences.get_mut(&sequence).ok_or(PersistenceError::NotFound(
                EntityRef::new(EntityKind::Sequence, sequence),
            ))?;
            row.order = order;
            Ok(())
        })
    }

    fn make_persistent(&mut self, update: UpdateRecord) -> PersistenceResult<()> {
        self.with_transaction(|tables| {
            tables.updates.push(update);
            Ok(())
        })
    }

    fn make_transient(&mut self, entity: EntityRef) -> PersistenceResult<()> {
        self.with_transaction(|tables| tables.make_transient(entity))
    }

    fn merge(
        &mut self,
        kind: EntityKind,
        source: EntityId,
        target: EntityId,
        policy: ConflictResolution,
    ) -> PersistenceResult<EntityRecord> {
        self.with_transaction(|tables| tables.merge(kind, source, target, policy))
    }
}

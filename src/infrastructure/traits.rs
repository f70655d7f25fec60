//! Persistence boundary traits
//!
//! The engine never touches storage directly: every read and write goes
//! through [`Store`], and orphaned entities are handed to an [`OrphanHolder`].
//! Both can be replaced with test doubles.

use thiserror::Error;

use crate::domain::{
    ConflictResolution, EntityId, EntityKind, EntityRecord, EntityRef, RootFilter, UpdateRecord,
};

/// Failures surfaced by the persistence layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("entity not found: {0}")]
    NotFound(EntityRef),

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("no open session")]
    NoSession,

    #[error("no open transaction")]
    NoTransaction,

    #[error("relation {relation:?} does not start at {kind}")]
    InvalidRelation { relation: Relation, kind: EntityKind },

    #[error("persistence backend failed: {0}")]
    Backend(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Navigable association between two entity kinds.
///
/// Downward relations feed the materializer, upward ones the branch locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    WorkOrderProjects,
    WorkOrderParts,
    JobComponents,
    ProjectComponents,
    ComponentIntermediateWorkPieces,
    ComponentSimpleOperations,
    PartIntermediateWorkPieces,
    PartSimpleOperations,
    IntermediateWorkPieceOperation,
    IntermediateWorkPieceNextOperations,
    OperationPaths,
    SimpleOperationPaths,
    PathSequences,

    ProjectWorkOrders,
    PartWorkOrders,
    ComponentProject,
    ComponentJob,
    IntermediateWorkPieceComponents,
    IntermediateWorkPieceParts,
    SimpleOperationComponents,
    SimpleOperationParts,
    OperationIntermediateWorkPieces,
    PathOperation,
    PathSimpleOperation,
    SequencePath,
    SequenceOperation,
    SequenceSimpleOperation,
}

impl Relation {
    /// `(from, to)` kinds of the relation.
    pub fn endpoints(self) -> (EntityKind, EntityKind) {
        use EntityKind::*;
        match self {
            Relation::WorkOrderProjects => (WorkOrder, Project),
            Relation::WorkOrderParts => (WorkOrder, Part),
            Relation::JobComponents => (Job, Component),
            Relation::ProjectComponents => (Project, Component),
            Relation::ComponentIntermediateWorkPieces => (Component, IntermediateWorkPiece),
            Relation::ComponentSimpleOperations => (Component, SimpleOperation),
            Relation::PartIntermediateWorkPieces => (Part, IntermediateWorkPiece),
            Relation::PartSimpleOperations => (Part, SimpleOperation),
            Relation::IntermediateWorkPieceOperation => (IntermediateWorkPiece, Operation),
            Relation::IntermediateWorkPieceNextOperations => (IntermediateWorkPiece, Operation),
            Relation::OperationPaths => (Operation, Path),
            Relation::SimpleOperationPaths => (SimpleOperation, Path),
            Relation::PathSequences => (Path, Sequence),
            Relation::ProjectWorkOrders => (Project, WorkOrder),
            Relation::PartWorkOrders => (Part, WorkOrder),
            Relation::ComponentProject => (Component, Project),
            Relation::ComponentJob => (Component, Job),
            Relation::IntermediateWorkPieceComponents => (IntermediateWorkPiece, Component),
            Relation::IntermediateWorkPieceParts => (IntermediateWorkPiece, Part),
            Relation::SimpleOperationComponents => (SimpleOperation, Component),
            Relation::SimpleOperationParts => (SimpleOperation, Part),
            Relation::OperationIntermediateWorkPieces => (Operation, IntermediateWorkPiece),
            Relation::PathOperation => (Path, Operation),
            Relation::PathSimpleOperation => (Path, SimpleOperation),
            Relation::SequencePath => (Sequence, Path),
            Relation::SequenceOperation => (Sequence, Operation),
            Relation::SequenceSimpleOperation => (Sequence, SimpleOperation),
        }
    }

    /// Relation listing the children of `parent` of kind `child`.
    ///
    /// Operation/SimpleOperation to Sequence has no direct relation: it goes
    /// through the first path.
    pub fn children(parent: EntityKind, child: EntityKind) -> Option<Relation> {
        use EntityKind::*;
        let relation = match (parent, child) {
            (WorkOrder, Project) => Relation::WorkOrderProjects,
            (WorkOrder, Part) => Relation::WorkOrderParts,
            (Job, Component) => Relation::JobComponents,
            (Project, Component) => Relation::ProjectComponents,
            (Component, IntermediateWorkPiece) => Relation::ComponentIntermediateWorkPieces,
            (Component, SimpleOperation) => Relation::ComponentSimpleOperations,
            (Part, IntermediateWorkPiece) => Relation::PartIntermediateWorkPieces,
            (Part, SimpleOperation) => Relation::PartSimpleOperations,
            (IntermediateWorkPiece, Operation) => Relation::IntermediateWorkPieceOperation,
            (Operation, Path) => Relation::OperationPaths,
            (SimpleOperation, Path) => Relation::SimpleOperationPaths,
            (Path, Sequence) => Relation::PathSequences,
            _ => return None,
        };
        Some(relation)
    }

    /// Relation listing the parents of `child` of kind `parent`.
    pub fn parents(child: EntityKind, parent: EntityKind) -> Option<Relation> {
        use EntityKind::*;
        let relation = match (child, parent) {
            (Project, WorkOrder) => Relation::ProjectWorkOrders,
            (Part, WorkOrder) => Relation::PartWorkOrders,
            (Component, Project) => Relation::ComponentProject,
            (Component, Job) => Relation::ComponentJob,
            (IntermediateWorkPiece, Component) => Relation::IntermediateWorkPieceComponents,
            (IntermediateWorkPiece, Part) => Relation::IntermediateWorkPieceParts,
            (SimpleOperation, Component) => Relation::SimpleOperationComponents,
            (SimpleOperation, Part) => Relation::SimpleOperationParts,
            (Operation, IntermediateWorkPiece) => Relation::OperationIntermediateWorkPieces,
            (Path, Operation) => Relation::PathOperation,
            (Path, SimpleOperation) => Relation::PathSimpleOperation,
            (Sequence, Path) => Relation::SequencePath,
            (Sequence, Operation) => Relation::SequenceOperation,
            (Sequence, SimpleOperation) => Relation::SequenceSimpleOperation,
            _ => return None,
        };
        Some(relation)
    }
}

/// Writable association, addressed by the ids of the underlying entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Link {
    /// work order (owner) ↔ project (item), many-to-many
    WorkOrderProject,
    /// project (owner) → component (item); `attach` re-points the component
    ProjectComponent,
    /// component (owner) ↔ intermediate work piece (item), via a join entity
    ComponentIntermediateWorkPiece,
    /// intermediate work piece (owner) → possible next operation (item)
    IntermediateWorkPieceNextOperation,
    /// operation (owner) → path (item)
    OperationPath,
    /// path (owner) → sequence (item)
    PathSequence,
}

/// Persistence layer as seen by the engine.
///
/// Reads need an open session, writes an open transaction. The engine wraps
/// both in scoped guards, so implementations may assume balanced calls.
pub trait Store: Send {
    fn begin_session(&mut self) -> PersistenceResult<()>;

    fn end_session(&mut self);

    fn begin_transaction(&mut self) -> PersistenceResult<()>;

    fn commit(&mut self) -> PersistenceResult<()>;

    fn rollback(&mut self);

    /// Re-attaches `entity` to the session before it is read or written.
    fn lock(&mut self, entity: EntityRef) -> PersistenceResult<()>;

    /// Fresh snapshot of `entity`; `NotFound` when it is gone.
    fn reload(&mut self, entity: EntityRef) -> PersistenceResult<EntityRecord>;

    fn find_by_id(&mut self, entity: EntityRef) -> PersistenceResult<Option<EntityRecord>>;

    /// Entities shown at level 0 for a root kind.
    fn find_roots(
        &mut self,
        kind: EntityKind,
        filter: &RootFilter,
    ) -> PersistenceResult<Vec<EntityRecord>>;

    fn related(
        &mut self,
        entity: EntityRef,
        relation: Relation,
    ) -> PersistenceResult<Vec<EntityRecord>>;

    /// Entities of `kind` without any parent.
    fn orphans(&mut self, kind: EntityKind) -> PersistenceResult<Vec<EntityRecord>>;

    fn attach(&mut self, link: Link, owner: EntityId, item: EntityId) -> PersistenceResult<()>;

    /// Removes an association. Detaching an owned item (path, sequence) leaves
    /// it dangling until `make_transient`; `ProjectComponent` cannot be detached.
    /// A missing next-operation link is not an error.
    fn detach(&mut self, link: Link, owner: EntityId, item: EntityId) -> PersistenceResult<()>;

    /// Order uniqueness within a path is checked at commit.
    fn set_sequence_order(&mut self, sequence: EntityId, order: i32) -> PersistenceResult<()>;

    fn make_persistent(&mut self, update: UpdateRecord) -> PersistenceResult<()>;

    fn make_transient(&mut self, entity: EntityRef) -> PersistenceResult<()>;

    /// Folds `source` into `target` and returns the surviving entity.
    fn merge(
        &mut self,
        kind: EntityKind,
        source: EntityId,
        target: EntityId,
        policy: ConflictResolution,
    ) -> PersistenceResult<EntityRecord>;
}

/// Holding area for entities that lost their last parent.
pub trait OrphanHolder: Send {
    fn insert_node(&mut self, entity: &EntityRecord);

    fn remove_node(&mut self, entity: &EntityRecord);

    /// Selects every orphan registered under `(kind, key)`, returns the count.
    fn focus_all_instances(&mut self, kind: EntityKind, key: EntityId) -> usize;

    /// Orphans currently held, for display.
    fn entries(&self) -> Vec<EntityRecord> {
        Vec::new()
    }
}

//! Domain entities: the work-breakdown hierarchy as seen by the tree

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Identifier of a persisted entity.
pub type EntityId = i64;

/// Entity types that may occupy a tree level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    WorkOrder,
    Project,
    Job,
    Component,
    Part,
    IntermediateWorkPiece,
    SimpleOperation,
    Operation,
    Path,
    Sequence,
}

impl EntityKind {
    pub const ALL: [EntityKind; 10] = [
        EntityKind::WorkOrder,
        EntityKind::Project,
        EntityKind::Job,
        EntityKind::Component,
        EntityKind::Part,
        EntityKind::IntermediateWorkPiece,
        EntityKind::SimpleOperation,
        EntityKind::Operation,
        EntityKind::Path,
        EntityKind::Sequence,
    ];

    /// Stable lowercase identifier, also accepted by `from_str`.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::WorkOrder => "work_order",
            EntityKind::Project => "project",
            EntityKind::Job => "job",
            EntityKind::Component => "component",
            EntityKind::Part => "part",
            EntityKind::IntermediateWorkPiece => "intermediate_work_piece",
            EntityKind::SimpleOperation => "simple_operation",
            EntityKind::Operation => "operation",
            EntityKind::Path => "path",
            EntityKind::Sequence => "sequence",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "iwp" => return Ok(EntityKind::IntermediateWorkPiece),
            "wo" => return Ok(EntityKind::WorkOrder),
            _ => {}
        }
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized || kind.as_str().replace('_', "") == normalized)
            .ok_or_else(|| DomainError::UnknownKind(s.to_string()))
    }
}

/// Typed handle on a persisted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: EntityId) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// Snapshot of an entity as loaded from the store.
///
/// `id` is the entity's own identity. `key` is the addressable key under which
/// the entity appears as a tree node: it equals `id` for every kind except
/// Part (keyed by its component) and SimpleOperation (keyed by its
/// intermediate work piece).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub kind: EntityKind,
    pub id: EntityId,
    pub key: EntityId,
    pub display: String,
    pub code: Option<String>,
    pub name: Option<String>,
    /// Sequence order
    pub order: Option<i32>,
    /// Path number
    pub number: Option<i32>,
    pub archived: bool,
    /// Work order status
    pub status: Option<i64>,
}

impl EntityRecord {
    pub fn new(kind: EntityKind, id: EntityId, display: impl Into<String>) -> Self {
        Self {
            kind,
            id,
            key: id,
            display: display.into(),
            code: None,
            name: None,
            order: None,
            number: None,
            archived: false,
            status: None,
        }
    }

    pub fn with_key(mut self, key: EntityId) -> Self {
        self.key = key;
        self
    }

    pub fn with_code(mut self, code: Option<String>) -> Self {
        self.code = code;
        self
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_number(mut self, number: i32) -> Self {
        self.number = Some(number);
        self
    }

    pub fn with_archived(mut self, archived: bool) -> Self {
        self.archived = archived;
        self
    }

    pub fn with_status(mut self, status: Option<i64>) -> Self {
        self.status = status;
        self
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind, self.id)
    }

    /// Name of the tree node representing this entity.
    pub fn node_name(&self) -> String {
        self.key.to_string()
    }
}

impl fmt::Display for EntityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

/// How `merge` settles scalar fields set on both entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictResolution {
    /// Target keeps its own value
    #[default]
    Keep,
    /// Source value replaces the target's
    Overwrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModificationKind {
    New,
    Delete,
}

/// Audit record written alongside every structural change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateRecord {
    WorkOrderProject {
        work_order: EntityId,
        project: EntityId,
        modification: ModificationKind,
        at: DateTime<Utc>,
    },
    ProjectComponent {
        component: EntityId,
        former_project: EntityId,
        new_project: EntityId,
        at: DateTime<Utc>,
    },
    ComponentIntermediateWorkPiece {
        component: EntityId,
        intermediate_work_piece: EntityId,
        modification: ModificationKind,
        at: DateTime<Utc>,
    },
    IntermediateWorkPieceOperation {
        intermediate_work_piece: EntityId,
        former_operation: Option<EntityId>,
        new_operation: Option<EntityId>,
        at: DateTime<Utc>,
    },
}

impl UpdateRecord {
    pub fn work_order_project(
        work_order: EntityId,
        project: EntityId,
        modification: ModificationKind,
    ) -> Self {
        Self::WorkOrderProject {
            work_order,
            project,
            modification,
            at: Utc::now(),
        }
    }

    pub fn project_component(
        component: EntityId,
        former_project: EntityId,
        new_project: EntityId,
    ) -> Self {
        Self::ProjectComponent {
            component,
            former_project,
            new_project,
            at: Utc::now(),
        }
    }

    pub fn component_intermediate_work_piece(
        component: EntityId,
        intermediate_work_piece: EntityId,
        modification: ModificationKind,
    ) -> Self {
        Self::ComponentIntermediateWorkPiece {
            component,
            intermediate_work_piece,
            modification,
            at: Utc::now(),
        }
    }

    pub fn intermediate_work_piece_operation(
        intermediate_work_piece: EntityId,
        former_operation: Option<EntityId>,
        new_operation: Option<EntityId>,
    ) -> Self {
        Self::IntermediateWorkPieceOperation {
            intermediate_work_piece,
            former_operation,
            new_operation,
            at: Utc::now(),
        }
    }

    pub fn modification(&self) -> Option<ModificationKind> {
        match self {
            UpdateRecord::WorkOrderProject { modification, .. }
            | UpdateRecord::ComponentIntermediateWorkPiece { modification, .. } => {
                Some(*modification)
            }
            UpdateRecord::ProjectComponent { .. }
            | UpdateRecord::IntermediateWorkPieceOperation { .. } => None,
        }
    }
}

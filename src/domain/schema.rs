//! Level layout of the tree, derived from the hierarchy switches

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, EntityKind, EntityRecord};

/// Switches deciding which entity type occupies each level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyFlags {
    /// A work order and its project form a single Job
    pub work_order_project_is_job: bool,
    /// Parts are shown as roots (needs `project_component_is_part`)
    pub part_at_the_top: bool,
    /// A project and its component form a single Part
    pub project_component_is_part: bool,
    /// An intermediate work piece and its operation form a single SimpleOperation
    pub intermediate_work_piece_operation_is_simple_operation: bool,
    /// Every operation has exactly one path, sequences hang off the operation
    pub single_path: bool,
}

impl HierarchyFlags {
    /// All 32 flag combinations.
    pub fn all_combinations() -> impl Iterator<Item = HierarchyFlags> {
        (0u8..32).map(|bits| HierarchyFlags {
            work_order_project_is_job: bits & 1 != 0,
            part_at_the_top: bits & 2 != 0,
            project_component_is_part: bits & 4 != 0,
            intermediate_work_piece_operation_is_simple_operation: bits & 8 != 0,
            single_path: bits & 16 != 0,
        })
    }
}

/// Ordered entity types, one per tree level (0 = root).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchySchema {
    levels: Vec<EntityKind>,
    single_path: bool,
}

impl HierarchySchema {
    pub fn resolve(flags: HierarchyFlags) -> Self {
        let mut levels = Vec::with_capacity(7);

        if flags.work_order_project_is_job {
            levels.extend([EntityKind::Job, EntityKind::Component]);
        } else if flags.part_at_the_top && flags.project_component_is_part {
            levels.push(EntityKind::Part);
        } else {
            levels.push(EntityKind::WorkOrder);
            if flags.project_component_is_part {
                levels.push(EntityKind::Part);
            } else {
                levels.extend([EntityKind::Project, EntityKind::Component]);
            }
        }

        if flags.intermediate_work_piece_operation_is_simple_operation {
            levels.push(EntityKind::SimpleOperation);
        } else {
            levels.extend([EntityKind::IntermediateWorkPiece, EntityKind::Operation]);
        }

        if flags.single_path {
            levels.push(EntityKind::Sequence);
        } else {
            levels.extend([EntityKind::Path, EntityKind::Sequence]);
        }

        Self {
            levels,
            single_path: flags.single_path,
        }
    }

    pub fn levels(&self) -> &[EntityKind] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn single_path(&self) -> bool {
        self.single_path
    }

    pub fn root_kind(&self) -> EntityKind {
        self.levels[0]
    }

    pub fn contains(&self, kind: EntityKind) -> bool {
        self.levels.contains(&kind)
    }

    pub fn level_of(&self, kind: EntityKind) -> Option<usize> {
        self.levels.iter().position(|&k| k == kind)
    }

    /// Like `level_of`, for callers that cannot proceed without a level.
    pub fn require_level(&self, kind: EntityKind) -> Result<usize, DomainError> {
        self.level_of(kind).ok_or(DomainError::KindNotInSchema(kind))
    }

    pub fn kind_at(&self, level: usize) -> Option<EntityKind> {
        self.levels.get(level).copied()
    }

    pub fn child_of(&self, kind: EntityKind) -> Option<EntityKind> {
        self.level_of(kind).and_then(|level| self.kind_at(level + 1))
    }

    pub fn parent_of(&self, kind: EntityKind) -> Option<EntityKind> {
        self.level_of(kind)
            .and_then(|level| level.checked_sub(1))
            .and_then(|level| self.kind_at(level))
    }

    pub fn filter_support(&self) -> FilterSupport {
        FilterSupport {
            work_order_status: true,
            project_archived: true,
            operation_archived: self.root_kind() == EntityKind::Part,
        }
    }
}

impl fmt::Display for HierarchySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.levels.iter().join(" > "))
    }
}

/// Which root filters have an effect under a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterSupport {
    pub work_order_status: bool,
    pub project_archived: bool,
    pub operation_archived: bool,
}

/// Restrictions applied when the roots and their first tier are loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootFilter {
    /// Only work orders (or jobs) with this status
    pub work_order_status: Option<i64>,
    /// `Some(true)` keeps only archived projects and parts, `Some(false)` only active ones
    pub project_archived: Option<bool>,
    /// Same for work pieces, by the archived flag of their operation
    pub operation_archived: Option<bool>,
}

impl RootFilter {
    pub fn admits_status(&self, status: Option<i64>) -> bool {
        match self.work_order_status {
            Some(wanted) => status == Some(wanted),
            None => true,
        }
    }

    pub fn admits_project(&self, archived: bool) -> bool {
        self.project_archived.map_or(true, |wanted| archived == wanted)
    }

    pub fn admits_operation(&self, archived: bool) -> bool {
        self.operation_archived.map_or(true, |wanted| archived == wanted)
    }

    /// Filter for first-tier children of a root.
    pub fn admits_child(&self, record: &EntityRecord) -> bool {
        match record.kind {
            EntityKind::Project | EntityKind::Part | EntityKind::Job => {
                self.admits_project(record.archived)
            }
            EntityKind::IntermediateWorkPiece
            | EntityKind::SimpleOperation
            | EntityKind::Operation => self.admits_operation(record.archived),
            _ => true,
        }
    }

    /// Drops settings the schema gives no meaning to.
    pub fn restricted_to(&self, support: FilterSupport) -> RootFilter {
        RootFilter {
            work_order_status: self.work_order_status.filter(|_| support.work_order_status),
            project_archived: self.project_archived.filter(|_| support.project_archived),
            operation_archived: self.operation_archived.filter(|_| support.operation_archived),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::defaults(HierarchyFlags::default(), vec![
        EntityKind::WorkOrder, EntityKind::Project, EntityKind::Component,
        EntityKind::IntermediateWorkPiece, EntityKind::Operation, EntityKind::Path, EntityKind::Sequence,
    ])]
    #[case::job(HierarchyFlags { work_order_project_is_job: true, ..Default::default() }, vec![
        EntityKind::Job, EntityKind::Component,
        EntityKind::IntermediateWorkPiece, EntityKind::Operation, EntityKind::Path, EntityKind::Sequence,
    ])]
    #[case::part_at_top(HierarchyFlags {
        part_at_the_top: true,
        project_component_is_part: true,
        intermediate_work_piece_operation_is_simple_operation: true,
        single_path: true,
        ..Default::default()
    }, vec![EntityKind::Part, EntityKind::SimpleOperation, EntityKind::Sequence])]
    #[case::part_under_work_order(HierarchyFlags {
        project_component_is_part: true,
        single_path: true,
        ..Default::default()
    }, vec![
        EntityKind::WorkOrder, EntityKind::Part,
        EntityKind::IntermediateWorkPiece, EntityKind::Operation, EntityKind::Sequence,
    ])]
    fn given_flags_when_resolving_then_levels_match(
        #[case] flags: HierarchyFlags,
        #[case] expected: Vec<EntityKind>,
    ) {
        assert_eq!(HierarchySchema::resolve(flags).levels(), expected.as_slice());
    }

    #[test]
    fn given_part_at_top_without_part_flag_when_resolving_then_work_order_is_root() {
        let schema = HierarchySchema::resolve(HierarchyFlags {
            part_at_the_top: true,
            ..Default::default()
        });
        assert_eq!(schema.root_kind(), EntityKind::WorkOrder);
    }

    #[test]
    fn given_schema_when_querying_neighbours_then_edges_are_absent() {
        let schema = HierarchySchema::resolve(HierarchyFlags::default());
        assert_eq!(schema.parent_of(EntityKind::WorkOrder), None);
        assert_eq!(schema.child_of(EntityKind::Sequence), None);
        assert_eq!(schema.child_of(EntityKind::Operation), Some(EntityKind::Path));
        assert_eq!(schema.level_of(EntityKind::Job), None);
        assert!(schema.require_level(EntityKind::Part).is_err());
    }

    #[test]
    fn given_filter_when_schema_has_no_operation_tier_then_operation_filter_dropped() {
        let schema = HierarchySchema::resolve(HierarchyFlags::default());
        let filter = RootFilter {
            work_order_status: Some(2),
            project_archived: Some(true),
            operation_archived: Some(false),
        };

        let restricted = filter.restricted_to(schema.filter_support());

        assert_eq!(restricted.work_order_status, Some(2));
        assert_eq!(restricted.project_archived, Some(true));
        assert_eq!(restricted.operation_archived, None);
    }
}

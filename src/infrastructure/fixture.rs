//! TOML datasets for the in-memory store
//!
//! ```toml
//! [[work_orders]]
//! id = 1
//! name = "WO-2024-001"
//! status = 1
//!
//! [[projects]]
//! id = 10
//! name = "Gearbox"
//! work_orders = [1]
//!
//! [[components]]
//! id = 100
//! name = "Housing"
//! project = 10
//! ```

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::EntityId;
use crate::infrastructure::{InfraError, InfraResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrderRow {
    pub id: EntityId,
    pub name: Option<String>,
    pub code: Option<String>,
    pub status: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRow {
    pub id: EntityId,
    pub name: Option<String>,
    pub code: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub work_orders: BTreeSet<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRow {
    pub id: EntityId,
    pub name: Option<String>,
    pub code: Option<String>,
    pub project: EntityId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntermediateWorkPieceRow {
    pub id: EntityId,
    pub name: Option<String>,
    pub code: Option<String>,
    pub operation: Option<EntityId>,
    /// Components using this work piece (join entities)
    #[serde(default)]
    pub components: BTreeSet<EntityId>,
    #[serde(default)]
    pub next_operations: BTreeSet<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRow {
    pub id: EntityId,
    pub name: Option<String>,
    pub code: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRow {
    pub id: EntityId,
    pub operation: EntityId,
    pub number: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRow {
    pub id: EntityId,
    pub path: EntityId,
    pub order: i32,
    pub name: Option<String>,
}

/// Complete entity graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub work_orders: Vec<WorkOrderRow>,
    pub projects: Vec<ProjectRow>,
    pub components: Vec<ComponentRow>,
    pub intermediate_work_pieces: Vec<IntermediateWorkPieceRow>,
    pub operations: Vec<OperationRow>,
    pub paths: Vec<PathRow>,
    pub sequences: Vec<SequenceRow>,
}

impl Dataset {
    pub fn from_toml(content: &str) -> InfraResult<Self> {
        let dataset: Dataset = toml::from_str(content).map_err(|e| InfraError::Fixture {
            message: e.to_string(),
        })?;
        dataset.validate()?;
        Ok(dataset)
    }

    #[instrument(level = "debug")]
    pub fn load(path: &Path) -> InfraResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| InfraError::io(format!("read dataset {}", path.display()), e))?;
        let dataset = Self::from_toml(&content).map_err(|e| match e {
            InfraError::Fixture { message } => InfraError::Fixture {
                message: format!("{}: {}", path.display(), message),
            },
            other => other,
        })?;
        debug!(
            "load: work_orders={} projects={} components={}",
            dataset.work_orders.len(),
            dataset.projects.len(),
            dataset.components.len()
        );
        Ok(dataset)
    }

    /// Checks that every reference points at an existing row.
    pub fn validate(&self) -> InfraResult<()> {
        fn ids<T>(rows: &[T], id: impl Fn(&T) -> EntityId) -> HashSet<EntityId> {
            rows.iter().map(id).collect()
        }
        fn missing(what: &str, owner: EntityId, target: &str, id: EntityId) -> InfraError {
            InfraError::Fixture {
                message: format!("{what} {owner} references unknown {target} {id}"),
            }
        }

        let work_orders = ids(&self.work_orders, |r| r.id);
        let projects = ids(&self.projects, |r| r.id);
        let components = ids(&self.components, |r| r.id);
        let operations = ids(&self.operations, |r| r.id);
        let paths = ids(&self.paths, |r| r.id);

        for project in &self.projects {
            if let Some(&wo) = project.work_orders.iter().find(|wo| !work_orders.contains(wo)) {
                return Err(missing("project", project.id, "work order", wo));
            }
        }
        for component in &self.components {
            if !projects.contains(&component.project) {
                return Err(missing("component", component.id, "project", component.project));
            }
        }
        for iwp in &self.intermediate_work_pieces {
            if let Some(&c) = iwp.components.iter().find(|c| !components.contains(c)) {
                return Err(missing("intermediate work piece", iwp.id, "component", c));
            }
            if let Some(op) = iwp.operation.filter(|op| !operations.contains(op)) {
                return Err(missing("intermediate work piece", iwp.id, "operation", op));
            }
            if let Some(&op) = iwp.next_operations.iter().find(|op| !operations.contains(op)) {
                return Err(missing("intermediate work piece", iwp.id, "operation", op));
            }
        }
        for path in &self.paths {
            if !operations.contains(&path.operation) {
                return Err(missing("path", path.id, "operation", path.operation));
            }
        }
        for sequence in &self.sequences {
            if !paths.contains(&sequence.path) {
                return Err(missing("sequence", sequence.id, "path", sequence.path));
            }
        }
        Ok(())
    }

    /// Checks that every project can be shown as a single part.
    ///
    /// A part is a project together with its component, so a project with
    /// several components has no unique part key.
    pub fn validate_parts(&self) -> InfraResult<()> {
        let crowded = self
            .components
            .iter()
            .counts_by(|c| c.project)
            .into_iter()
            .filter(|&(_, count)| count > 1)
            .min();
        match crowded {
            Some((project, count)) => Err(InfraError::Fixture {
                message: format!("project {project} has {count} components, a part needs exactly one"),
            }),
            None => Ok(()),
        }
    }

    // Builders, mostly for tests

    pub fn work_order(mut self, id: EntityId, name: &str, status: Option<i64>) -> Self {
        self.work_orders.push(WorkOrderRow {
            id,
            name: Some(name.to_string()),
            code: None,
            status,
        });
        self
    }

    pub fn project(mut self, id: EntityId, name: &str, work_orders: &[EntityId]) -> Self {
        self.projects.push(ProjectRow {
            id,
            name: Some(name.to_string()),
            code: None,
            archived: false,
            work_orders: work_orders.iter().copied().collect(),
        });
        self
    }

    pub fn component(mut self, id: EntityId, name: &str, project: EntityId) -> Self {
        self.components.push(ComponentRow {
            id,
            name: Some(name.to_string()),
            code: None,
            project,
        });
        self
    }

    pub fn intermediate_work_piece(
        mut self,
        id: EntityId,
        name: &str,
        operation: Option<EntityId>,
        components: &[EntityId],
    ) -> Self {
        self.intermediate_work_pieces.push(IntermediateWorkPieceRow {
            id,
            name: Some(name.to_string()),
            code: None,
            operation,
            components: components.iter().copied().collect(),
            next_operations: BTreeSet::new(),
        });
        self
    }

    pub fn operation(mut self, id: EntityId, name: &str) -> Self {
        self.operations.push(OperationRow {
            id,
            name: Some(name.to_string()),
            code: None,
            archived: false,
        });
        self
    }

    pub fn path(mut self, id: EntityId, operation: EntityId, number: i32) -> Self {
        self.paths.push(PathRow {
            id,
            operation,
            number,
        });
        self
    }

    pub fn sequence(mut self, id: EntityId, path: EntityId, order: i32, name: &str) -> Self {
        self.sequences.push(SequenceRow {
            id,
            path,
            order,
            name: Some(name.to_string()),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_valid_toml_when_parsing_then_rows_are_loaded() {
        let content = r#"
[[work_orders]]
id = 1
name = "WO-1"
status = 2

[[projects]]
id = 10
name = "Gearbox"
work_orders = [1]

[[components]]
id = 100
name = "Housing"
project = 10
"#;
        let dataset = Dataset::from_toml(content).unwrap();

        assert_eq!(dataset.work_orders[0].status, Some(2));
        assert!(dataset.projects[0].work_orders.contains(&1));
        assert_eq!(dataset.components[0].project, 10);
    }

    #[test]
    fn given_dangling_reference_when_validating_then_fails() {
        let dataset = Dataset::default().component(100, "Housing", 99);

        let result = dataset.validate();

        assert!(matches!(result, Err(InfraError::Fixture { message }) if message.contains("project 99")));
    }

    #[test]
    fn given_project_with_two_components_when_validating_parts_then_fails() {
        let dataset = Dataset::default()
            .project(10, "Gearbox", &[])
            .project(11, "Pump", &[])
            .component(100, "Housing", 10)
            .component(101, "Shaft", 10)
            .component(110, "Impeller", 11);

        let result = dataset.validate_parts();

        assert!(matches!(result, Err(InfraError::Fixture { message }) if message.contains("project 10 has 2")));
        assert!(Dataset::default().component(110, "Impeller", 11).validate_parts().is_ok());
    }
}

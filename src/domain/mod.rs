//! Domain layer: entities, hierarchy schema and the live tree
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod entities;
pub mod error;
pub mod ordering;
pub mod schema;

pub use arena::{NodeId, NodeKey, TreeArena, TreeNode};
pub use entities::*;
pub use error::DomainError;
pub use ordering::compare_records;
pub use schema::{FilterSupport, HierarchyFlags, HierarchySchema, RootFilter};

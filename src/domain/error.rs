//! Domain-level errors (no external dependencies)

use generational_arena::Index;
use thiserror::Error;

use crate::domain::EntityKind;

/// Domain errors represent violations of the tree model itself.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("entity kind not part of the configured hierarchy: {0}")]
    KindNotInSchema(EntityKind),

    #[error("tree node no longer exists: {0:?}")]
    NodeNotFound(Index),

    #[error("unknown entity kind: {0}")]
    UnknownKind(String),
}

//! Application-level errors (wraps domain errors)

use thiserror::Error;

use crate::domain::{DomainError, EntityKind, EntityRef};
use crate::infrastructure::traits::PersistenceError;

/// Application errors wrap domain errors and report failed tree operations.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("{target} already contains {kind} {key}")]
    DuplicateChild {
        target: EntityRef,
        kind: EntityKind,
        key: String,
    },

    #[error("{target} already contains a {kind} with the same {field}: {value}")]
    ConflictingName {
        target: EntityRef,
        kind: EntityKind,
        field: &'static str,
        value: String,
    },

    #[error("unsupported relation: {operation} {drag} onto {drop}")]
    UnsupportedRelation {
        operation: &'static str,
        drag: EntityKind,
        drop: EntityKind,
    },

    #[error("entity no longer exists: {0}")]
    StaleReference(EntityRef),

    #[error("persistence failed: {context}")]
    Persistence {
        context: String,
        #[source]
        source: PersistenceError,
    },

    #[error("config error: {message}")]
    Config { message: String },
}

impl ApplicationError {
    pub fn unsupported(operation: &'static str, drag: EntityKind, drop: EntityKind) -> Self {
        Self::UnsupportedRelation {
            operation,
            drag,
            drop,
        }
    }
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;

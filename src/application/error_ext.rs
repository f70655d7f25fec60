//! Error conversion helpers for persistence calls
//!
//! Provides an extension trait that attaches the failing step to a
//! persistence error.

use crate::application::{ApplicationError, ApplicationResult};
use crate::infrastructure::traits::{PersistenceError, PersistenceResult};

/// Extension trait for converting `PersistenceResult` to `ApplicationResult` with context.
pub trait PersistenceResultExt<T> {
    /// Add context to a persistence error. A missing entity becomes
    /// [`ApplicationError::StaleReference`].
    ///
    /// # Example
    /// ```ignore
    /// store.lock(entity).with_context("lock drop target")?;
    /// ```
    fn with_context(self, context: &str) -> ApplicationResult<T>;
}

impl<T> PersistenceResultExt<T> for PersistenceResult<T> {
    fn with_context(self, context: &str) -> ApplicationResult<T> {
        self.map_err(|e| match e {
            PersistenceError::NotFound(entity) => ApplicationError::StaleReference(entity),
            other => ApplicationError::Persistence {
                context: context.to_string(),
                source: other,
            },
        })
    }
}

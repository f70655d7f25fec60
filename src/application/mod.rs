//! Application layer: the tree engine and its services
//!
//! This layer drives the live tree and reaches storage only through the
//! boundary traits in `infrastructure::traits`.

pub mod engine;
pub mod error;
pub mod error_ext;
pub mod orphans;
pub mod services;
pub mod session;

pub use engine::TreeEngine;
pub use error::{ApplicationError, ApplicationResult};
pub use error_ext::PersistenceResultExt;
pub use orphans::OrphanedItems;
pub use session::{ScopedSession, ScopedTransaction};

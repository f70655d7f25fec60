//! Infrastructure layer: persistence boundary, in-memory store and DI container
//!
//! This layer implements the boundary traits and wires up the engine.

pub mod di;
pub mod error;
pub mod fixture;
pub mod memory;
pub mod traits;

pub use error::{InfraError, InfraResult};

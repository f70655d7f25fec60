//! Engine services
//!
//! Each module adds one group of operations to [`TreeEngine`](crate::application::TreeEngine):
//! lazy materialization, branch location and structural edits.

pub mod editor;
pub mod locator;
pub mod materializer;

pub use editor::{DropEffect, EditOutcome};
pub use locator::{Branch, BranchStep};
pub use materializer::{MaterializeWarning, Populated};

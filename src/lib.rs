//! Lazily materialized, hierarchical view of a manufacturing work breakdown
//!
//! Layers, innermost first:
//! - [`domain`]: entity kinds, hierarchy schema, the live tree arena
//! - [`infrastructure`]: store contract, in-memory store, dataset fixtures
//! - [`application`]: the [`application::TreeEngine`] and its services
//! - [`cli`]: command line front end

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;

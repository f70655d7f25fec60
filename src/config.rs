//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/jobtree/jobtree.toml`
//! 3. Local config: `<dir>/.jobtree.toml`
//! 4. Environment variables: `JOBTREE_*` prefix, `__` between sections
//!
//! The hierarchy switches are read once, when the engine is built.

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::HierarchyFlags;

/// Hierarchy switches as read from one layer; `None` means "not specified".
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawHierarchy {
    pub work_order_project_is_job: Option<bool>,
    pub part_at_the_top: Option<bool>,
    pub project_component_is_part: Option<bool>,
    pub intermediate_work_piece_operation_is_simple_operation: Option<bool>,
    pub single_path: Option<bool>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub show_orphans: Option<bool>,
    pub data_file: Option<PathBuf>,
    pub hierarchy: RawHierarchy,
}

/// Unified configuration for jobtree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Keep parentless entities in the orphan holder
    pub show_orphans: bool,
    /// TOML dataset loaded into the in-memory store
    pub data_file: Option<PathBuf>,
    /// Which entity type sits on which level
    pub hierarchy: HierarchyFlags,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_orphans: true,
            data_file: None,
            hierarchy: HierarchyFlags::default(),
        }
    }
}

/// Get the XDG config directory for jobtree.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "jobtree").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("jobtree.toml"))
}

/// Get the path to the local config file in a working directory.
pub fn local_config_path(dir: &Path) -> PathBuf {
    dir.join(".jobtree.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl HierarchyFlags {
    fn merge_with(&self, overlay: &RawHierarchy) -> Self {
        Self {
            work_order_project_is_job: overlay
                .work_order_project_is_job
                .unwrap_or(self.work_order_project_is_job),
            part_at_the_top: overlay.part_at_the_top.unwrap_or(self.part_at_the_top),
            project_component_is_part: overlay
                .project_component_is_part
                .unwrap_or(self.project_component_is_part),
            intermediate_work_piece_operation_is_simple_operation: overlay
                .intermediate_work_piece_operation_is_simple_operation
                .unwrap_or(self.intermediate_work_piece_operation_is_simple_operation),
            single_path: overlay.single_path.unwrap_or(self.single_path),
        }
    }
}

impl Settings {
    /// Expand `~` and `$VAR` in the data file path.
    fn expand_paths(&mut self) {
        if let Some(path) = &self.data_file {
            let raw = path.to_string_lossy();
            let expanded = shellexpand::full(raw.as_ref())
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| shellexpand::tilde(raw.as_ref()).into_owned());
            self.data_file = Some(PathBuf::from(expanded));
        }
    }

    /// Overlay values win where specified.
    ///
    /// A relative `data_file` is taken relative to `base`, the directory of
    /// the file the overlay came from.
    fn merge_with(&self, overlay: &RawSettings, base: Option<&Path>) -> Self {
        let data_file = overlay.data_file.as_ref().map(|path| match base {
            Some(base) if path.is_relative() && !path.starts_with("~") => base.join(path),
            _ => path.clone(),
        });
        Self {
            hierarchy: self.hierarchy.merge_with(&overlay.hierarchy),
            show_orphans: overlay.show_orphans.unwrap_or(self.show_orphans),
            data_file: data_file.or_else(|| self.data_file.clone()),
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `dir` - Optional working directory holding a `.jobtree.toml`
    pub fn load(dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                let raw = load_raw_settings(&global_path)?;
                current = current.merge_with(&raw, global_path.parent());
            }
        }

        if let Some(dir) = dir {
            let local_path = local_config_path(dir);
            if local_path.exists() {
                let raw = load_raw_settings(&local_path)?;
                current = current.merge_with(&raw, Some(dir));
            }
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths();

        Ok(current)
    }

    /// Apply JOBTREE_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(Environment::with_prefix("JOBTREE")
                    .prefix_separator("_")
                    .separator("__"),)
            .build()
            .map_err(config_err)?;

        let flag = |key: &str| config.get_bool(&format!("hierarchy.{key}")).ok();
        let overlay = RawSettings {
            hierarchy: RawHierarchy {
                work_order_project_is_job: flag("work_order_project_is_job"),
                part_at_the_top: flag("part_at_the_top"),
                project_component_is_part: flag("project_component_is_part"),
                intermediate_work_piece_operation_is_simple_operation: flag(
                    "intermediate_work_piece_operation_is_simple_operation",
                ),
                single_path: flag("single_path"),
            },
            show_orphans: config.get_bool("show_orphans").ok(),
            data_file: config.get_string("data_file").ok().map(PathBuf::from),
        };
        settings = settings.merge_with(&overlay, None);

        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# jobtree configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/jobtree/jobtree.toml
#   Local:  <dir>/.jobtree.toml
#   Env:    JOBTREE_* environment variables, e.g. JOBTREE_HIERARCHY__SINGLE_PATH=true

# Dataset to browse (relative paths are resolved against the config file)
# data_file = "plant.toml"

# Collect entities that lost their last parent
# show_orphans = true

[hierarchy]
# Work order and project form a single Job:      Job > Component > ...
# work_order_project_is_job = false

# Show parts as roots (needs project_component_is_part)
# part_at_the_top = false

# Project and component form a single Part:      WorkOrder > Part > ...
# project_component_is_part = false

# Work piece and operation form a SimpleOperation
# intermediate_work_piece_operation_is_simple_operation = false

# Sequences hang directly below the operation
# single_path = false
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}

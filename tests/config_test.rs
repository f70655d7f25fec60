//! Layered settings loading
//!
//! These tests only use temp directories as the local layer; a global
//! config or JOBTREE_* variables on the test machine would leak in.

use std::fs;
use std::path::PathBuf;

use rstest::rstest;
use tempfile::TempDir;

use jobtree::application::ApplicationError;
use jobtree::config::{local_config_path, Settings};

#[rstest]
fn given_no_local_config_when_loading_then_defaults() {
    // Arrange
    let temp = TempDir::new().unwrap();

    // Act
    let settings = Settings::load(Some(temp.path())).unwrap();

    // Assert
    assert!(settings.show_orphans);
    assert!(!settings.hierarchy.single_path);
}

#[rstest]
fn given_local_config_when_loading_then_overrides_apply() {
    // Arrange
    let temp = TempDir::new().unwrap();
    fs::write(
        local_config_path(temp.path()),
        r#"
data_file = "plant.toml"
show_orphans = false

[hierarchy]
single_path = true
intermediate_work_piece_operation_is_simple_operation = true
"#,
    )
    .unwrap();

    // Act
    let settings = Settings::load(Some(temp.path())).unwrap();

    // Assert
    assert!(!settings.show_orphans);
    assert!(settings.hierarchy.single_path);
    assert!(settings.hierarchy.intermediate_work_piece_operation_is_simple_operation);
    assert!(!settings.hierarchy.work_order_project_is_job);
    assert_eq!(settings.data_file, Some(temp.path().join("plant.toml")));
}

#[rstest]
fn given_absolute_data_file_when_loading_then_kept_as_is() {
    let temp = TempDir::new().unwrap();
    fs::write(local_config_path(temp.path()), "data_file = \"/srv/plant.toml\"\n").unwrap();

    let settings = Settings::load(Some(temp.path())).unwrap();

    assert_eq!(settings.data_file, Some(PathBuf::from("/srv/plant.toml")));
}

#[rstest]
fn given_malformed_local_config_when_loading_then_config_error() {
    let temp = TempDir::new().unwrap();
    fs::write(local_config_path(temp.path()), "[hierarchy\nsingle_path = yes").unwrap();

    let result = Settings::load(Some(temp.path()));

    assert!(matches!(result, Err(ApplicationError::Config { .. })));
}

#[rstest]
fn given_template_when_parsing_then_yields_defaults() {
    let parsed: Settings = toml::from_str(&Settings::template()).unwrap();
    assert_eq!(parsed, Settings::default());
}

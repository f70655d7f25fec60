//! Datasets, wiring and command dispatch end to end

use std::fs;

use clap::Parser;
use rstest::rstest;
use tempfile::TempDir;

use jobtree::cli::{execute_command, Cli, CliError};
use jobtree::config::Settings;
use jobtree::domain::{HierarchyFlags, RootFilter};
use jobtree::exitcode;
use jobtree::infrastructure::di::ServiceContainer;
use jobtree::infrastructure::fixture::Dataset;
use jobtree::infrastructure::InfraError;
use jobtree::util::testing;

const PLANT: &str = r#"
[[work_orders]]
id = 1
name = "WO-1"
status = 1

[[projects]]
id = 10
name = "Gearbox"
work_orders = [1]

[[projects]]
id = 12
name = "Spare"

[[components]]
id = 100
name = "Housing"
project = 10

[[operations]]
id = 500
name = "Milling"

[[intermediate_work_pieces]]
id = 7
name = "Blank"
operation = 500
components = [100]

[[paths]]
id = 50
operation = 500
number = 1

[[sequences]]
id = 1
path = 50
order = 0
name = "Rough"
"#;

fn plant_file(temp: &TempDir) -> String {
    let path = temp.path().join("plant.toml");
    fs::write(&path, PLANT).unwrap();
    path.to_string_lossy().into_owned()
}

fn run(temp: &TempDir, args: &[&str]) -> Result<(), CliError> {
    testing::init_test_setup();
    let data = plant_file(temp);
    let dir = temp.path().to_string_lossy().into_owned();
    let mut argv = vec!["jobtree", "-C", dir.as_str(), "--data", data.as_str()];
    argv.extend_from_slice(args);
    execute_command(&Cli::parse_from(argv))
}

// ============================================================
// Dataset and container
// ============================================================

#[rstest]
fn given_dataset_file_when_building_container_then_engine_sees_it() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let settings = Settings {
        data_file: Some(plant_file(&temp).into()),
        ..Settings::default()
    };

    // Act
    let container = ServiceContainer::new(settings).unwrap();
    let mut engine = container.engine().unwrap();
    let roots = engine.load_roots(&RootFilter::default()).unwrap();

    // Assert
    assert_eq!(roots, 1);
    let held: Vec<_> = engine.orphans().unwrap().entries().iter().map(|e| e.id).collect();
    assert_eq!(held, vec![12]);
}

#[rstest]
fn given_orphans_disabled_when_building_engine_then_no_holder() {
    let settings = Settings {
        show_orphans: false,
        ..Settings::default()
    };

    let engine = ServiceContainer::new(settings).unwrap().engine().unwrap();

    assert!(engine.orphans().is_none());
}

#[rstest]
fn given_project_with_two_components_when_showing_parts_then_fixture_error() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("plant.toml");
    let content = format!("{PLANT}\n[[components]]\nid = 101\nname = \"Shaft\"\nproject = 10\n");
    fs::write(&path, content).unwrap();
    let settings = Settings {
        data_file: Some(path),
        hierarchy: HierarchyFlags {
            project_component_is_part: true,
            ..HierarchyFlags::default()
        },
        ..Settings::default()
    };

    // Act
    let result = ServiceContainer::new(settings);

    // Assert
    assert!(matches!(result, Err(InfraError::Fixture { message }) if message.contains("project 10")));
}

#[rstest]
fn given_dangling_reference_when_loading_dataset_then_fixture_error() {
    let content = PLANT.replace("project = 10", "project = 99");

    let result = Dataset::from_toml(&content);

    assert!(matches!(result, Err(InfraError::Fixture { .. })));
}

#[rstest]
fn given_missing_dataset_file_when_loading_then_io_error() {
    let temp = TempDir::new().unwrap();

    let result = Dataset::load(&temp.path().join("missing.toml"));

    assert!(matches!(result, Err(InfraError::Io { .. })));
}

// ============================================================
// Commands
// ============================================================

#[rstest]
#[case::schema(&["schema"])]
#[case::tree(&["tree", "--orphans"])]
#[case::tree_shallow(&["tree", "--depth", "1", "--status", "1"])]
#[case::tree_archived(&["tree", "--project-archived", "false"])]
#[case::branches(&["branches", "iwp", "7"])]
#[case::focus(&["focus", "sequence", "1"])]
#[case::focus_orphan(&["focus", "project", "12"])]
#[case::config_show(&["config", "show"])]
#[case::config_template(&["config", "template"])]
fn given_valid_command_when_executing_then_succeeds(#[case] args: &[&str]) {
    let temp = TempDir::new().unwrap();

    let result = run(&temp, args);

    assert!(result.is_ok(), "{args:?}: {result:?}");
}

#[rstest]
fn given_unknown_entity_when_listing_branches_then_no_input_exit_code() {
    let temp = TempDir::new().unwrap();

    let err = run(&temp, &["branches", "component", "999"]).unwrap_err();

    assert_eq!(err.exit_code(), exitcode::NOINPUT);
}

#[rstest]
fn given_kind_outside_schema_when_listing_branches_then_usage_exit_code() {
    let temp = TempDir::new().unwrap();

    let err = run(&temp, &["branches", "part", "10"]).unwrap_err();

    assert_eq!(err.exit_code(), exitcode::USAGE);
}

#[rstest]
fn given_no_subcommand_when_executing_then_usage_error() {
    let temp = TempDir::new().unwrap();

    let err = run(&temp, &[]).unwrap_err();

    assert!(matches!(err, CliError::Usage(_)));
    assert_eq!(err.exit_code(), exitcode::USAGE);
}

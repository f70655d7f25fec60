//! Lazy population, reload and rebuild of the live tree

mod common;

use rstest::rstest;

use common::{child_names, engine_with, loaded, node_under, plant, reveal};
use jobtree::application::services::MaterializeWarning;
use jobtree::application::ApplicationError;
use jobtree::domain::{EntityKind, EntityRef, HierarchyFlags, RootFilter};

// ============================================================
// load_roots
// ============================================================

#[rstest]
#[case::all(RootFilter::default(), vec!["1", "2"])]
#[case::by_status(RootFilter { work_order_status: Some(2), ..RootFilter::default() }, vec!["2"])]
fn given_filter_when_loading_roots_then_only_matching_work_orders(
    #[case] filter: RootFilter,
    #[case] expected: Vec<&str>,
) {
    // Arrange
    let (mut engine, _store) = engine_with(plant(), HierarchyFlags::default());

    // Act
    let count = engine.load_roots(&filter).unwrap();

    // Assert
    let roots: Vec<&str> = engine
        .tree()
        .roots()
        .iter()
        .filter_map(|&root| engine.node(root))
        .map(|root| root.name())
        .collect();
    assert_eq!(count, expected.len());
    assert_eq!(roots, expected);
}

#[rstest]
fn given_loaded_roots_then_first_tier_is_present_but_not_deeper() {
    let (engine, _store) = loaded(HierarchyFlags::default());

    let wo1 = engine.find_nodes(EntityKind::WorkOrder, "1")[0];
    let gearbox = node_under(&engine, EntityKind::Project, "10", EntityKind::WorkOrder, "1");

    assert_eq!(child_names(&engine, wo1), vec!["10", "11"]);
    assert!(engine.node(wo1).unwrap().children_loaded());
    assert!(!engine.node(gearbox).unwrap().children_loaded());
}

#[rstest]
#[case::no_filter(None, vec!["10", "11"])]
#[case::only_archived(Some(true), vec!["11"])]
#[case::only_active(Some(false), vec!["10"])]
fn given_archived_project_when_filtering_then_first_tier_matches(
    #[case] project_archived: Option<bool>,
    #[case] expected: Vec<&str>,
) {
    // Arrange
    let mut dataset = plant();
    dataset.projects.iter_mut().filter(|p| p.id == 11).for_each(|p| p.archived = true);
    let (mut engine, _store) = engine_with(dataset, HierarchyFlags::default());
    let filter = RootFilter {
        project_archived,
        ..RootFilter::default()
    };

    // Act
    engine.load_roots(&filter).unwrap();

    // Assert
    let wo1 = engine.find_nodes(EntityKind::WorkOrder, "1")[0];
    assert_eq!(child_names(&engine, wo1), expected);
}

fn part_roots() -> HierarchyFlags {
    HierarchyFlags {
        part_at_the_top: true,
        project_component_is_part: true,
        ..HierarchyFlags::default()
    }
}

#[rstest]
#[case::no_filter(None, vec!["100", "110", "120"])]
#[case::only_archived(Some(true), vec!["110"])]
#[case::only_active(Some(false), vec!["100", "120"])]
fn given_archived_project_when_filtering_part_roots_then_roots_match(
    #[case] project_archived: Option<bool>,
    #[case] expected: Vec<&str>,
) {
    // Arrange
    let mut dataset = plant();
    dataset.projects.iter_mut().filter(|p| p.id == 11).for_each(|p| p.archived = true);
    let (mut engine, _store) = engine_with(dataset, part_roots());
    let filter = RootFilter {
        project_archived,
        ..RootFilter::default()
    };

    // Act
    engine.load_roots(&filter).unwrap();

    // Assert
    let roots: Vec<&str> = engine
        .tree()
        .roots()
        .iter()
        .filter_map(|&root| engine.node(root))
        .map(|root| root.name())
        .collect();
    assert_eq!(roots, expected);
}

#[rstest]
#[case::no_filter(None, vec!["7", "43"])]
#[case::only_archived(Some(true), vec!["7"])]
#[case::only_active(Some(false), vec!["43"])]
fn given_archived_operation_when_filtering_part_roots_then_work_pieces_match(
    #[case] operation_archived: Option<bool>,
    #[case] expected: Vec<&str>,
) {
    // Arrange
    let mut dataset = plant();
    dataset.operations.iter_mut().filter(|op| op.id == 500).for_each(|op| op.archived = true);
    let (mut engine, _store) = engine_with(dataset, part_roots());
    let filter = RootFilter {
        operation_archived,
        ..RootFilter::default()
    };

    // Act
    engine.load_roots(&filter).unwrap();

    // Assert
    let gearbox = engine.find_nodes(EntityKind::Part, "100")[0];
    assert_eq!(child_names(&engine, gearbox), expected);
}

// ============================================================
// populate_children
// ============================================================

#[rstest]
fn given_loaded_node_when_populating_again_then_store_is_not_read() {
    // Arrange
    let (mut engine, store) = loaded(HierarchyFlags::default());
    let gearbox = node_under(&engine, EntityKind::Project, "10", EntityKind::WorkOrder, "1");

    // Act
    let first = engine.populate_children(gearbox, false).unwrap();
    let reads = store.read_count();
    let second = engine.populate_children(gearbox, false).unwrap();

    // Assert
    assert_eq!(first.added, 2);
    assert_eq!(second.added, 0);
    assert_eq!(store.read_count(), reads);
    assert_eq!(child_names(&engine, gearbox), vec!["100", "101"]);
}

#[rstest]
fn given_forced_reload_when_populating_then_children_are_replaced() {
    // Arrange
    let (mut engine, store) = loaded(HierarchyFlags::default());
    let gearbox = node_under(&engine, EntityKind::Project, "10", EntityKind::WorkOrder, "1");
    engine.populate_children(gearbox, false).unwrap();
    store.delete_concurrently(EntityRef::new(EntityKind::Component, 101));

    // Act
    let populated = engine.populate_children(gearbox, true).unwrap();

    // Assert
    assert_eq!(populated.added, 1);
    assert_eq!(child_names(&engine, gearbox), vec!["100"]);
    assert!(engine.find_nodes(EntityKind::Component, "101").is_empty());
}

#[rstest]
fn given_single_path_mode_when_operation_has_two_paths_then_warns_and_uses_first() {
    // Arrange
    let flags = HierarchyFlags {
        single_path: true,
        ..HierarchyFlags::default()
    };
    let (mut engine, store) = loaded(flags);
    let turning = reveal(&mut engine, &store, EntityKind::Operation, 501);
    assert_eq!(turning.len(), 1);

    // Act
    let populated = engine.populate_children(turning[0], false).unwrap();

    // Assert
    assert_eq!(
        populated.warnings,
        vec![MaterializeWarning::MultiplePathsInSinglePathMode {
            operation: EntityRef::new(EntityKind::Operation, 501),
            paths: 2,
        }]
    );
    assert_eq!(child_names(&engine, turning[0]), vec!["4"]);
}

#[rstest]
fn given_expand_when_children_are_shown_then_grandchildren_are_prefetched() {
    let (mut engine, _store) = loaded(HierarchyFlags::default());
    let gearbox = node_under(&engine, EntityKind::Project, "10", EntityKind::WorkOrder, "1");

    engine.expand(gearbox).unwrap();

    assert!(engine.node(gearbox).unwrap().is_expanded());
    for &component in engine.tree().children(gearbox) {
        assert!(engine.node(component).unwrap().children_loaded());
    }
}

// ============================================================
// reload_tree_nodes / build_tree_nodes
// ============================================================

#[rstest]
fn given_vanished_entity_when_reloading_then_fails_and_keeps_snapshot() {
    // Arrange
    let (mut engine, store) = loaded(HierarchyFlags::default());
    store.delete_concurrently(EntityRef::new(EntityKind::Project, 10));

    // Act
    let result = engine.reload_tree_nodes(EntityKind::Project, "10");

    // Assert
    assert!(matches!(result, Err(ApplicationError::StaleReference(r)) if r.id == 10));
    let gearbox = engine.find_nodes(EntityKind::Project, "10")[0];
    assert_eq!(engine.node(gearbox).unwrap().entity.display, "Gearbox");
}

#[rstest]
fn given_entity_on_two_branches_when_reloading_then_every_instance_is_refreshed() {
    let (mut engine, _store) = loaded(HierarchyFlags::default());

    let refreshed = engine.reload_tree_nodes(EntityKind::Project, "11").unwrap();

    assert_eq!(refreshed, 2);
}

#[rstest]
fn given_expanded_child_when_rebuilding_then_it_stays_expanded() {
    // Arrange
    let (mut engine, store) = loaded(HierarchyFlags::default());
    let gearbox = node_under(&engine, EntityKind::Project, "10", EntityKind::WorkOrder, "1");
    engine.expand(gearbox).unwrap();
    let housing = node_under(&engine, EntityKind::Component, "100", EntityKind::Project, "10");
    engine.expand(housing).unwrap();
    let blank = node_under(&engine, EntityKind::IntermediateWorkPiece, "7", EntityKind::Component, "100");
    engine.expand(blank).unwrap();
    store.delete_concurrently(EntityRef::new(EntityKind::IntermediateWorkPiece, 43));

    // Act
    let rebuilt = engine.build_tree_nodes(EntityKind::Component, "100").unwrap();

    // Assert
    assert_eq!(rebuilt, 1);
    assert_eq!(child_names(&engine, housing), vec!["7"]);
    let blank = node_under(&engine, EntityKind::IntermediateWorkPiece, "7", EntityKind::Component, "100");
    let node = engine.node(blank).unwrap();
    assert!(node.is_expanded());
    assert!(node.children_loaded());
    assert_eq!(child_names(&engine, blank), vec!["500"]);
}

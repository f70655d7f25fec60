//! Shared dataset and tree navigation for integration tests
#![allow(dead_code)]

use jobtree::application::TreeEngine;
use jobtree::domain::{EntityKind, EntityRecord, EntityRef, HierarchyFlags, NodeId, RootFilter};
use jobtree::infrastructure::fixture::Dataset;
use jobtree::infrastructure::memory::MemoryStore;
use jobtree::util::testing;

/// Small plant:
///
/// ```text
/// WO-1 (1) ── Gearbox (10) ── Housing (100) ── Blank (7) ── Milling (500)
///          │               │                └─ Plate (43) ── Drilling (502)
///          │               └─ Shaft (101) ──── Rod (42) ─── Turning (501)
///          └─ Pump (11) ───── Impeller (110) ─ Blank (7)
/// WO-2 (2) ── Pump (11)
/// Spare (12) ── Bracket (120)            no work order
/// Loose (44)                             no component
/// ```
///
/// Milling owns path 50 with sequences 1, 2, 3. Turning owns paths 51 (with
/// sequence 4) and 52.
pub fn plant() -> Dataset {
    Dataset::default()
        .work_order(1, "WO-1", Some(1))
        .work_order(2, "WO-2", Some(2))
        .project(10, "Gearbox", &[1])
        .project(11, "Pump", &[1, 2])
        .project(12, "Spare", &[])
        .component(100, "Housing", 10)
        .component(101, "Shaft", 10)
        .component(110, "Impeller", 11)
        .component(120, "Bracket", 12)
        .operation(500, "Milling")
        .operation(501, "Turning")
        .operation(502, "Drilling")
        .intermediate_work_piece(7, "Blank", Some(500), &[100, 110])
        .intermediate_work_piece(42, "Rod", Some(501), &[101])
        .intermediate_work_piece(43, "Plate", Some(502), &[100])
        .intermediate_work_piece(44, "Loose", None, &[])
        .path(50, 500, 1)
        .path(51, 501, 1)
        .path(52, 501, 2)
        .sequence(1, 50, 0, "Rough")
        .sequence(2, 50, 1, "Finish")
        .sequence(3, 50, 2, "Deburr")
        .sequence(4, 51, 0, "Face")
}

/// Engine over `dataset` plus a second handle on the same store.
pub fn engine_with(dataset: Dataset, flags: HierarchyFlags) -> (TreeEngine, MemoryStore) {
    testing::init_test_setup();
    let store = MemoryStore::from(dataset);
    let engine = TreeEngine::new(flags, Box::new(store.clone()));
    (engine, store)
}

/// Engine with the roots loaded.
pub fn loaded(flags: HierarchyFlags) -> (TreeEngine, MemoryStore) {
    let (mut engine, store) = engine_with(plant(), flags);
    engine
        .load_roots(&RootFilter::default())
        .expect("roots should load");
    (engine, store)
}

pub fn record(store: &MemoryStore, kind: EntityKind, id: i64) -> EntityRecord {
    store
        .peek(EntityRef::new(kind, id))
        .unwrap_or_else(|| panic!("{kind} {id} should exist"))
}

/// Expands the tree down to every node showing `(kind, id)` and returns them.
pub fn reveal(engine: &mut TreeEngine, store: &MemoryStore, kind: EntityKind, id: i64) -> Vec<NodeId> {
    let entity = record(store, kind, id);
    engine
        .focus_all_instances(&entity)
        .expect("focus should succeed");
    engine.selection().to_vec()
}

/// The node showing `(kind, name)` whose parent shows `(parent_kind, parent_name)`.
pub fn node_under(
    engine: &TreeEngine,
    kind: EntityKind,
    name: &str,
    parent_kind: EntityKind,
    parent_name: &str,
) -> NodeId {
    engine
        .find_nodes(kind, name)
        .into_iter()
        .find(|&node| {
            engine
                .node(node)
                .and_then(|n| n.parent())
                .and_then(|p| engine.node(p))
                .is_some_and(|p| p.kind() == parent_kind && p.name() == parent_name)
        })
        .unwrap_or_else(|| panic!("{kind}:{name} below {parent_kind}:{parent_name} not in tree"))
}

pub fn child_names(engine: &TreeEngine, node: NodeId) -> Vec<String> {
    engine
        .tree()
        .children(node)
        .iter()
        .filter_map(|&child| engine.node(child))
        .map(|child| child.name().to_string())
        .collect()
}

pub fn ids(records: &[EntityRecord]) -> Vec<i64> {
    records.iter().map(|r| r.id).collect()
}

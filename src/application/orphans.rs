//! Holding area for entities without a parent

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use crate::application::{ApplicationResult, PersistenceResultExt, ScopedSession};
use crate::domain::{compare_records, EntityId, EntityKind, EntityRecord, EntityRef, HierarchySchema};
use crate::infrastructure::traits::{OrphanHolder, Store};

/// Orphans grouped by kind, in display order.
#[derive(Debug, Clone, Default)]
pub struct OrphanedItems {
    categories: BTreeMap<EntityKind, Vec<EntityRecord>>,
    selection: Vec<EntityRef>,
}

impl OrphanedItems {
    /// Kinds that can lose their last parent in `schema`.
    pub fn kinds_for(schema: &HierarchySchema) -> Vec<EntityKind> {
        let mut kinds = Vec::new();
        if schema.contains(EntityKind::Project) {
            kinds.push(EntityKind::Project);
        }
        if schema.contains(EntityKind::Part) && schema.root_kind() != EntityKind::Part {
            kinds.push(EntityKind::Part);
        }
        kinds.extend(
            [EntityKind::IntermediateWorkPiece, EntityKind::SimpleOperation]
                .into_iter()
                .filter(|kind| schema.contains(*kind)),
        );
        kinds
    }

    /// Empty holder accepting the orphan kinds of `schema`.
    pub fn new(schema: &HierarchySchema) -> Self {
        Self {
            categories: Self::kinds_for(schema)
                .into_iter()
                .map(|kind| (kind, Vec::new()))
                .collect(),
            selection: Vec::new(),
        }
    }

    /// Holder seeded with the orphans currently in the store.
    #[instrument(level = "debug", skip_all)]
    pub fn load(store: &mut dyn Store, schema: &HierarchySchema) -> ApplicationResult<Self> {
        let mut items = Self::new(schema);
        let mut session = ScopedSession::open(store)?;
        for (kind, entries) in items.categories.iter_mut() {
            *entries = session.orphans(*kind).with_context("load orphans")?;
            entries.sort_by(compare_records);
            debug!("orphans: {} {}", entries.len(), kind);
        }
        Ok(items)
    }

    pub fn kinds(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.categories.keys().copied()
    }

    pub fn entries_of(&self, kind: EntityKind) -> &[EntityRecord] {
        self.categories.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn selection(&self) -> &[EntityRef] {
        &self.selection
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OrphanHolder for OrphanedItems {
    fn insert_node(&mut self, entity: &EntityRecord) {
        let Some(entries) = self.categories.get_mut(&entity.kind) else {
            debug!("orphans: no category for {}", entity.kind);
            return;
        };
        if entries.iter().any(|e| e.key == entity.key) {
            return;
        }
        entries.push(entity.clone());
        entries.sort_by(compare_records);
    }

    fn remove_node(&mut self, entity: &EntityRecord) {
        if let Some(entries) = self.categories.get_mut(&entity.kind) {
            entries.retain(|e| e.key != entity.key);
        }
        self.selection.retain(|r| *r != entity.entity_ref());
    }

    fn focus_all_instances(&mut self, kind: EntityKind, key: EntityId) -> usize {
        self.selection = self
            .entries_of(kind)
            .iter()
            .filter(|e| e.key == key)
            .map(EntityRecord::entity_ref)
            .collect();
        self.selection.len()
    }

    fn entries(&self) -> Vec<EntityRecord> {
        self.categories.values().flatten().cloned().collect()
    }
}

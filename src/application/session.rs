//! Scoped session and transaction guards
//!
//! A session is ended and an uncommitted transaction rolled back when the
//! guard goes out of scope, on every exit path including `?`.

use std::ops::{Deref, DerefMut};

use tracing::debug;

use crate::application::{ApplicationResult, PersistenceResultExt};
use crate::infrastructure::traits::Store;

pub struct ScopedSession<'a> {
    store: &'a mut dyn Store,
}

impl<'a> ScopedSession<'a> {
    pub fn open(store: &'a mut dyn Store) -> ApplicationResult<Self> {
        store.begin_session().with_context("open session")?;
        Ok(Self { store })
    }

    pub fn begin_transaction(&mut self) -> ApplicationResult<ScopedTransaction<'_>> {
        self.store
            .begin_transaction()
            .with_context("begin transaction")?;
        Ok(ScopedTransaction {
            store: &mut *self.store,
            committed: false,
        })
    }
}

impl<'a> Deref for ScopedSession<'a> {
    type Target = dyn Store + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.store
    }
}

impl<'a> DerefMut for ScopedSession<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.store
    }
}

impl Drop for ScopedSession<'_> {
    fn drop(&mut self) {
        self.store.end_session();
    }
}

pub struct ScopedTransaction<'s> {
    store: &'s mut dyn Store,
    committed: bool,
}

impl ScopedTransaction<'_> {
    pub fn commit(mut self) -> ApplicationResult<()> {
        self.store.commit().with_context("commit")?;
        self.committed = true;
        Ok(())
    }
}

impl<'s> Deref for ScopedTransaction<'s> {
    type Target = dyn Store + 's;

    fn deref(&self) -> &Self::Target {
        &*self.store
    }
}

impl<'s> DerefMut for ScopedTransaction<'s> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.store
    }
}

impl Drop for ScopedTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            debug!("transaction dropped without commit, rolling back");
            self.store.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntityKind, EntityRef};
    use crate::infrastructure::fixture::Dataset;
    use crate::infrastructure::memory::MemoryStore;
    use crate::infrastructure::traits::Link;

    fn store() -> MemoryStore {
        MemoryStore::from(
            Dataset::default()
                .work_order(1, "WO-1", None)
                .work_order(2, "WO-2", None)
                .project(10, "Gearbox", &[1]),
        )
    }

    #[test]
    fn given_error_inside_scope_when_leaving_then_everything_is_released() {
        let handle = store();
        let mut store = handle.clone();

        let result: ApplicationResult<()> = (|| {
            let mut session = ScopedSession::open(&mut store)?;
            let mut tx = session.begin_transaction()?;
            tx.attach(Link::WorkOrderProject, 2, 10).with_context("attach")?;
            tx.lock(EntityRef::new(EntityKind::Project, 99)).with_context("lock")?;
            tx.commit()
        })();

        assert!(result.is_err());
        assert!(!handle.has_open_scope());
        let work_orders = handle.peek_related(
            EntityRef::new(EntityKind::Project, 10),
            crate::infrastructure::traits::Relation::ProjectWorkOrders,
        );
        assert_eq!(work_orders.len(), 1);
    }

    #[test]
    fn given_commit_when_leaving_then_changes_persist() {
        let handle = store();
        let mut store = handle.clone();
        {
            let mut session = ScopedSession::open(&mut store).unwrap();
            let mut tx = session.begin_transaction().unwrap();
            tx.attach(Link::WorkOrderProject, 2, 10).unwrap();
            tx.commit().unwrap();
        }

        assert_eq!(handle.commit_count(), 1);
        assert!(!handle.has_open_scope());
    }
}

//! Dirty tracking and per-item processing leases
//!
//! Every ingestion bumps a per-item generation counter in the store. A
//! processing run remembers the generation it started from and subtracts it
//! when it succeeds: the counter drops to zero (clean) unless more data for
//! the item arrived meanwhile, in which case it stays dirty for the next run.
//!
//! Processing an item requires its [`ItemLease`], a store-scoped lock shared by
//! every process using the same store.

use crate::item::ItemId;
use crate::keys::{Keyspace, DIRTY_ROW};
use crate::store::SparseMatrixStore;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

pub struct DirtyTracker {
    store: Arc<dyn SparseMatrixStore>,
    key: String,
}

impl DirtyTracker {
    pub fn new(store: Arc<dyn SparseMatrixStore>, keys: &Keyspace) -> Self {
        Self {
            store,
            key: keys.dirty(),
        }
    }

    /// Mark items as changed
    pub fn mark<S: AsRef<str>>(&self, items: &[S]) -> Result<()> {
        for item in items {
            self.store.increment_cell(&self.key, DIRTY_ROW, item.as_ref(), 1)?;
        }
        Ok(())
    }

    /// Current generation of `item`, 0 when clean
    pub fn generation(&self, item: &str) -> Result<i64> {
        self.store.get_cell(&self.key, DIRTY_ROW, item)
    }

    #[inline]
    pub fn is_dirty(&self, item: &str) -> Result<bool> {
        Ok(self.generation(item)? > 0)
    }

    /// Every dirty item with its generation, ordered by id
    pub fn snapshot(&self) -> Result<Vec<(ItemId, i64)>> {
        self.store.get_row(&self.key, DIRTY_ROW)
    }

    /// Retire the changes up to `generation`
    ///
    /// # Returns
    /// `true` if the item is clean afterwards
    pub fn clear(&self, item: &str, generation: i64) -> Result<bool> {
        if generation <= 0 {
            return Ok(!self.is_dirty(item)?);
        }
        let remaining = self
            .store
            .increment_cell(&self.key, DIRTY_ROW, item, -generation)?;
        Ok(remaining <= 0)
    }

    /// Drop the item from the dirty set whatever its generation
    pub fn forget(&self, item: &str) -> Result<()> {
        self.store.delete_cell(&self.key, DIRTY_ROW, item)
    }
}

/// Exclusive right to process or remove one item
///
/// Released when dropped, including on error paths.
pub struct ItemLease {
    store: Arc<dyn SparseMatrixStore>,
    key: String,
    owner: String,
    ttl: Duration,
}

impl ItemLease {
    /// Take the lease or fail with [`Error::ConcurrentProcessingConflict`]
    pub fn acquire(
        store: Arc<dyn SparseMatrixStore>,
        keys: &Keyspace,
        item: &str,
        ttl: Duration,
    ) -> Result<Self> {
        let key = keys.lease(item);
        let owner = Uuid::new_v4().to_string();
        if !store.try_acquire_lease(&key, &owner, ttl)? {
            return Err(Error::ConcurrentProcessingConflict(item.to_string()));
        }
        Ok(Self { store, key, owner, ttl })
    }

    /// Extend the lease by its ttl
    ///
    /// Fails with [`Error::ConcurrentProcessingConflict`] if the lease expired
    /// and another owner took it in the meantime.
    pub fn renew(&self) -> Result<()> {
        if self.store.try_acquire_lease(&self.key, &self.owner, self.ttl)? {
            return Ok(());
        }
        warn!(lease = %self.key, ttl_ms = self.ttl.as_millis() as u64, "lease lost before renewal");
        Err(Error::ConcurrentProcessingConflict(self.key.clone()))
    }
}

impl Drop for ItemLease {
    fn drop(&mut self) {
        if let Err(e) = self.store.release_lease(&self.key, &self.owner) {
            warn!(lease = %self.key, error = %e, "failed to release lease");
        }
    }
}

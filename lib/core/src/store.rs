//! Sparse storage contract
//!
//! The engine never touches persistence directly. Every read and write goes
//! through [`SparseMatrixStore`], a key-addressed sparse 2D integer store with
//! scalar counters, ordered lists and leases. Implementations decide the
//! physical format.
//!
//! [`MemoryStore`] is the in-process implementation used by tests and
//! single-process deployments. `cosim-storage` provides an LMDB-backed one
//! that can be shared by several processes.

use crate::{NeighborEntry, Result};
use ahash::{AHashMap, RandomState};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Storage contract consumed by the engine
///
/// Implementations must make `increment_cell` and `increment_scalar` atomic
/// (no lost updates under concurrent callers), `set_ordered_list` a whole-list
/// replace, and `try_acquire_lease` a compare-and-set.
pub trait SparseMatrixStore: Send + Sync {
    /// Cell value, 0 if absent
    fn get_cell(&self, matrix: &str, row: &str, col: &str) -> Result<i64>;

    /// Add `delta` to a cell and return the new value.
    /// A cell whose value becomes 0 is removed.
    fn increment_cell(&self, matrix: &str, row: &str, col: &str, delta: i64) -> Result<i64>;

    fn delete_cell(&self, matrix: &str, row: &str, col: &str) -> Result<()>;

    /// Non-zero entries of a row, ordered by column
    fn get_row(&self, matrix: &str, row: &str) -> Result<Vec<(String, i64)>>;

    fn delete_row(&self, matrix: &str, row: &str) -> Result<()>;

    /// Scalar value, 0 if absent
    fn get_scalar(&self, key: &str) -> Result<i64>;

    /// Add `delta` to a scalar and return the new value
    fn increment_scalar(&self, key: &str, delta: i64) -> Result<i64>;

    fn delete_scalar(&self, key: &str) -> Result<()>;

    /// Stored list, empty if absent
    fn get_ordered_list(&self, key: &str) -> Result<Vec<NeighborEntry>>;

    /// Replace a list atomically; an empty list deletes the key
    fn set_ordered_list(&self, key: &str, entries: &[NeighborEntry]) -> Result<()>;

    /// Drop one member from a list, returns whether it was present
    fn remove_member(&self, key: &str, member: &str) -> Result<bool>;

    /// Take the lease on `key` for `owner` unless another owner holds a live one.
    /// Re-acquiring an owned lease extends it.
    fn try_acquire_lease(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool>;

    /// Release the lease if `owner` still holds it
    fn release_lease(&self, key: &str, owner: &str) -> Result<()>;
}

/// A lease as stored by implementations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub owner: String,
    pub expires_at_ms: u64,
}

impl LeaseRecord {
    pub fn new(owner: &str, ttl: Duration) -> Self {
        Self {
            owner: owner.to_string(),
            expires_at_ms: now_millis().saturating_add(ttl.as_millis() as u64),
        }
    }

    /// Whether this record blocks `owner` at time `now_ms`
    #[inline]
    #[must_use]
    pub fn blocks(&self, owner: &str, now_ms: u64) -> bool {
        self.owner != owner && self.expires_at_ms > now_ms
    }
}

/// Milliseconds since the unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

type Shards<V> = DashMap<String, V, RandomState>;

/// In-memory store
///
/// Rows, scalars, lists and leases live in sharded maps locked per shard, so
/// writers to different rows or keys rarely contend and never block the
/// whole matrix.
#[derive(Default)]
pub struct MemoryStore {
    rows: Shards<AHashMap<String, i64>>,
    scalars: Shards<i64>,
    lists: Shards<Vec<NeighborEntry>>,
    leases: Shards<LeaseRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[inline]
fn row_key(matrix: &str, row: &str) -> String {
    format!("{}|{}", matrix, row)
}

impl SparseMatrixStore for MemoryStore {
    fn get_cell(&self, matrix: &str, row: &str, col: &str) -> Result<i64> {
        Ok(self
            .rows
            .get(&row_key(matrix, row))
            .and_then(|cells| cells.get(col).copied())
            .unwrap_or(0))
    }

    fn increment_cell(&self, matrix: &str, row: &str, col: &str, delta: i64) -> Result<i64> {
        let key = row_key(matrix, row);
        let value = {
            let mut cells = self.rows.entry(key.clone()).or_default();
            let value = cells.get(col).copied().unwrap_or(0) + delta;
            if value == 0 {
                cells.remove(col);
            } else {
                cells.insert(col.to_string(), value);
            }
            value
        };
        if value == 0 {
            self.rows.remove_if(&key, |_, cells| cells.is_empty());
        }
        Ok(value)
    }

    fn delete_cell(&self, matrix: &str, row: &str, col: &str) -> Result<()> {
        let key = row_key(matrix, row);
        if let Some(mut cells) = self.rows.get_mut(&key) {
            cells.remove(col);
        }
        self.rows.remove_if(&key, |_, cells| cells.is_empty());
        Ok(())
    }

    fn get_row(&self, matrix: &str, row: &str) -> Result<Vec<(String, i64)>> {
        let mut entries: Vec<(String, i64)> = match self.rows.get(&row_key(matrix, row)) {
            Some(cells) => cells.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            None => Vec::new(),
        };
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    fn delete_row(&self, matrix: &str, row: &str) -> Result<()> {
        self.rows.remove(&row_key(matrix, row));
        Ok(())
    }

    fn get_scalar(&self, key: &str) -> Result<i64> {
        Ok(self.scalars.get(key).map(|value| *value).unwrap_or(0))
    }

    fn increment_scalar(&self, key: &str, delta: i64) -> Result<i64> {
        let value = {
            let mut entry = self.scalars.entry(key.to_string()).or_insert(0);
            *entry += delta;
            *entry
        };
        if value == 0 {
            self.scalars.remove_if(key, |_, value| *value == 0);
        }
        Ok(value)
    }

    fn delete_scalar(&self, key: &str) -> Result<()> {
        self.scalars.remove(key);
        Ok(())
    }

    fn get_ordered_list(&self, key: &str) -> Result<Vec<NeighborEntry>> {
        Ok(self.lists.get(key).map(|list| list.clone()).unwrap_or_default())
    }

    fn set_ordered_list(&self, key: &str, entries: &[NeighborEntry]) -> Result<()> {
        if entries.is_empty() {
            self.lists.remove(key);
        } else {
            self.lists.insert(key.to_string(), entries.to_vec());
        }
        Ok(())
    }

    fn remove_member(&self, key: &str, member: &str) -> Result<bool> {
        let removed = match self.lists.get_mut(key) {
            Some(mut list) => {
                let before = list.len();
                list.retain(|entry| entry.item != member);
                list.len() != before
            }
            None => false,
        };
        self.lists.remove_if(key, |_, list| list.is_empty());
        Ok(removed)
    }

    fn try_acquire_lease(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut lease) => {
                if lease.get().blocks(owner, now_millis()) {
                    return Ok(false);
                }
                lease.insert(LeaseRecord::new(owner, ttl));
            }
            Entry::Vacant(slot) => {
                slot.insert(LeaseRecord::new(owner, ttl));
            }
        }
        Ok(true)
    }

    fn release_lease(&self, key: &str, owner: &str) -> Result<()> {
        self.leases.remove_if(key, |_, lease| lease.owner == owner);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_cell_increment_and_row() {
        let store = MemoryStore::new();
        assert_eq!(store.get_cell("m", "a", "b").unwrap(), 0);
        assert_eq!(store.increment_cell("m", "a", "b", 1).unwrap(), 1);
        assert_eq!(store.increment_cell("m", "a", "b", 2).unwrap(), 3);
        store.increment_cell("m", "a", "c", 1).unwrap();

        let row = store.get_row("m", "a").unwrap();
        assert_eq!(row, vec![("b".to_string(), 3), ("c".to_string(), 1)]);
        assert!(store.get_row("m", "zzz").unwrap().is_empty());
        assert!(store.get_row("other", "a").unwrap().is_empty());
    }

    #[test]
    fn test_cell_removed_at_zero() {
        let store = MemoryStore::new();
        store.increment_cell("m", "a", "b", 2).unwrap();
        assert_eq!(store.increment_cell("m", "a", "b", -2).unwrap(), 0);
        assert!(store.get_row("m", "a").unwrap().is_empty());
    }

    #[test]
    fn test_delete_cell_and_row() {
        let store = MemoryStore::new();
        store.increment_cell("m", "a", "b", 1).unwrap();
        store.increment_cell("m", "a", "c", 1).unwrap();
        store.delete_cell("m", "a", "b").unwrap();
        assert_eq!(store.get_row("m", "a").unwrap().len(), 1);
        store.delete_row("m", "a").unwrap();
        assert!(store.get_row("m", "a").unwrap().is_empty());
    }

    #[test]
    fn test_scalars() {
        let store = MemoryStore::new();
        assert_eq!(store.increment_scalar("s", 5).unwrap(), 5);
        assert_eq!(store.get_scalar("s").unwrap(), 5);
        store.delete_scalar("s").unwrap();
        assert_eq!(store.get_scalar("s").unwrap(), 0);
    }

    #[test]
    fn test_ordered_lists() {
        let store = MemoryStore::new();
        let entries = vec![NeighborEntry::new("x", 0.9), NeighborEntry::new("y", 0.4)];
        store.set_ordered_list("l", &entries).unwrap();
        assert_eq!(store.get_ordered_list("l").unwrap(), entries);

        assert!(store.remove_member("l", "x").unwrap());
        assert!(!store.remove_member("l", "x").unwrap());
        assert_eq!(store.get_ordered_list("l").unwrap(), vec![NeighborEntry::new("y", 0.4)]);

        store.set_ordered_list("l", &[]).unwrap();
        assert!(store.get_ordered_list("l").unwrap().is_empty());
    }

    #[test]
    fn test_leases() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(30);
        assert!(store.try_acquire_lease("k", "one", ttl).unwrap());
        assert!(!store.try_acquire_lease("k", "two", ttl).unwrap());
        assert!(store.try_acquire_lease("k", "one", ttl).unwrap());

        store.release_lease("k", "two").unwrap();
        assert!(!store.try_acquire_lease("k", "two", ttl).unwrap());

        store.release_lease("k", "one").unwrap();
        assert!(store.try_acquire_lease("k", "two", ttl).unwrap());
    }

    #[test]
    fn test_expired_lease_can_be_taken() {
        let store = MemoryStore::new();
        assert!(store.try_acquire_lease("k", "one", Duration::ZERO).unwrap());
        thread::sleep(Duration::from_millis(5));
        assert!(store.try_acquire_lease("k", "two", Duration::from_secs(30)).unwrap());
    }

    #[test]
    fn test_concurrent_increments_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        store.increment_cell("m", "a", "b", 1).unwrap();
                        store.increment_scalar("s", 1).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.get_cell("m", "a", "b").unwrap(), 8000);
        assert_eq!(store.get_scalar("s").unwrap(), 8000);
    }

    #[test]
    fn test_rows_written_and_read_concurrently() {
        let store = Arc::new(MemoryStore::new());
        let writers: Vec<_> = ["a", "b", "c", "d"]
            .into_iter()
            .map(|row| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..500 {
                        store.increment_cell("m", row, &format!("c{}", i % 10), 1).unwrap();
                    }
                })
            })
            .collect();
        let reader = {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    assert!(store.get_row("m", "z").unwrap().is_empty());
                }
            })
        };
        for handle in writers {
            handle.join().unwrap();
        }
        reader.join().unwrap();

        for row in ["a", "b", "c", "d"] {
            let cells = store.get_row("m", row).unwrap();
            assert_eq!(cells.len(), 10);
            assert!(cells.iter().all(|(_, value)| *value == 50));
        }
    }

    #[test]
    fn test_emptied_keys_are_dropped() {
        let store = MemoryStore::new();
        store.increment_cell("m", "a", "b", 1).unwrap();
        store.increment_cell("m", "a", "b", -1).unwrap();
        store.increment_scalar("s", 1).unwrap();
        store.increment_scalar("s", -1).unwrap();
        store.set_ordered_list("l", &[NeighborEntry::new("x", 1.0)]).unwrap();
        store.remove_member("l", "x").unwrap();

        assert!(store.rows.is_empty());
        assert!(store.scalars.is_empty());
        assert!(store.lists.is_empty());
    }
}

// LMDB-based sparse matrix store, safe to share between processes
use anyhow::{anyhow, Result};
use cosim_core::{now_millis, Error, LeaseRecord, NeighborEntry, SparseMatrixStore};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const DB_CELLS: &str = "cells";
const DB_SCALARS: &str = "scalars";
const DB_LISTS: &str = "lists";
const DB_LEASES: &str = "leases";

/// Separator inside cell keys: `{matrix}|{row}|{col}`
const CELL_SEP: char = '|';

const DEFAULT_MAP_SIZE: usize = 10 * 1024 * 1024 * 1024; // 10GB

/// [`SparseMatrixStore`] on top of LMDB
///
/// Every contract call runs in its own LMDB transaction. Write transactions
/// are serialized by LMDB across threads and processes, which makes the
/// increments and the lease compare-and-set atomic.
pub struct LmdbStore {
    env: Arc<Env>,
    cells_db: Database<Str, Bytes>,
    scalars_db: Database<Str, Bytes>,
    lists_db: Database<Str, Bytes>,
    leases_db: Database<Str, Bytes>,
}

impl LmdbStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_map_size(path, DEFAULT_MAP_SIZE)
    }

    pub fn with_map_size<P: AsRef<Path>>(path: P, map_size: usize) -> Result<Self> {
        std::fs::create_dir_all(&path)?;

        let env = Arc::new(unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(4)
                .open(path.as_ref())?
        });

        let mut wtxn = env.write_txn()?;
        let cells_db = env.create_database(&mut wtxn, Some(DB_CELLS))?;
        let scalars_db = env.create_database(&mut wtxn, Some(DB_SCALARS))?;
        let lists_db = env.create_database(&mut wtxn, Some(DB_LISTS))?;
        let leases_db = env.create_database(&mut wtxn, Some(DB_LEASES))?;
        wtxn.commit()?;

        info!(path = %path.as_ref().display(), "LMDB store opened");

        Ok(Self {
            env,
            cells_db,
            scalars_db,
            lists_db,
            leases_db,
        })
    }

    fn cell_key(matrix: &str, row: &str, col: &str) -> String {
        format!("{}{}{}{}{}", matrix, CELL_SEP, row, CELL_SEP, col)
    }

    fn row_prefix(matrix: &str, row: &str) -> String {
        format!("{}{}{}{}", matrix, CELL_SEP, row, CELL_SEP)
    }

    fn add(&self, db: Database<Str, Bytes>, key: &str, delta: i64) -> Result<i64> {
        let mut wtxn = self.env.write_txn()?;
        let current = match db.get(&wtxn, key)? {
            Some(bytes) => decode_i64(bytes)?,
            None => 0,
        };
        let value = current + delta;
        if value == 0 {
            db.delete(&mut wtxn, key)?;
        } else {
            db.put(&mut wtxn, key, &value.to_be_bytes())?;
        }
        wtxn.commit()?;
        Ok(value)
    }

    fn read_i64(&self, db: Database<Str, Bytes>, key: &str) -> Result<i64> {
        let rtxn = self.env.read_txn()?;
        match db.get(&rtxn, key)? {
            Some(bytes) => decode_i64(bytes),
            None => Ok(0),
        }
    }

    fn delete_key(&self, db: Database<Str, Bytes>, key: &str) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        db.delete(&mut wtxn, key)?;
        wtxn.commit()?;
        Ok(())
    }

    fn read_row(&self, matrix: &str, row: &str) -> Result<Vec<(String, i64)>> {
        let rtxn = self.env.read_txn()?;
        let prefix = Self::row_prefix(matrix, row);
        let mut entries = Vec::new();
        for entry in self.cells_db.prefix_iter(&rtxn, &prefix)? {
            let (key, bytes) = entry?;
            let value = decode_i64(bytes)?;
            if value != 0 {
                entries.push((key[prefix.len()..].to_string(), value));
            }
        }
        Ok(entries)
    }

    fn drop_row(&self, matrix: &str, row: &str) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        let prefix = Self::row_prefix(matrix, row);
        let mut keys = Vec::new();
        for entry in self.cells_db.prefix_iter(&wtxn, &prefix)? {
            let (key, _) = entry?;
            keys.push(key.to_string());
        }
        for key in &keys {
            self.cells_db.delete(&mut wtxn, key)?;
        }
        wtxn.commit()?;
        Ok(())
    }

    fn read_list(&self, key: &str) -> Result<Vec<NeighborEntry>> {
        let rtxn = self.env.read_txn()?;
        match self.lists_db.get(&rtxn, key)? {
            Some(bytes) => Ok(bincode::deserialize(bytes)?),
            None => Ok(Vec::new()),
        }
    }

    fn write_list(&self, key: &str, entries: &[NeighborEntry]) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        if entries.is_empty() {
            self.lists_db.delete(&mut wtxn, key)?;
        } else {
            let data = bincode::serialize(entries)?;
            self.lists_db.put(&mut wtxn, key, &data)?;
        }
        wtxn.commit()?;
        Ok(())
    }

    fn drop_member(&self, key: &str, member: &str) -> Result<bool> {
        let mut wtxn = self.env.write_txn()?;
        let mut entries: Vec<NeighborEntry> = match self.lists_db.get(&wtxn, key)? {
            Some(bytes) => bincode::deserialize(bytes)?,
            None => return Ok(false),
        };
        let before = entries.len();
        entries.retain(|entry| entry.item != member);
        if entries.len() == before {
            return Ok(false);
        }
        if entries.is_empty() {
            self.lists_db.delete(&mut wtxn, key)?;
        } else {
            let data = bincode::serialize(&entries)?;
            self.lists_db.put(&mut wtxn, key, &data)?;
        }
        wtxn.commit()?;
        Ok(true)
    }

    fn acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let mut wtxn = self.env.write_txn()?;
        if let Some(bytes) = self.leases_db.get(&wtxn, key)? {
            let existing: LeaseRecord = bincode::deserialize(bytes)?;
            if existing.blocks(owner, now_millis()) {
                return Ok(false);
            }
        }
        let data = bincode::serialize(&LeaseRecord::new(owner, ttl))?;
        self.leases_db.put(&mut wtxn, key, &data)?;
        wtxn.commit()?;
        Ok(true)
    }

    fn release(&self, key: &str, owner: &str) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        let held = match self.leases_db.get(&wtxn, key)? {
            Some(bytes) => bincode::deserialize::<LeaseRecord>(bytes)?.owner == owner,
            None => false,
        };
        if held {
            self.leases_db.delete(&mut wtxn, key)?;
            wtxn.commit()?;
        }
        Ok(())
    }
}

fn decode_i64(bytes: &[u8]) -> Result<i64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| anyhow!("corrupt counter of {} bytes", bytes.len()))?;
    Ok(i64::from_be_bytes(raw))
}

fn unavailable(e: anyhow::Error) -> Error {
    Error::StoreUnavailable(e.to_string())
}

impl SparseMatrixStore for LmdbStore {
    fn get_cell(&self, matrix: &str, row: &str, col: &str) -> cosim_core::Result<i64> {
        self.read_i64(self.cells_db, &Self::cell_key(matrix, row, col))
            .map_err(unavailable)
    }

    fn increment_cell(&self, matrix: &str, row: &str, col: &str, delta: i64) -> cosim_core::Result<i64> {
        self.add(self.cells_db, &Self::cell_key(matrix, row, col), delta)
            .map_err(unavailable)
    }

    fn delete_cell(&self, matrix: &str, row: &str, col: &str) -> cosim_core::Result<()> {
        self.delete_key(self.cells_db, &Self::cell_key(matrix, row, col))
            .map_err(unavailable)
    }

    fn get_row(&self, matrix: &str, row: &str) -> cosim_core::Result<Vec<(String, i64)>> {
        self.read_row(matrix, row).map_err(unavailable)
    }

    fn delete_row(&self, matrix: &str, row: &str) -> cosim_core::Result<()> {
        self.drop_row(matrix, row).map_err(unavailable)
    }

    fn get_scalar(&self, key: &str) -> cosim_core::Result<i64> {
        self.read_i64(self.scalars_db, key).map_err(unavailable)
    }

    fn increment_scalar(&self, key: &str, delta: i64) -> cosim_core::Result<i64> {
        self.add(self.scalars_db, key, delta).map_err(unavailable)
    }

    fn delete_scalar(&self, key: &str) -> cosim_core::Result<()> {
        self.delete_key(self.scalars_db, key).map_err(unavailable)
    }

    fn get_ordered_list(&self, key: &str) -> cosim_core::Result<Vec<NeighborEntry>> {
        self.read_list(key).map_err(unavailable)
    }

    fn set_ordered_list(&self, key: &str, entries: &[NeighborEntry]) -> cosim_core::Result<()> {
        self.write_list(key, entries).map_err(unavailable)
    }

    fn remove_member(&self, key: &str, member: &str) -> cosim_core::Result<bool> {
        self.drop_member(key, member).map_err(unavailable)
    }

    fn try_acquire_lease(&self, key: &str, owner: &str, ttl: Duration) -> cosim_core::Result<bool> {
        self.acquire(key, owner, ttl).map_err(unavailable)
    }

    fn release_lease(&self, key: &str, owner: &str) -> cosim_core::Result<()> {
        self.release(key, owner).map_err(unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cells_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbStore::open(dir.path()).unwrap();

        assert_eq!(store.get_cell("shop:orders:cc", "a", "b").unwrap(), 0);
        assert_eq!(store.increment_cell("shop:orders:cc", "a", "b", 1).unwrap(), 1);
        assert_eq!(store.increment_cell("shop:orders:cc", "a", "b", 1).unwrap(), 2);
        store.increment_cell("shop:orders:cc", "a", "c", 1).unwrap();
        store.increment_cell("shop:orders:cc", "ab", "x", 1).unwrap();

        assert_eq!(
            store.get_row("shop:orders:cc", "a").unwrap(),
            vec![("b".to_string(), 2), ("c".to_string(), 1)]
        );

        store.delete_cell("shop:orders:cc", "a", "b").unwrap();
        assert_eq!(store.get_row("shop:orders:cc", "a").unwrap().len(), 1);

        store.delete_row("shop:orders:cc", "a").unwrap();
        assert!(store.get_row("shop:orders:cc", "a").unwrap().is_empty());
        assert_eq!(store.get_row("shop:orders:cc", "ab").unwrap().len(), 1);
    }

    #[test]
    fn test_zero_removes_cell() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbStore::open(dir.path()).unwrap();
        store.increment_cell("m", "r", "c", 3).unwrap();
        assert_eq!(store.increment_cell("m", "r", "c", -3).unwrap(), 0);
        assert!(store.get_row("m", "r").unwrap().is_empty());
    }

    #[test]
    fn test_scalars_and_lists() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbStore::open(dir.path()).unwrap();

        assert_eq!(store.increment_scalar("s", 4).unwrap(), 4);
        assert_eq!(store.get_scalar("s").unwrap(), 4);
        store.delete_scalar("s").unwrap();
        assert_eq!(store.get_scalar("s").unwrap(), 0);

        let entries = vec![NeighborEntry::new("x", 2.5), NeighborEntry::new("y", 0.5)];
        store.set_ordered_list("l", &entries).unwrap();
        assert_eq!(store.get_ordered_list("l").unwrap(), entries);
        assert!(store.remove_member("l", "x").unwrap());
        assert!(!store.remove_member("l", "x").unwrap());
        assert!(!store.remove_member("missing", "x").unwrap());
        store.set_ordered_list("l", &[]).unwrap();
        assert!(store.get_ordered_list("l").unwrap().is_empty());
    }

    #[test]
    fn test_leases() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbStore::open(dir.path()).unwrap();
        let ttl = Duration::from_secs(30);

        assert!(store.try_acquire_lease("k", "one", ttl).unwrap());
        assert!(!store.try_acquire_lease("k", "two", ttl).unwrap());
        store.release_lease("k", "two").unwrap();
        assert!(!store.try_acquire_lease("k", "two", ttl).unwrap());
        store.release_lease("k", "one").unwrap();
        assert!(store.try_acquire_lease("k", "two", ttl).unwrap());
    }

    #[test]
    fn test_concurrent_increments() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LmdbStore::open(dir.path()).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        store.increment_cell("m", "a", "b", 1).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.get_cell("m", "a", "b").unwrap(), 800);
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LmdbStore::open(dir.path()).unwrap();
            store.increment_cell("m", "a", "b", 7).unwrap();
            store
                .set_ordered_list("l", &[NeighborEntry::new("b", 1.0)])
                .unwrap();
        }

        let store = LmdbStore::open(dir.path()).unwrap();
        assert_eq!(store.get_cell("m", "a", "b").unwrap(), 7);
        assert_eq!(store.get_ordered_list("l").unwrap().len(), 1);
    }
}

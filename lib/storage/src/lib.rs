pub mod lmdb_store;

pub use lmdb_store::LmdbStore;

//! # cosim Core
//!
//! Core library for the cosim item-similarity engine.
//!
//! cosim computes "related items" from grouped interactions (one order's
//! basket, one user's likes, ...) with incremental, sparse, item-based
//! collaborative filtering:
//!
//! - [`InputMatrix`] - one weighted signal: co-occurrence counts, marginal counts, a similarity measure
//! - [`composite_row`] - weighted union of every matrix's scores for one item
//! - [`topn`] - capped, deterministic neighbour lists
//! - [`DirtyTracker`] / [`ItemLease`] - incremental reprocessing with per-item exclusion
//! - [`Recommender`] - the public surface tying it together
//! - [`SparseMatrixStore`] - the storage contract, with the in-memory [`MemoryStore`]
//!
//! ## Example
//!
//! ```rust
//! use cosim_core::{InputMatrixConfig, MemoryStore, Recommender, RecommenderConfig};
//! use std::sync::Arc;
//!
//! let config = RecommenderConfig::new(
//!     "shop",
//!     50,
//!     vec![InputMatrixConfig::new("orders", 1.0, "jaccard")],
//! );
//! let recommender = Recommender::new(config, Arc::new(MemoryStore::new())).unwrap();
//!
//! recommender.add_set("orders", "o1", &["item23", "item65"]).unwrap();
//! recommender.process().unwrap();
//!
//! let related = recommender.neighbors("item23").unwrap();
//! assert_eq!(related[0].item, "item65");
//! ```

pub mod aggregate;
pub mod config;
pub mod dirty;
pub mod error;
pub mod item;
pub mod keys;
pub mod matrix;
pub mod recommender;
pub mod store;
pub mod topn;

pub use aggregate::{composite_row, CompositeRow};
pub use config::{InputMatrixConfig, RecommenderConfig};
pub use dirty::{DirtyTracker, ItemLease};
pub use error::{Error, Result};
pub use item::{is_valid_token, ItemId, NeighborEntry, RESERVED_CHARS};
pub use keys::Keyspace;
pub use matrix::{InputMatrix, SimilarityRow};
pub use recommender::{ProcessReport, Recommender};
pub use store::{now_millis, LeaseRecord, MemoryStore, SparseMatrixStore};

pub use cosim_similarity::{Measure, MeasureRegistry, PairCounts, SimilarityFunction};

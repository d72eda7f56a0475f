//! # cosim
//!
//! Incremental item-to-item similarity ("related items") from co-occurrence.
//!
//! Feed cosim grouped interactions (one order's basket, one user's likes)
//! and it keeps running co-occurrence statistics per signal, combines the
//! signals with configurable weights and similarity measures, and maintains
//! a capped list of the most similar items for every item.
//!
//! ## Quick Start
//!
//! ### From the command line
//!
//! ```bash
//! cosim --config shop.json add-set --matrix orders o1 item23 item65
//! cosim --config shop.json process
//! cosim --config shop.json related item23
//! ```
//!
//! ### As a Library
//!
//! ```rust
//! use cosim::prelude::*;
//! use std::sync::Arc;
//!
//! let config = RecommenderConfig::new(
//!     "shop",
//!     50,
//!     vec![
//!         InputMatrixConfig::new("orders", 5.0, "jaccard"),
//!         InputMatrixConfig::new("likes", 1.0, "cosine"),
//!     ],
//! );
//! let recommender = Recommender::new(config, Arc::new(MemoryStore::new())).unwrap();
//!
//! recommender.add_set("orders", "o1", &["item23", "item65", "item23"]).unwrap();
//! recommender.add_set("orders", "o2", &["item14", "item23"]).unwrap();
//! recommender.process_item("item23").unwrap();
//!
//! let related = recommender.neighbors("item23").unwrap();
//! assert_eq!(related.len(), 2);
//! ```
//!
//! ## Crate Structure
//!
//! - [`cosim-core`](https://docs.rs/cosim-core) - Input matrices, aggregation, top-N lists, dirty tracking, the store contract
//! - [`cosim-similarity`](https://docs.rs/cosim-similarity) - Similarity measures and the measure registry
//! - [`cosim-storage`](https://docs.rs/cosim-storage) - LMDB-backed store shared across processes
//!
//! ## Features
//!
//! - **Incremental**: only items touched since the last run are reprocessed
//! - **Weighted signals**: any number of input matrices, each with its own measure
//! - **Deterministic**: neighbour lists ordered by score, ties by id
//! - **Multi-process**: per-item leases and atomic counters live in the store

// Re-export core types
pub use cosim_core::{
    InputMatrix, InputMatrixConfig, ItemId, NeighborEntry, ProcessReport, Recommender,
    RecommenderConfig, SparseMatrixStore, MemoryStore,
    Error, Result,
};

// Re-export similarity measures
pub use cosim_similarity::{Measure, MeasureRegistry, PairCounts, SimilarityFunction};

// Re-export storage
pub use cosim_storage::LmdbStore;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        InputMatrixConfig, ItemId, NeighborEntry, ProcessReport, Recommender,
        RecommenderConfig, SparseMatrixStore, MemoryStore,
        Measure, MeasureRegistry, SimilarityFunction,
        LmdbStore,
        Error, Result,
    };
}

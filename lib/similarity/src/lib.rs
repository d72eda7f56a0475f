//! # cosim Similarity
//!
//! Similarity measures over co-occurrence counts.
//!
//! Every measure is a pure function of a [`PairCounts`] value: how often two
//! items appeared in the same interaction set, how many sets each of them
//! appeared in, and how many sets were ingested in total.
//!
//! ## Features
//!
//! - **Built-in measures**: Jaccard, cosine and Sorensen-Dice as the closed [`Measure`] enum
//! - **Custom measures**: anything implementing [`SimilarityFunction`]
//! - **Registry**: name-keyed lookup used by configuration ([`MeasureRegistry`])
//!
//! ## Example
//!
//! ```rust
//! use cosim_similarity::{Measure, PairCounts, SimilarityFunction};
//!
//! let counts = PairCounts::new(1, 2, 1, 2);
//! assert_eq!(Measure::Jaccard.score(&counts), 0.5);
//! ```

pub mod measure;
pub mod registry;

pub use measure::{cosine, jaccard, sorensen, Measure, PairCounts, SimilarityFunction};
pub use registry::{MeasureRegistry, RegistryError};

//! Input matrices
//!
//! An [`InputMatrix`] is one named interaction signal (orders, likes, views,
//! ...). It owns a symmetric co-occurrence matrix, per-item marginal counts
//! and a set counter, all kept in the shared [`SparseMatrixStore`], and turns
//! them into similarity scores with its configured measure.

use crate::item::{token_problem, ItemId};
use crate::keys::Keyspace;
use crate::store::SparseMatrixStore;
use crate::{Error, Result};
use ahash::AHashSet;
use cosim_similarity::{PairCounts, SimilarityFunction};
use std::sync::Arc;
use tracing::debug;

/// One weighted interaction signal
pub struct InputMatrix {
    name: String,
    weight: f64,
    function: Arc<dyn SimilarityFunction>,
    store: Arc<dyn SparseMatrixStore>,
    keys: Keyspace,
    cooccurrence_key: String,
    set_count_key: String,
}

impl InputMatrix {
    pub fn new(
        name: &str,
        weight: f64,
        function: Arc<dyn SimilarityFunction>,
        store: Arc<dyn SparseMatrixStore>,
        keys: Keyspace,
    ) -> Self {
        Self {
            name: name.to_string(),
            weight,
            cooccurrence_key: keys.cooccurrence(name),
            set_count_key: keys.set_count(name),
            function,
            store,
            keys,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn measure(&self) -> &str {
        self.function.name()
    }

    /// Ingest one interaction set
    ///
    /// The whole set is validated before anything is written. Duplicates are
    /// collapsed, so each set counts once per item and once per pair.
    ///
    /// # Returns
    /// The distinct items of the set, in first-seen order
    pub fn add_set<S: AsRef<str>>(&self, bucket: &str, items: &[S]) -> Result<Vec<ItemId>> {
        let distinct = distinct_items(bucket, items)?;
        self.record(bucket, &distinct)?;
        Ok(distinct)
    }

    /// Write the counts of an already validated, duplicate-free set
    pub fn record(&self, bucket: &str, distinct: &[ItemId]) -> Result<()> {
        for (idx, a) in distinct.iter().enumerate() {
            for b in &distinct[idx + 1..] {
                self.store.increment_cell(&self.cooccurrence_key, a, b, 1)?;
                self.store.increment_cell(&self.cooccurrence_key, b, a, 1)?;
            }
        }
        for item in distinct {
            self.store.increment_scalar(&self.keys.marginal(&self.name, item), 1)?;
        }
        self.store.increment_scalar(&self.set_count_key, 1)?;

        debug!(
            matrix = %self.name,
            bucket,
            items = distinct.len(),
            "interaction set ingested"
        );
        Ok(())
    }

    /// Scores of every item co-occurring with `item`
    ///
    /// Reads the current store state; nothing is cached or written. An item
    /// without co-occurrences gives an empty row.
    pub fn similarity_row(&self, item: &str) -> Result<SimilarityRow<'_>> {
        let entries = self.store.get_row(&self.cooccurrence_key, item)?;
        let marginal = if entries.is_empty() { 0 } else { self.marginal(item)? };
        let sets = if entries.is_empty() { 0 } else { self.set_count()? };
        Ok(SimilarityRow {
            matrix: self,
            source: item.to_string(),
            entries: entries.into_iter(),
            marginal,
            sets,
        })
    }

    /// Delete every co-occurrence and the marginal count of `item`
    ///
    /// The set counter is left alone: the sets the item belonged to were
    /// still ingested.
    ///
    /// # Returns
    /// The items that co-occurred with `item`
    pub fn purge_item(&self, item: &str) -> Result<Vec<ItemId>> {
        let partners: Vec<ItemId> = self
            .store
            .get_row(&self.cooccurrence_key, item)?
            .into_iter()
            .map(|(partner, _)| partner)
            .collect();

        for partner in &partners {
            self.store.delete_cell(&self.cooccurrence_key, partner, item)?;
        }
        self.store.delete_row(&self.cooccurrence_key, item)?;
        self.store.delete_scalar(&self.keys.marginal(&self.name, item))?;

        debug!(matrix = %self.name, item, partners = partners.len(), "item purged");
        Ok(partners)
    }

    pub fn co_occurrence(&self, a: &str, b: &str) -> Result<u64> {
        Ok(count(self.store.get_cell(&self.cooccurrence_key, a, b)?))
    }

    pub fn marginal(&self, item: &str) -> Result<u64> {
        Ok(count(self.store.get_scalar(&self.keys.marginal(&self.name, item))?))
    }

    pub fn set_count(&self) -> Result<u64> {
        Ok(count(self.store.get_scalar(&self.set_count_key)?))
    }
}

impl std::fmt::Debug for InputMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputMatrix")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("measure", &self.function.name())
            .finish()
    }
}

/// Lazily scored row of one input matrix
pub struct SimilarityRow<'a> {
    matrix: &'a InputMatrix,
    source: ItemId,
    entries: std::vec::IntoIter<(String, i64)>,
    marginal: u64,
    sets: u64,
}

impl Iterator for SimilarityRow<'_> {
    type Item = Result<(ItemId, f64)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (candidate, co) = self.entries.next()?;
            if candidate == self.source || co <= 0 {
                continue;
            }
            let candidate_marginal = match self.matrix.marginal(&candidate) {
                Ok(value) => value,
                Err(e) => return Some(Err(e)),
            };
            let counts = PairCounts::new(count(co), self.marginal, candidate_marginal, self.sets);
            let score = self.matrix.function.score(&counts);
            return Some(Ok((candidate, score)));
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.entries.len()))
    }
}

/// Validate an interaction set and collapse duplicate items
pub fn distinct_items<S: AsRef<str>>(bucket: &str, items: &[S]) -> Result<Vec<ItemId>> {
    if let Some(problem) = token_problem(bucket) {
        return Err(Error::InvalidInteraction(format!("bucket: {}", problem)));
    }
    if items.is_empty() {
        return Err(Error::InvalidInteraction(format!("bucket {} has no items", bucket)));
    }

    let mut seen = AHashSet::with_capacity(items.len());
    let mut distinct = Vec::with_capacity(items.len());
    for item in items {
        let item = item.as_ref();
        if let Some(problem) = token_problem(item) {
            return Err(Error::InvalidInteraction(format!("bucket {}: {}", bucket, problem)));
        }
        if seen.insert(item) {
            distinct.push(item.to_string());
        }
    }
    Ok(distinct)
}

#[inline]
fn count(value: i64) -> u64 {
    value.max(0) as u64
}

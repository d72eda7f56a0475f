use crate::aggregate::composite_row;
use crate::config::RecommenderConfig;
use crate::dirty::{DirtyTracker, ItemLease};
use crate::item::{token_problem, ItemId, NeighborEntry};
use crate::keys::Keyspace;
use crate::matrix::{distinct_items, InputMatrix};
use crate::store::SparseMatrixStore;
use crate::topn;
use crate::{Error, Result};
use ahash::{AHashMap, AHashSet};
use cosim_similarity::MeasureRegistry;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a batch processing run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
    /// Items whose neighbour list was rebuilt
    pub processed: usize,
    /// Items skipped because another worker held their lease
    pub conflicts: usize,
    /// Items left dirty after an error
    pub failed: Vec<ItemId>,
}

impl ProcessReport {
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.conflicts == 0 && self.failed.is_empty()
    }
}

/// An item-to-item recommender over weighted input matrices
///
/// All state lives in the store, so several `Recommender` instances (in the
/// same or different processes) built from the same configuration and store
/// cooperate safely.
pub struct Recommender {
    config: RecommenderConfig,
    store: Arc<dyn SparseMatrixStore>,
    keys: Keyspace,
    matrices: Vec<InputMatrix>,
    index: AHashMap<String, usize>,
    dirty: DirtyTracker,
    pool: rayon::ThreadPool,
}

impl Recommender {
    /// Build a recommender using the built-in similarity measures
    pub fn new(config: RecommenderConfig, store: Arc<dyn SparseMatrixStore>) -> Result<Self> {
        Self::with_registry(config, store, &MeasureRegistry::new())
    }

    /// Build a recommender resolving measures through `registry`
    pub fn with_registry(
        config: RecommenderConfig,
        store: Arc<dyn SparseMatrixStore>,
        registry: &MeasureRegistry,
    ) -> Result<Self> {
        config.validate(registry)?;

        let keys = Keyspace::new(&config.name);
        let mut matrices = Vec::with_capacity(config.matrices.len());
        let mut index = AHashMap::new();
        for (idx, matrix) in config.matrices.iter().enumerate() {
            let function = registry.resolve(&matrix.measure)?;
            matrices.push(InputMatrix::new(
                &matrix.name,
                matrix.weight,
                function,
                store.clone(),
                keys.clone(),
            ));
            index.insert(matrix.name.clone(), idx);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallelism)
            .thread_name(|i| format!("cosim-process-{}", i))
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;

        let dirty = DirtyTracker::new(store.clone(), &keys);

        debug!(
            recommender = %config.name,
            matrices = matrices.len(),
            max_neighbors = config.max_neighbors,
            "recommender initialized"
        );

        Ok(Self {
            config,
            store,
            keys,
            matrices,
            index,
            dirty,
            pool,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    pub fn max_neighbors(&self) -> usize {
        self.config.max_neighbors
    }

    pub fn matrices(&self) -> &[InputMatrix] {
        &self.matrices
    }

    #[inline]
    pub fn matrix(&self, name: &str) -> Result<&InputMatrix> {
        self.index
            .get(name)
            .map(|&idx| &self.matrices[idx])
            .ok_or_else(|| Error::MatrixNotFound(name.to_string()))
    }

    /// Ingest one interaction set into `matrix` and mark its items dirty
    ///
    /// Items are marked before any count is written, so a set that fails
    /// halfway still gets its items reprocessed by the next run.
    pub fn add_set<S: AsRef<str>>(&self, matrix: &str, bucket: &str, items: &[S]) -> Result<Vec<ItemId>> {
        let matrix = self.matrix(matrix)?;
        let distinct = distinct_items(bucket, items)?;
        self.dirty.mark(&distinct)?;
        matrix.record(bucket, &distinct)?;
        Ok(distinct)
    }

    /// Rebuild the neighbour list of one item
    ///
    /// Fails with [`Error::ConcurrentProcessingConflict`] if the item is being
    /// processed or removed elsewhere. On any failure the item is left dirty.
    pub fn process_item(&self, item: &str) -> Result<Vec<NeighborEntry>> {
        if let Some(problem) = token_problem(item) {
            return Err(Error::InvalidInteraction(problem));
        }
        let lease = ItemLease::acquire(self.store.clone(), &self.keys, item, self.config.lease_ttl())?;

        let generation = self.dirty.generation(item)?;
        match self.rebuild(item, generation, &lease) {
            Ok(neighbors) => Ok(neighbors),
            Err(e) => {
                if generation == 0 {
                    if let Err(mark_err) = self.dirty.mark(&[item]) {
                        warn!(item, error = %mark_err, "could not mark failed item dirty");
                    }
                }
                Err(e)
            }
        }
    }

    fn rebuild(&self, item: &str, generation: i64, lease: &ItemLease) -> Result<Vec<NeighborEntry>> {
        let row = composite_row(&self.matrices, item)?;
        let candidates = row.len();
        // scoring may outlive the ttl; the list write must not
        lease.renew()?;
        let neighbors = topn::select(
            self.store.as_ref(),
            &self.keys.neighbors(item),
            item,
            row,
            self.config.max_neighbors,
        )?;
        self.dirty.clear(item, generation)?;

        debug!(item, candidates, neighbors = neighbors.len(), "item processed");
        Ok(neighbors)
    }

    /// Process every item that is dirty when the run starts
    ///
    /// Items are processed in parallel on the recommender's pool. Items that
    /// become dirty during the run are left for the next one.
    pub fn process(&self) -> Result<ProcessReport> {
        let snapshot: Vec<ItemId> = self
            .dirty
            .snapshot()?
            .into_iter()
            .map(|(item, _)| item)
            .collect();
        let report = self.process_batch(&snapshot);

        info!(
            recommender = %self.config.name,
            dirty = snapshot.len(),
            processed = report.processed,
            conflicts = report.conflicts,
            failed = report.failed.len(),
            "processing run finished"
        );
        Ok(report)
    }

    /// Process an explicit batch of items, dirty or not
    pub fn process_items<S: AsRef<str>>(&self, items: &[S]) -> ProcessReport {
        let mut seen = AHashSet::new();
        let batch: Vec<ItemId> = items
            .iter()
            .map(|item| item.as_ref())
            .filter(|item| seen.insert(*item))
            .map(str::to_string)
            .collect();
        self.process_batch(&batch)
    }

    fn process_batch(&self, items: &[ItemId]) -> ProcessReport {
        let outcomes: Vec<(&ItemId, Result<Vec<NeighborEntry>>)> = self.pool.install(|| {
            items
                .par_iter()
                .map(|item| (item, self.process_item(item)))
                .collect()
        });

        let mut report = ProcessReport::default();
        for (item, outcome) in outcomes {
            match outcome {
                Ok(_) => report.processed += 1,
                Err(Error::ConcurrentProcessingConflict(_)) => {
                    debug!(item = %item, "item busy, left for a later run");
                    report.conflicts += 1;
                }
                Err(e) => {
                    warn!(item = %item, error = %e, "item processing failed");
                    report.failed.push(item.clone());
                }
            }
        }
        report
    }

    /// Stored neighbour list of `item`, best first
    ///
    /// Never recomputes; an item that was never processed has no neighbours.
    pub fn neighbors(&self, item: &str) -> Result<Vec<NeighborEntry>> {
        self.store.get_ordered_list(&self.keys.neighbors(item))
    }

    /// One page of the neighbour list of `item`
    pub fn neighbors_page(&self, item: &str, offset: usize, limit: usize) -> Result<Vec<NeighborEntry>> {
        Ok(self
            .neighbors(item)?
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    /// Erase an item from every matrix and neighbour list
    ///
    /// Set counts are kept. Former partners lose the item from their lists
    /// and are marked dirty so the next run refills them.
    pub fn remove_item(&self, item: &str) -> Result<()> {
        if let Some(problem) = token_problem(item) {
            return Err(Error::InvalidInteraction(problem));
        }
        let _lease = ItemLease::acquire(self.store.clone(), &self.keys, item, self.config.lease_ttl())?;

        let mut partners = AHashSet::new();
        for matrix in &self.matrices {
            partners.extend(matrix.purge_item(item)?);
        }
        self.store.set_ordered_list(&self.keys.neighbors(item), &[])?;
        let partners = self.detach(item, partners)?;
        self.dirty.forget(item)?;

        info!(recommender = %self.config.name, item, partners = partners.len(), "item removed");
        Ok(())
    }

    /// Erase an item from a single input matrix
    ///
    /// Other matrices may still relate the item to its former partners, so
    /// both sides are marked dirty instead of being deleted outright.
    pub fn remove_item_from_matrix(&self, matrix: &str, item: &str) -> Result<()> {
        let matrix = self.matrix(matrix)?;
        if let Some(problem) = token_problem(item) {
            return Err(Error::InvalidInteraction(problem));
        }
        let _lease = ItemLease::acquire(self.store.clone(), &self.keys, item, self.config.lease_ttl())?;

        let partners: AHashSet<ItemId> = matrix.purge_item(item)?.into_iter().collect();
        let partners = self.detach(item, partners)?;
        self.dirty.mark(&[item])?;

        info!(
            recommender = %self.config.name,
            matrix = %matrix.name(),
            item,
            partners = partners.len(),
            "item removed from matrix"
        );
        Ok(())
    }

    /// Drop `item` from the partners' lists and mark the partners dirty
    fn detach(&self, item: &str, partners: AHashSet<ItemId>) -> Result<Vec<ItemId>> {
        let mut partners: Vec<ItemId> = partners.into_iter().filter(|p| p != item).collect();
        partners.sort();
        for partner in &partners {
            self.store.remove_member(&self.keys.neighbors(partner), item)?;
        }
        self.dirty.mark(&partners)?;
        Ok(partners)
    }

    /// Items waiting to be processed, ordered by id
    pub fn dirty_items(&self) -> Result<Vec<ItemId>> {
        Ok(self
            .dirty
            .snapshot()?
            .into_iter()
            .map(|(item, _)| item)
            .collect())
    }

    pub fn is_dirty(&self, item: &str) -> Result<bool> {
        self.dirty.is_dirty(item)
    }

    pub fn co_occurrence(&self, matrix: &str, a: &str, b: &str) -> Result<u64> {
        self.matrix(matrix)?.co_occurrence(a, b)
    }

    pub fn marginal(&self, matrix: &str, item: &str) -> Result<u64> {
        self.matrix(matrix)?.marginal(item)
    }

    pub fn set_count(&self, matrix: &str) -> Result<u64> {
        self.matrix(matrix)?.set_count()
    }
}

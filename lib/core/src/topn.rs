//! Top-N neighbour selection

use crate::aggregate::CompositeRow;
use crate::item::NeighborEntry;
use crate::store::SparseMatrixStore;
use crate::Result;
use ordered_float::OrderedFloat;
use std::cmp::Ordering;

/// Score descending, then id ascending
#[inline]
fn by_rank(a: &NeighborEntry, b: &NeighborEntry) -> Ordering {
    OrderedFloat(b.score)
        .cmp(&OrderedFloat(a.score))
        .then_with(|| a.item.cmp(&b.item))
}

/// Keep the `max_neighbors` best candidates of `item`, best first
///
/// The source item itself and NaN scores are never kept.
pub fn rank(item: &str, row: CompositeRow, max_neighbors: usize) -> Vec<NeighborEntry> {
    let mut entries: Vec<NeighborEntry> = row
        .into_iter()
        .filter(|(candidate, score)| candidate != item && !score.is_nan())
        .map(|(candidate, score)| NeighborEntry::new(candidate, score))
        .collect();

    if max_neighbors == 0 {
        return Vec::new();
    }
    if entries.len() > max_neighbors {
        entries.select_nth_unstable_by(max_neighbors - 1, by_rank);
        entries.truncate(max_neighbors);
    }
    entries.sort_unstable_by(by_rank);
    entries
}

/// Rank `row` and store it as the neighbour list under `key`
pub fn select(
    store: &dyn SparseMatrixStore,
    key: &str,
    item: &str,
    row: CompositeRow,
    max_neighbors: usize,
) -> Result<Vec<NeighborEntry>> {
    let neighbors = rank(item, row, max_neighbors);
    store.set_ordered_list(key, &neighbors)?;
    Ok(neighbors)
}

//! Weighted combination of input matrices
//!
//! The composite score of a candidate is `sum(weight_m * score_m)` over every
//! input matrix. A matrix where the pair never co-occurred contributes 0, so
//! the candidate set is the union of the per-matrix rows.

use crate::item::ItemId;
use crate::matrix::InputMatrix;
use crate::Result;
use ahash::AHashMap;

pub type CompositeRow = AHashMap<ItemId, f64>;

/// Composite scores of every candidate related to `item`
pub fn composite_row(matrices: &[InputMatrix], item: &str) -> Result<CompositeRow> {
    let mut composite = CompositeRow::new();
    for matrix in matrices {
        let weight = matrix.weight();
        for entry in matrix.similarity_row(item)? {
            let (candidate, score) = entry?;
            let contribution = weight * score;
            if contribution == 0.0 {
                continue;
            }
            *composite.entry(candidate).or_insert(0.0) += contribution;
        }
    }
    Ok(composite)
}

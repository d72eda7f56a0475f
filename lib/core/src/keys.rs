// Store key layout for one recommender
//
// {rec}:{matrix}:cc                 co-occurrence matrix (cells)
// {rec}:{matrix}:marginal:{item}    marginal count (scalar)
// {rec}:{matrix}:sets               set count (scalar)
// {rec}:dirty  row "*"              dirty generations (cells)
// {rec}:neighbors:{item}            neighbour list (ordered list)
// {rec}:lease:{item}                processing lease

/// Row of the dirty matrix holding every dirty item
pub const DIRTY_ROW: &str = "*";

#[derive(Debug, Clone)]
pub struct Keyspace {
    prefix: String,
}

impl Keyspace {
    pub fn new(recommender: &str) -> Self {
        Self {
            prefix: recommender.to_string(),
        }
    }

    #[inline]
    pub fn cooccurrence(&self, matrix: &str) -> String {
        format!("{}:{}:cc", self.prefix, matrix)
    }

    #[inline]
    pub fn marginal(&self, matrix: &str, item: &str) -> String {
        format!("{}:{}:marginal:{}", self.prefix, matrix, item)
    }

    #[inline]
    pub fn set_count(&self, matrix: &str) -> String {
        format!("{}:{}:sets", self.prefix, matrix)
    }

    #[inline]
    pub fn dirty(&self) -> String {
        format!("{}:dirty", self.prefix)
    }

    #[inline]
    pub fn neighbors(&self, item: &str) -> String {
        format!("{}:neighbors:{}", self.prefix, item)
    }

    #[inline]
    pub fn lease(&self, item: &str) -> String {
        format!("{}:lease:{}", self.prefix, item)
    }
}

// Item identifiers and neighbour entries
use serde::{Deserialize, Serialize};

/// Opaque identifier of one recommendable entity
pub type ItemId = String;

/// Characters used by store keys; forbidden in ids and names
pub const RESERVED_CHARS: [char; 2] = [':', '|'];

/// One entry of a neighbour list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborEntry {
    pub item: ItemId,
    pub score: f64,
}

impl NeighborEntry {
    #[inline]
    #[must_use]
    pub fn new(item: impl Into<ItemId>, score: f64) -> Self {
        Self {
            item: item.into(),
            score,
        }
    }
}

/// Why a token can't be used as an id, if it can't
pub fn token_problem(token: &str) -> Option<String> {
    if token.is_empty() {
        return Some("empty identifier".to_string());
    }
    if let Some(c) = token
        .chars()
        .find(|c| RESERVED_CHARS.contains(c) || c.is_control())
    {
        return Some(format!("identifier {:?} contains reserved character {:?}", token, c));
    }
    None
}

#[inline]
#[must_use]
pub fn is_valid_token(token: &str) -> bool {
    token_problem(token).is_none()
}

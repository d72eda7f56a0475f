//! Similarity measures for co-occurrence counts
//!
//! All built-in measures return a score in `[0.0, 1.0]` for consistent
//! counts (`co <= a`, `co <= b`), where higher means more similar.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Counts describing one item pair inside one input matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PairCounts {
    /// Number of sets containing both items
    pub co: u64,
    /// Number of sets containing the source item
    pub a: u64,
    /// Number of sets containing the candidate item
    pub b: u64,
    /// Number of sets ingested into the matrix
    pub sets: u64,
}

impl PairCounts {
    #[inline]
    #[must_use]
    pub fn new(co: u64, a: u64, b: u64, sets: u64) -> Self {
        Self { co, a, b, sets }
    }
}

/// A similarity strategy
///
/// Implementations must be pure: the same counts always give the same score.
/// The engine only assumes that higher scores mean "more similar".
pub trait SimilarityFunction: Send + Sync {
    /// Name under which the strategy is registered
    fn name(&self) -> &str;

    /// Score one pair
    fn score(&self, counts: &PairCounts) -> f64;
}

/// Built-in measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measure {
    Jaccard,
    Cosine,
    Sorensen,
}

impl Measure {
    pub const ALL: [Measure; 3] = [Measure::Jaccard, Measure::Cosine, Measure::Sorensen];

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Measure::Jaccard => "jaccard",
            Measure::Cosine => "cosine",
            Measure::Sorensen => "sorensen",
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Measure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jaccard" | "jaccard_index" => Ok(Measure::Jaccard),
            "cosine" => Ok(Measure::Cosine),
            "sorensen" | "sorensen_coefficient" | "dice" => Ok(Measure::Sorensen),
            other => Err(format!("unknown similarity measure: {}", other)),
        }
    }
}

impl SimilarityFunction for Measure {
    fn name(&self) -> &str {
        self.as_str()
    }

    #[inline]
    fn score(&self, counts: &PairCounts) -> f64 {
        match self {
            Measure::Jaccard => jaccard(counts.co, counts.a, counts.b),
            Measure::Cosine => cosine(counts.co, counts.a, counts.b),
            Measure::Sorensen => sorensen(counts.co, counts.a, counts.b),
        }
    }
}

/// Jaccard index: `c / (a + b - c)`
///
/// Returns 0.0 when the union is empty.
#[inline]
pub fn jaccard(co: u64, a: u64, b: u64) -> f64 {
    let union = (a + b).saturating_sub(co);
    if union == 0 {
        0.0
    } else {
        co as f64 / union as f64
    }
}

/// Cosine similarity of two binary occurrence vectors: `c / sqrt(a * b)`
///
/// Returns 0.0 when either item never appeared.
#[inline]
pub fn cosine(co: u64, a: u64, b: u64) -> f64 {
    if a == 0 || b == 0 {
        0.0
    } else {
        co as f64 / ((a as f64) * (b as f64)).sqrt()
    }
}

/// Sorensen-Dice coefficient: `2c / (a + b)`
#[inline]
pub fn sorensen(co: u64, a: u64, b: u64) -> f64 {
    let total = a + b;
    if total == 0 {
        0.0
    } else {
        (2 * co) as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_jaccard_known_values() {
        assert_eq!(jaccard(1, 1, 1), 1.0);
        assert_eq!(jaccard(1, 2, 1), 0.5);
        assert_eq!(jaccard(0, 3, 4), 0.0);
    }

    #[test]
    fn test_jaccard_empty_denominator() {
        assert_eq!(jaccard(0, 0, 0), 0.0);
    }

    #[test]
    fn test_cosine_known_values() {
        assert_eq!(cosine(2, 4, 1), 1.0);
        assert!((cosine(1, 2, 2) - 0.5).abs() < 1e-12);
        assert_eq!(cosine(1, 0, 3), 0.0);
        assert_eq!(cosine(1, 3, 0), 0.0);
    }

    #[test]
    fn test_sorensen_known_values() {
        assert_eq!(sorensen(1, 1, 1), 1.0);
        assert!((sorensen(1, 2, 1) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(sorensen(0, 0, 0), 0.0);
    }

    #[test]
    fn test_scores_bounded() {
        let mut rng = rand::rng();
        for _ in 0..10_000 {
            let co: u64 = rng.random_range(0..50);
            let a = co + rng.random_range(0..50);
            let b = co + rng.random_range(0..50);
            let counts = PairCounts::new(co, a, b, a.max(b));
            for measure in Measure::ALL {
                let score = measure.score(&counts);
                assert!(
                    (0.0..=1.0).contains(&score),
                    "{} out of range for {:?}: {}",
                    measure,
                    counts,
                    score
                );
            }
        }
    }

    #[test]
    fn test_measure_from_str() {
        assert_eq!("jaccard".parse::<Measure>().unwrap(), Measure::Jaccard);
        assert_eq!("Cosine".parse::<Measure>().unwrap(), Measure::Cosine);
        assert_eq!("dice".parse::<Measure>().unwrap(), Measure::Sorensen);
        assert!("pearson".parse::<Measure>().is_err());
    }

    #[test]
    fn test_measure_serde_names() {
        let json = serde_json::to_string(&Measure::Sorensen).unwrap();
        assert_eq!(json, "\"sorensen\"");
        let back: Measure = serde_json::from_str("\"cosine\"").unwrap();
        assert_eq!(back, Measure::Cosine);
    }
}

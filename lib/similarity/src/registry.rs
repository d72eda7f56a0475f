//! Name-keyed table of similarity strategies
//!
//! Configuration refers to measures by name. The registry resolves those
//! names to strategies, starting with the built-in [`Measure`] variants.

use crate::measure::{Measure, SimilarityFunction};
use ahash::AHashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown similarity measure: {0}")]
    UnknownMeasure(String),

    #[error("Similarity measure already registered: {0}")]
    DuplicateMeasure(String),
}

/// Registered similarity strategies
#[derive(Clone)]
pub struct MeasureRegistry {
    measures: AHashMap<String, Arc<dyn SimilarityFunction>>,
}

impl MeasureRegistry {
    /// Registry holding the built-in measures
    pub fn new() -> Self {
        let mut measures: AHashMap<String, Arc<dyn SimilarityFunction>> = AHashMap::new();
        for measure in Measure::ALL {
            measures.insert(measure.as_str().to_string(), Arc::new(measure));
        }
        Self { measures }
    }

    /// Register a custom strategy under its own name
    ///
    /// Names already taken, including built-in aliases, are rejected.
    pub fn register(&mut self, function: Arc<dyn SimilarityFunction>) -> Result<(), RegistryError> {
        let name = function.name().to_ascii_lowercase();
        if self.measures.contains_key(&name) || name.parse::<Measure>().is_ok() {
            return Err(RegistryError::DuplicateMeasure(name));
        }
        self.measures.insert(name, function);
        Ok(())
    }

    /// Resolve a strategy by name
    ///
    /// Built-in aliases (`jaccard_index`, `dice`, ...) resolve to the
    /// corresponding built-in measure.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn SimilarityFunction>, RegistryError> {
        let key = name.to_ascii_lowercase();
        if let Some(function) = self.measures.get(&key) {
            return Ok(function.clone());
        }
        match key.parse::<Measure>() {
            Ok(measure) => Ok(Arc::new(measure)),
            Err(_) => Err(RegistryError::UnknownMeasure(name.to_string())),
        }
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.measures.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for MeasureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MeasureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeasureRegistry")
            .field("measures", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::PairCounts;

    struct Overlap;

    impl SimilarityFunction for Overlap {
        fn name(&self) -> &str {
            "overlap"
        }

        fn score(&self, counts: &PairCounts) -> f64 {
            let min = counts.a.min(counts.b);
            if min == 0 {
                0.0
            } else {
                counts.co as f64 / min as f64
            }
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = MeasureRegistry::new();
        assert_eq!(registry.names(), vec!["cosine", "jaccard", "sorensen"]);
        assert!(registry.contains("JACCARD"));
        assert!(registry.contains("jaccard_index"));
    }

    #[test]
    fn test_register_custom() {
        let mut registry = MeasureRegistry::new();
        registry.register(Arc::new(Overlap)).unwrap();

        let function = registry.resolve("overlap").unwrap();
        let score = function.score(&PairCounts::new(2, 2, 8, 10));
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_register_duplicate() {
        let mut registry = MeasureRegistry::new();
        registry.register(Arc::new(Overlap)).unwrap();
        assert_eq!(
            registry.register(Arc::new(Overlap)).unwrap_err(),
            RegistryError::DuplicateMeasure("overlap".to_string())
        );
    }

    #[test]
    fn test_unknown_measure() {
        let registry = MeasureRegistry::new();
        assert!(matches!(
            registry.resolve("pearson"),
            Err(RegistryError::UnknownMeasure(_))
        ));
    }

    struct Named(&'static str);

    impl SimilarityFunction for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn score(&self, _counts: &PairCounts) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_register_rejects_builtin_aliases() {
        let mut registry = MeasureRegistry::new();
        for alias in ["dice", "Jaccard_Index", "sorensen_coefficient", "cosine"] {
            assert_eq!(
                registry.register(Arc::new(Named(alias))).unwrap_err(),
                RegistryError::DuplicateMeasure(alias.to_ascii_lowercase())
            );
        }
        assert_eq!(registry.resolve("dice").unwrap().name(), "sorensen");
    }
}

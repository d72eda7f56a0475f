use crate::item::token_problem;
use crate::{Error, Result};
use cosim_similarity::MeasureRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Configuration for one input matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputMatrixConfig {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Name of a registered similarity measure
    #[serde(default = "default_measure")]
    pub measure: String,
}

impl InputMatrixConfig {
    pub fn new(name: &str, weight: f64, measure: &str) -> Self {
        Self {
            name: name.to_string(),
            weight,
            measure: measure.to_string(),
        }
    }
}

/// Configuration for a recommender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommenderConfig {
    pub name: String,
    /// Cap on the length of every neighbour list
    #[serde(default = "default_max_neighbors")]
    pub max_neighbors: usize,
    /// Worker threads used by a full processing run
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// How long a processing lease stays valid if its holder dies
    #[serde(default = "default_lease_ttl_ms")]
    pub lease_ttl_ms: u64,
    pub matrices: Vec<InputMatrixConfig>,
}

fn default_weight() -> f64 {
    1.0
}

fn default_measure() -> String {
    "jaccard".to_string()
}

fn default_max_neighbors() -> usize {
    128
}

fn default_parallelism() -> usize {
    4
}

fn default_lease_ttl_ms() -> u64 {
    30_000
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            max_neighbors: default_max_neighbors(),
            parallelism: default_parallelism(),
            lease_ttl_ms: default_lease_ttl_ms(),
            matrices: Vec::new(),
        }
    }
}

impl RecommenderConfig {
    pub fn new(name: &str, max_neighbors: usize, matrices: Vec<InputMatrixConfig>) -> Self {
        Self {
            name: name.to_string(),
            max_neighbors,
            matrices,
            ..Self::default()
        }
    }

    /// Load a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        Ok(serde_json::from_str(&data)?)
    }

    #[inline]
    #[must_use]
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms)
    }

    /// Check the configuration against the measures known to `registry`
    pub fn validate(&self, registry: &MeasureRegistry) -> Result<()> {
        if let Some(problem) = token_problem(&self.name) {
            return Err(Error::InvalidConfig(format!("recommender name: {}", problem)));
        }
        if self.max_neighbors == 0 {
            return Err(Error::InvalidConfig("max_neighbors must be at least 1".to_string()));
        }
        if self.parallelism == 0 {
            return Err(Error::InvalidConfig("parallelism must be at least 1".to_string()));
        }
        if self.matrices.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "recommender {} has no input matrices",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for matrix in &self.matrices {
            if let Some(problem) = token_problem(&matrix.name) {
                return Err(Error::InvalidConfig(format!("matrix name: {}", problem)));
            }
            if !seen.insert(matrix.name.as_str()) {
                return Err(Error::InvalidConfig(format!("duplicate matrix: {}", matrix.name)));
            }
            if !matrix.weight.is_finite() || matrix.weight <= 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "matrix {} weight must be positive, got {}",
                    matrix.name, matrix.weight
                )));
            }
            registry.resolve(&matrix.measure)?;
        }
        Ok(())
    }
}

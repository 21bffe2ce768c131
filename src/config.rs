use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Maximum rounds of local moving inside a single pass.
pub const MAX_LOCAL_ROUNDS: usize = 10;

/// Maximum passes (local moving + aggregation) of the driver loop.
pub const MAX_PASSES: usize = 10;

/// Weight of an edge whose weight column is absent.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Sentinel gain used when a vertex has no candidate community.
pub(crate) const NO_GAIN: f64 = -1.0;

pub(crate) const READ_BUFFER_SIZE: usize = 8 * 1024 * 1024;

/// Tunable parameters of a Louvain run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LouvainConfig {
    pub max_local_rounds: usize, // Round cap of the local moving phase.
    pub max_passes: usize, // Pass cap of the driver loop.
    pub seed: Option<u64>, // Seed of the visiting order, random if absent.
    pub merge_duplicates: bool, // Sum repeated edges when reading edge files.
}

impl Default for LouvainConfig {
    fn default() -> Self {
        Self {
            max_local_rounds: MAX_LOCAL_ROUNDS,
            max_passes: MAX_PASSES,
            seed: None,
            merge_duplicates: false,
        }
    }
}

impl LouvainConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_local_rounds(mut self, rounds: usize) -> Self {
        self.max_local_rounds = rounds;
        self
    }

    pub fn with_max_passes(mut self, passes: usize) -> Self {
        self.max_passes = passes;
        self
    }

    pub fn with_merge_duplicates(mut self, merge: bool) -> Self {
        self.merge_duplicates = merge;
        self
    }

    /// Load a configuration from a YAML file. Missing keys keep their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open config {}", path.display()))?;
        let config: LouvainConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Both caps must allow at least one iteration.
    pub fn validate(&self) -> Result<()> {
        if self.max_local_rounds == 0 {
            bail!("max_local_rounds must be at least 1");
        }
        if self.max_passes == 0 {
            bail!("max_passes must be at least 1");
        }
        Ok(())
    }
}

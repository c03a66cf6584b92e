//! Store configuration via `corpus.toml`
//!
//! A simple config file in the data directory instead of a builder
//! chain. On first open of a persistent store, a default `corpus.toml`
//! is created. To change settings, edit the file and reopen.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Config file name placed in the store data directory.
pub const CONFIG_FILE_NAME: &str = "corpus.toml";

/// How aggressively the WAL is synced to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// Buffered writes, flushed on append, fsync left to the OS.
    /// May lose the last few appends on power loss.
    #[default]
    Standard,
    /// fsync after every append. Zero data loss, slower writes.
    Always,
}

/// Parameters for the clustered (IVF) index backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvfParams {
    /// Number of clusters to probe at query time.
    #[serde(default = "default_nprobe")]
    pub nprobe: usize,
    /// Rebuild when the largest cluster exceeds this multiple of the
    /// mean cluster size.
    #[serde(default = "default_rebalance_factor")]
    pub rebalance_factor: f32,
    /// k-means iterations per rebuild.
    #[serde(default = "default_kmeans_iters")]
    pub kmeans_iters: usize,
    /// Seed for centroid initialization. Fixed so rebuilds are
    /// reproducible in tests.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_nprobe() -> usize {
    4
}

fn default_rebalance_factor() -> f32 {
    4.0
}

fn default_kmeans_iters() -> usize {
    10
}

fn default_seed() -> u64 {
    0x5eed
}

impl Default for IvfParams {
    fn default() -> Self {
        IvfParams {
            nprobe: default_nprobe(),
            rebalance_factor: default_rebalance_factor(),
            kmeans_iters: default_kmeans_iters(),
            seed: default_seed(),
        }
    }
}

/// Index strategy per collection.
///
/// The index is an optimization; the record store is ground truth.
/// `Auto` serves exact brute-force scans until a collection outgrows
/// `exact_threshold`, then switches to the clustered backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IndexMode {
    /// Always exact brute-force scan.
    Exact,
    /// Always the clustered approximate backend.
    Clustered {
        /// IVF parameters
        #[serde(default)]
        ivf: IvfParams,
    },
    /// Exact below the threshold, clustered above it.
    Auto {
        /// Collection size at which the clustered backend takes over.
        #[serde(default = "default_exact_threshold")]
        exact_threshold: usize,
        /// IVF parameters used once switched.
        #[serde(default)]
        ivf: IvfParams,
    },
}

fn default_exact_threshold() -> usize {
    10_000
}

impl Default for IndexMode {
    fn default() -> Self {
        IndexMode::Auto {
            exact_threshold: default_exact_threshold(),
            ivf: IvfParams::default(),
        }
    }
}

/// Store configuration loaded from `corpus.toml`.
///
/// # Example
///
/// ```toml
/// # Durability mode: "standard" (default) or "always"
/// durability = "standard"
///
/// [index]
/// mode = "auto"
/// exact_threshold = 10000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Durability mode: `"standard"` or `"always"`.
    #[serde(default = "default_durability_str")]
    pub durability: String,
    /// Index strategy.
    #[serde(default)]
    pub index: IndexMode,
}

fn default_durability_str() -> String {
    "standard".to_string()
}

impl Default for CorpusConfig {
    fn default() -> Self {
        CorpusConfig {
            durability: default_durability_str(),
            index: IndexMode::default(),
        }
    }
}

impl CorpusConfig {
    /// Parse the durability string into a `DurabilityMode`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the string is not `"standard"` or
    /// `"always"`.
    pub fn durability_mode(&self) -> Result<DurabilityMode> {
        match self.durability.as_str() {
            "standard" => Ok(DurabilityMode::Standard),
            "always" => Ok(DurabilityMode::Always),
            other => Err(Error::invalid_argument(format!(
                "invalid durability mode '{}' in {} (expected \"standard\" or \"always\")",
                other, CONFIG_FILE_NAME
            ))),
        }
    }

    /// Load config from `dir/corpus.toml`, writing the default file
    /// if it does not exist yet.
    pub fn load_or_init(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let config: CorpusConfig = toml::from_str(&raw)
                .map_err(|e| Error::invalid_argument(format!("bad {}: {}", CONFIG_FILE_NAME, e)))?;
            // Fail early on a bad durability string rather than at first write
            config.durability_mode()?;
            Ok(config)
        } else {
            let config = CorpusConfig::default();
            let raw = toml::to_string_pretty(&config)
                .map_err(|e| Error::Serialization(e.to_string()))?;
            std::fs::write(&path, raw)?;
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CorpusConfig::default();
        assert_eq!(config.durability_mode().unwrap(), DurabilityMode::Standard);
        match config.index {
            IndexMode::Auto {
                exact_threshold, ..
            } => assert_eq!(exact_threshold, 10_000),
            _ => panic!("default index mode should be Auto"),
        }
    }

    #[test]
    fn test_invalid_durability_rejected() {
        let config = CorpusConfig {
            durability: "paranoid".to_string(),
            index: IndexMode::default(),
        };
        assert!(config.durability_mode().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = CorpusConfig {
            durability: "always".to_string(),
            index: IndexMode::Clustered {
                ivf: IvfParams {
                    nprobe: 8,
                    ..IvfParams::default()
                },
            },
        };
        let raw = toml::to_string_pretty(&config).unwrap();
        let parsed: CorpusConfig = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.durability, "always");
        match parsed.index {
            IndexMode::Clustered { ivf } => assert_eq!(ivf.nprobe, 8),
            _ => panic!("expected clustered mode"),
        }
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: CorpusConfig = toml::from_str("").unwrap();
        assert_eq!(parsed.durability, "standard");

        let parsed: CorpusConfig =
            toml::from_str("[index]\nmode = \"exact\"\n").unwrap();
        assert_eq!(parsed.index, IndexMode::Exact);
    }

    #[test]
    fn test_load_or_init_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = CorpusConfig::load_or_init(dir.path()).unwrap();
        assert_eq!(config.durability, "standard");
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());

        // Second load reads the file back.
        let again = CorpusConfig::load_or_init(dir.path()).unwrap();
        assert_eq!(again.durability, "standard");
    }
}

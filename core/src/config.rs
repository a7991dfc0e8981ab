//! Configuration types for the Safe application index

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SafeError, SafeResult};

/// Main node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node name for logging
    pub name: String,

    /// Data directory
    pub data_dir: PathBuf,

    /// Logging level (overridden by RUST_LOG)
    pub log_level: String,

    /// Index store configuration
    pub index: IndexConfig,

    /// Application protocol parameters
    pub protocol: ProtocolConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "safe-index".to_string(),
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            index: IndexConfig::default(),
            protocol: ProtocolConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn from_json(json: &str) -> SafeResult<Self> {
        serde_json::from_str(json).map_err(|e| SafeError::Config(e.to_string()))
    }

    pub fn to_json(&self) -> SafeResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SafeError::Config(e.to_string()))
    }

    /// Load a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> SafeResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SafeError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Directory holding the index database
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("appindex")
    }
}

/// Storage engine backing the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Memory,
    Sled,
}

/// Index store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub engine: EngineKind,

    /// Page cache for the sled engine in bytes
    pub cache_capacity_bytes: u64,

    /// Flush to disk after every committed batch
    pub flush_on_commit: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::Sled,
            cache_capacity_bytes: 100 * 1024 * 1024,
            flush_on_commit: true,
        }
    }
}

/// Application protocol parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Version written into every command header
    pub header_version: u16,

    pub blocks_per_day: u32,

    pub blocks_per_month: u32,

    /// Live candy offers allowed per asset
    pub max_live_candy_offers: usize,

    /// Blocks an offer must age before it can be claimed
    pub candy_claim_delay_blocks: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            header_version: 1,
            blocks_per_day: 576, // 2.5 minute blocks
            blocks_per_month: 17_280,
            max_live_candy_offers: 5,
            candy_claim_delay_blocks: 576,
        }
    }
}

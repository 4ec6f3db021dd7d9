use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use storesync_core::Address;

use crate::error::EngineError;

/// Indexer settings. Every key is optional in the TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexerConfig {
    /// JSON-RPC URL of the node.
    pub endpoint: String,
    pub starting_height: u64,
    /// Maximum number of blocks requested per poll.
    pub max_block_span: u64,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
    pub change_log_capacity: usize,
    /// Ingest only records emitted by this store contract.
    pub world_address: Option<Address>,
    pub log_file: Option<PathBuf>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8545".to_string(),
            starting_height: 0,
            max_block_span: 500,
            poll_interval: Duration::from_millis(100),
            fetch_timeout: Duration::from_secs(5),
            change_log_capacity: 10_000,
            world_address: None,
            log_file: None,
        }
    }
}

impl IndexerConfig {
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_block_span == 0 {
            return Err(EngineError::Config("max_block_span must be at least 1".into()));
        }
        if self.fetch_timeout.is_zero() {
            return Err(EngineError::Config("fetch_timeout must be non-zero".into()));
        }
        if self.endpoint.is_empty() {
            return Err(EngineError::Config("endpoint is empty".into()));
        }
        Ok(())
    }
}

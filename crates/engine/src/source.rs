use std::time::Duration;

use async_trait::async_trait;
use storesync_core::LogRecord;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transport: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Where store event records come from.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn chain_id(&self) -> Result<u64, SourceError>;

    /// Height of the newest block the source knows about.
    async fn latest_height(&self) -> Result<u64, SourceError>;

    /// Store event records in blocks `from..=to`, in any order.
    async fn fetch_logs(&self, from: u64, to: u64) -> Result<Vec<LogRecord>, SourceError>;
}

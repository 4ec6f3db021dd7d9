use storesync_core::DecodeError;
use storesync_storage::StorageError;
use thiserror::Error;

use crate::reconcile::ConsistencyViolation;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("row not found: {table} {key}")]
    RowNotFound { table: String, key: String },

    #[error("field not found: {table}.{field}")]
    FieldNotFound { table: String, field: String },

    #[error("config error: {0}")]
    Config(String),
}

/// Errors that stop ingestion. Everything else is logged and skipped.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("consistency violation: {0}")]
    Consistency(#[from] ConsistencyViolation),
}

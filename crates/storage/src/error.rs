use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("table {table}: field index {index} out of range for {len} fields")]
    FieldIndex {
        table: String,
        index: usize,
        len: usize,
    },

    #[error("table {table}: row has {actual} fields, schema has {expected}")]
    SchemaMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },
}

use thiserror::Error;

use crate::schema_type::SchemaType;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid {label} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        label: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("value {value} does not fit in {ty}")]
    Overflow { value: String, ty: SchemaType },

    #[error("expected a {ty} value, found {found}")]
    TypeMismatch { ty: SchemaType, found: &'static str },

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Failure to turn raw log bytes into typed values.
///
/// Ingestion logs these and skips the offending record; they never abort a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown schema type tag {tag}")]
    UnknownType { tag: u8 },

    #[error("{context}: expected {expected} bytes, got {actual}")]
    Length {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("field index {index} out of range for a schema of {len} fields")]
    FieldIndex { index: usize, len: usize },

    #[error("malformed {context}: {reason}")]
    Malformed {
        context: &'static str,
        reason: String,
    },

    #[error("unknown event discriminator {topic}")]
    UnknownEvent { topic: String },

    #[error("table {table}: {source}")]
    InTable {
        table: String,
        #[source]
        source: Box<DecodeError>,
    },
}

impl DecodeError {
    pub fn malformed(context: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            context,
            reason: reason.into(),
        }
    }

    /// Attach the table the failing payload belonged to.
    pub fn in_table(self, table: impl Into<String>) -> Self {
        match self {
            Self::InTable { .. } => self,
            other => Self::InTable {
                table: table.into(),
                source: Box::new(other),
            },
        }
    }

    pub fn table(&self) -> Option<&str> {
        match self {
            Self::InTable { table, .. } => Some(table),
            _ => None,
        }
    }

    /// The raw schema type tag that could not be decoded, if that was the cause.
    pub fn type_tag(&self) -> Option<u8> {
        match self {
            Self::UnknownType { tag } => Some(*tag),
            Self::InTable { source, .. } => source.type_tag(),
            _ => None,
        }
    }
}

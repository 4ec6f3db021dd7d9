use crate::field_value::{render_row, Field};

/// The effect of one store event on one row, as seen by readers.
///
/// `fields` is `None` for a deleted row. Predicted (speculative) effects use
/// the same shape so they can be compared with confirmed ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MudMutation {
    /// Human-readable table name.
    pub table: String,
    /// Hex row key, see [`crate::ids::row_key`].
    pub key: String,
    pub fields: Option<Vec<Field>>,
}

impl MudMutation {
    pub fn set(table: impl Into<String>, key: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            fields: Some(fields),
        }
    }

    pub fn delete(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            fields: None,
        }
    }

    /// Single-value row, the common shape for counters and flags.
    pub fn value(table: impl Into<String>, key: impl Into<String>, field: Field) -> Self {
        Self::set(table, key, vec![field])
    }

    pub fn is_delete(&self) -> bool {
        self.fields.is_none()
    }

    pub fn touches(&self, table: &str, key: &str) -> bool {
        self.table == table && self.key == key
    }

    pub fn rendered(&self) -> String {
        render_row(self.fields.as_deref())
    }
}

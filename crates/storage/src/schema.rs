use std::collections::HashMap;

use storesync_core::{Address, SchemaType, TableId};

/// Column names and types of a table's value and key tuples.
///
/// Types arrive through the `mudstore:schema` table and names through
/// `mudstore:StoreMetadata`, so either half may be empty for a while.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    pub value_types: Vec<SchemaType>,
    pub key_types: Vec<SchemaType>,
    pub field_names: Vec<String>,
    named: HashMap<String, SchemaType>,
}

impl TableSchema {
    pub fn new(value_types: Vec<SchemaType>, key_types: Vec<SchemaType>) -> Self {
        let mut schema = Self {
            value_types,
            key_types,
            ..Self::default()
        };
        schema.reindex();
        schema
    }

    pub fn set_types(&mut self, value_types: Vec<SchemaType>, key_types: Vec<SchemaType>) {
        self.value_types = value_types;
        self.key_types = key_types;
        self.reindex();
    }

    pub fn set_names(&mut self, field_names: Vec<String>) {
        self.field_names = field_names;
        self.reindex();
    }

    fn reindex(&mut self) {
        self.named = self
            .field_names
            .iter()
            .cloned()
            .zip(self.value_types.iter().copied())
            .collect();
    }

    /// True until a schema definition has been applied.
    pub fn is_empty(&self) -> bool {
        self.value_types.is_empty()
    }

    pub fn len(&self) -> usize {
        self.value_types.len()
    }

    pub fn type_of(&self, field: &str) -> Option<SchemaType> {
        self.named.get(field).copied()
    }

    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.field_names.iter().position(|n| n == field)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    pub table_id: TableId,
    pub world: Address,
    /// Human-readable name from `StoreMetadata`, `None` until it arrives.
    pub table_name: Option<String>,
}

impl TableMetadata {
    pub fn new(world: Address, table_id: TableId) -> Self {
        Self {
            table_id,
            world,
            table_name: None,
        }
    }

    /// The registered name, or the name half of the id before registration.
    pub fn display_name(&self) -> String {
        self.table_name
            .clone()
            .unwrap_or_else(|| self.table_id.name())
    }

    /// `namespace:name` as derived from the id.
    pub fn on_chain_name(&self) -> String {
        format!("{}:{}", self.table_id.namespace(), self.table_id.name())
    }
}

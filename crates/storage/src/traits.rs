use std::sync::Arc;

use storesync_core::{Address, Field, FieldValue, MudMutation, SchemaType, TableId};

use crate::error::StorageError;
use crate::table::{Table, World};

/// Confirmed table state and the mutation primitives ingestion drives.
///
/// Mutating calls serialize on the target table's lock, append to the change
/// log and bump `last_update`.
pub trait TableStore: Send + Sync {
    fn get_or_create_world(&self, address: Address) -> Arc<World>;

    fn get_or_create_table(&self, world: Address, table_id: TableId) -> Arc<Table>;

    fn table(&self, world: Address, table_id: TableId) -> Option<Arc<Table>>;

    fn table_by_name(&self, world: Address, name: &str) -> Option<Arc<Table>>;

    fn set_schema(&self, table: &Table, value_types: Vec<SchemaType>, key_types: Vec<SchemaType>);

    fn set_metadata(&self, table: &Table, name: &str, field_names: Vec<String>);

    /// Replace the whole row.
    fn set_row(
        &self,
        table: &Table,
        key: &str,
        fields: Vec<Field>,
    ) -> Result<MudMutation, StorageError>;

    /// Patch one field, materialising a default row first if needed. The
    /// returned mutation carries the full row.
    fn set_field(
        &self,
        table: &Table,
        key: &str,
        index: usize,
        value: FieldValue,
    ) -> Result<MudMutation, StorageError>;

    /// Remove the row. Deleting an absent row still yields a tombstone.
    fn delete_row(&self, table: &Table, key: &str) -> MudMutation;

    fn get_row(&self, table: &Table, key: &str) -> Option<Vec<Field>>;
}

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use storesync_core::codec::default_row;
use storesync_core::{Address, Field, FieldValue, MudMutation, SchemaType, TableId};
use tracing::{debug, info};

use crate::changelog::{ChangeEvent, ChangeLog};
use crate::error::StorageError;
use crate::table::{Table, TableState, World};
use crate::traits::TableStore;

pub const DEFAULT_CHANGE_LOG_CAPACITY: usize = 10_000;

/// In-memory table store.
///
/// Lock order: world map, then a world's table index, then one table, then
/// the change log. The change log is appended while the table lock is held so
/// its order matches the order rows changed.
#[derive(Debug)]
pub struct MemoryStore {
    worlds: RwLock<HashMap<Address, Arc<World>>>,
    changes: Mutex<ChangeLog>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CHANGE_LOG_CAPACITY)
    }
}

impl MemoryStore {
    pub fn new(change_log_capacity: usize) -> Self {
        Self {
            worlds: RwLock::new(HashMap::new()),
            changes: Mutex::new(ChangeLog::new(change_log_capacity)),
        }
    }

    pub fn world(&self, address: Address) -> Option<Arc<World>> {
        self.worlds.read().get(&address).cloned()
    }

    pub fn worlds(&self) -> Vec<Arc<World>> {
        let mut worlds: Vec<_> = self.worlds.read().values().cloned().collect();
        worlds.sort_by_key(|w| w.address());
        worlds
    }

    /// Find a table by name in any world, lowest world address first.
    pub fn find_table(&self, name: &str) -> Option<Arc<Table>> {
        self.worlds()
            .into_iter()
            .find_map(|world| world.table_by_name(name))
    }

    // ====== Change Log ======

    /// Record that something changed without touching confirmed rows.
    pub fn touch(&self) {
        self.changes.lock().touch();
    }

    pub fn last_update(&self) -> u64 {
        self.changes.lock().last_update()
    }

    pub fn revision(&self) -> u64 {
        self.changes.lock().revision()
    }

    pub fn changes_since(&self, sequence: u64) -> Vec<ChangeEvent> {
        self.changes.lock().since(sequence)
    }

    pub fn last_sequence(&self) -> u64 {
        self.changes.lock().last_sequence()
    }

    fn record(&self, mutation: &MudMutation) {
        self.changes
            .lock()
            .push(&mutation.table, &mutation.key, mutation.rendered());
    }
}

fn name_at(state: &TableState, existing: Option<&[Field]>, index: usize) -> String {
    state
        .schema
        .field_names
        .get(index)
        .cloned()
        .or_else(|| existing.and_then(|row| row.get(index)).map(|f| f.name.clone()))
        .unwrap_or_else(|| format!("field{index}"))
}

impl TableStore for MemoryStore {
    fn get_or_create_world(&self, address: Address) -> Arc<World> {
        if let Some(world) = self.world(address) {
            return world;
        }
        self.worlds
            .write()
            .entry(address)
            .or_insert_with(|| Arc::new(World::new(address)))
            .clone()
    }

    fn get_or_create_table(&self, world: Address, table_id: TableId) -> Arc<Table> {
        self.get_or_create_world(world).get_or_create_table(table_id)
    }

    fn table(&self, world: Address, table_id: TableId) -> Option<Arc<Table>> {
        self.world(world)?.table(table_id)
    }

    fn table_by_name(&self, world: Address, name: &str) -> Option<Arc<Table>> {
        self.world(world)?.table_by_name(name)
    }

    fn set_schema(&self, table: &Table, value_types: Vec<SchemaType>, key_types: Vec<SchemaType>) {
        let mut state = table.write();
        info!(
            table = %state.metadata.on_chain_name(),
            fields = value_types.len(),
            keys = key_types.len(),
            "registered schema"
        );
        state.schema.set_types(value_types, key_types);
    }

    fn set_metadata(&self, table: &Table, name: &str, field_names: Vec<String>) {
        let world = self.get_or_create_world(table.world());
        let previous = table.name();
        world.rename(table.id(), &previous, name);

        let mut state = table.write();
        for row in state.rows.values_mut() {
            for (field, new_name) in row.iter_mut().zip(&field_names) {
                field.name.clone_from(new_name);
            }
        }
        state.metadata.table_name = Some(name.to_string());
        state.schema.set_names(field_names);
        info!(
            table = %state.metadata.on_chain_name(),
            name,
            "registered table name"
        );
    }

    fn set_row(
        &self,
        table: &Table,
        key: &str,
        fields: Vec<Field>,
    ) -> Result<MudMutation, StorageError> {
        let mut state = table.write();
        let name = state.metadata.display_name();
        if !state.schema.is_empty() && fields.len() != state.schema.len() {
            return Err(StorageError::SchemaMismatch {
                table: name,
                expected: state.schema.len(),
                actual: fields.len(),
            });
        }
        state.rows.insert(key.to_string(), fields.clone());
        let mutation = MudMutation::set(name, key, fields);
        self.record(&mutation);
        debug!(table = %mutation.table, key, row = %mutation.rendered(), "set row");
        Ok(mutation)
    }

    fn set_field(
        &self,
        table: &Table,
        key: &str,
        index: usize,
        value: FieldValue,
    ) -> Result<MudMutation, StorageError> {
        let mut state = table.write();
        let name = state.metadata.display_name();
        let existing = state.rows.get(key).cloned();
        let mut row = match existing.clone() {
            Some(row) => row,
            None => default_row(&state.schema.value_types, &state.schema.field_names),
        };
        if index >= row.len() {
            return Err(StorageError::FieldIndex {
                table: name,
                index,
                len: row.len(),
            });
        }
        row[index] = Field {
            name: name_at(&state, existing.as_deref(), index),
            value,
        };
        state.rows.insert(key.to_string(), row.clone());
        let mutation = MudMutation::set(name, key, row);
        self.record(&mutation);
        debug!(table = %mutation.table, key, index, row = %mutation.rendered(), "set field");
        Ok(mutation)
    }

    fn delete_row(&self, table: &Table, key: &str) -> MudMutation {
        let mut state = table.write();
        state.rows.remove(key);
        let mutation = MudMutation::delete(state.metadata.display_name(), key);
        self.record(&mutation);
        debug!(table = %mutation.table, key, "delete row");
        mutation
    }

    fn get_row(&self, table: &Table, key: &str) -> Option<Vec<Field>> {
        table.row(key)
    }
}

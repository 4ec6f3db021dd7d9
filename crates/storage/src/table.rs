use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use storesync_core::{Address, Field, TableId};

use crate::schema::{TableMetadata, TableSchema};

#[derive(Debug)]
pub struct TableState {
    pub metadata: TableMetadata,
    pub schema: TableSchema,
    pub rows: HashMap<String, Vec<Field>>,
}

/// A table and its confirmed rows. Every access goes through the table's own
/// lock so writers on different tables never contend.
#[derive(Debug)]
pub struct Table {
    id: TableId,
    world: Address,
    state: RwLock<TableState>,
}

impl Table {
    pub fn new(world: Address, id: TableId) -> Self {
        Self {
            id,
            world,
            state: RwLock::new(TableState {
                metadata: TableMetadata::new(world, id),
                schema: TableSchema::default(),
                rows: HashMap::new(),
            }),
        }
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn world(&self) -> Address {
        self.world
    }

    pub fn read(&self) -> RwLockReadGuard<'_, TableState> {
        self.state.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, TableState> {
        self.state.write()
    }

    pub fn name(&self) -> String {
        self.read().metadata.display_name()
    }

    pub fn schema(&self) -> TableSchema {
        self.read().schema.clone()
    }

    pub fn metadata(&self) -> TableMetadata {
        self.read().metadata.clone()
    }

    pub fn row(&self, key: &str) -> Option<Vec<Field>> {
        self.read().rows.get(key).cloned()
    }

    /// Snapshot of all rows, ordered by key.
    pub fn rows(&self) -> BTreeMap<String, Vec<Field>> {
        self.read()
            .rows
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.read().rows.len()
    }
}

#[derive(Debug, Default)]
pub struct WorldTables {
    pub by_id: HashMap<TableId, Arc<Table>>,
    pub by_name: HashMap<String, TableId>,
}

/// All tables emitted by one store contract.
#[derive(Debug)]
pub struct World {
    address: Address,
    tables: RwLock<WorldTables>,
}

impl World {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            tables: RwLock::new(WorldTables::default()),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn table(&self, id: TableId) -> Option<Arc<Table>> {
        self.tables.read().by_id.get(&id).cloned()
    }

    pub fn get_or_create_table(&self, id: TableId) -> Arc<Table> {
        if let Some(table) = self.table(id) {
            return table;
        }
        let mut tables = self.tables.write();
        let world = self.address;
        let table = tables
            .by_id
            .entry(id)
            .or_insert_with(|| Arc::new(Table::new(world, id)))
            .clone();
        tables.by_name.entry(id.name()).or_insert(id);
        table
    }

    /// Lookup by registered name, or by the name half of the id for tables
    /// that have no metadata yet.
    pub fn table_by_name(&self, name: &str) -> Option<Arc<Table>> {
        let tables = self.tables.read();
        let id = tables.by_name.get(name)?;
        tables.by_id.get(id).cloned()
    }

    /// Point `name` at `id`. A registered name replaces the id-derived alias.
    pub fn rename(&self, id: TableId, previous: &str, name: &str) {
        let mut tables = self.tables.write();
        if tables.by_name.get(previous) == Some(&id) {
            tables.by_name.remove(previous);
        }
        tables.by_name.insert(name.to_string(), id);
    }

    pub fn tables(&self) -> Vec<Arc<Table>> {
        let mut tables: Vec<_> = self.tables.read().by_id.values().cloned().collect();
        tables.sort_by_key(|t| t.id());
        tables
    }
}

use std::sync::Arc;

use storesync_core::field_value::render_row;
use storesync_core::{Address, Field, LogRecord, MudMutation, SchemaType, TableId};
use storesync_engine::{BatchReport, Engine, IngestError};
use storesync_storage::MemoryStore;

use crate::builder::{key_word, LogBuilder};

pub const WORLD: Address = Address::from_bytes([0x77; 20]);
pub const POSITION: TableId = TableId::from_parts("", "Position");

/// An engine plus a builder for the world it indexes.
pub struct TestNode {
    pub engine: Arc<Engine>,
    pub logs: LogBuilder,
}

impl Default for TestNode {
    fn default() -> Self {
        Self::new()
    }
}

impl TestNode {
    pub fn new() -> Self {
        Self {
            engine: Arc::new(Engine::new(Arc::new(MemoryStore::default()))),
            logs: LogBuilder::new(WORLD),
        }
    }

    /// A node that has already ingested the `Position { x: int32, y: int32 }`
    /// table registration.
    pub fn with_position_table() -> Result<Self, Box<dyn std::error::Error>> {
        let mut node = Self::new();
        let records = node.logs.register_table(
            POSITION,
            &[SchemaType::INT32, SchemaType::INT32],
            &["x", "y"],
            &[SchemaType::UINT256],
        )?;
        node.ingest(records)?;
        node.logs.next_block();
        Ok(node)
    }

    pub fn ingest(&self, records: Vec<LogRecord>) -> Result<BatchReport, IngestError> {
        self.engine.process_logs(records)
    }

    /// Rendered overlay view of a row; empty when absent.
    pub fn read(&self, table: &str, key: &str) -> String {
        render_row(self.engine.read_row(table, key).as_deref())
    }

    /// Rendered confirmed row; empty when absent.
    pub fn confirmed(&self, table: &str, key: &str) -> String {
        render_row(self.engine.get_row(table, key).as_deref())
    }
}

/// Row key of entity `n`.
pub fn entity(n: u64) -> String {
    storesync_core::row_key(&[key_word(n)])
}

pub fn position(x: i64, y: i64) -> Vec<Field> {
    vec![Field::new("x", x), Field::new("y", y)]
}

pub fn predict_position(n: u64, x: i64, y: i64) -> MudMutation {
    MudMutation::set("Position", entity(n), position(x, y))
}

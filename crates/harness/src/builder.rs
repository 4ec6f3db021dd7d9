use std::collections::HashMap;

use storesync_core::abi::{self, Token};
use storesync_core::codec::{encode_field, encode_row, encode_schema_word};
use storesync_core::{
    Address, CoreError, FieldValue, LogRecord, SchemaType, StoreEvent, TableId, TxHash,
    METADATA_TABLE_ID, SCHEMA_TABLE_ID,
};

/// Deterministic transaction hash for a test label.
pub fn tx_hash(label: &str) -> TxHash {
    TxHash::from_bytes(*blake3::hash(label.as_bytes()).as_bytes())
}

/// A key word holding `n` in its low bytes, the way a `uint256` entity id is keyed.
pub fn key_word(n: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&n.to_be_bytes());
    word
}

/// Builds store event records the way a store contract would emit them.
///
/// Records take the current block and transaction; the index within the
/// block advances with every record.
pub struct LogBuilder {
    world: Address,
    block: u64,
    next_index: u64,
    tx: TxHash,
    schemas: HashMap<TableId, Vec<SchemaType>>,
}

impl LogBuilder {
    pub fn new(world: Address) -> Self {
        Self {
            world,
            block: 1,
            next_index: 0,
            tx: tx_hash("genesis"),
            schemas: HashMap::new(),
        }
    }

    pub fn world(&self) -> Address {
        self.world
    }

    pub fn current_block(&self) -> u64 {
        self.block
    }

    /// Move to `block`, restarting the log index.
    pub fn at_block(&mut self, block: u64) -> &mut Self {
        self.block = block;
        self.next_index = 0;
        self
    }

    pub fn next_block(&mut self) -> &mut Self {
        let next = self.block + 1;
        self.at_block(next)
    }

    pub fn in_tx(&mut self, tx: TxHash) -> &mut Self {
        self.tx = tx;
        self
    }

    fn emit(&mut self, event: StoreEvent) -> LogRecord {
        let record = LogRecord {
            address: self.world,
            topics: vec![event.kind().topic()],
            data: event.encode_data(),
            block_number: self.block,
            log_index: self.next_index,
            tx_hash: self.tx,
            removed: false,
        };
        self.next_index += 1;
        record
    }

    /// Schema and metadata records that register a table.
    pub fn register_table(
        &mut self,
        table_id: TableId,
        value_types: &[SchemaType],
        field_names: &[&str],
        key_types: &[SchemaType],
    ) -> Result<Vec<LogRecord>, CoreError> {
        let target = vec![*table_id.as_bytes()];
        let schema = encode_row(
            &[
                FieldValue::Bytes(encode_schema_word(value_types)?.to_vec()),
                FieldValue::Bytes(encode_schema_word(key_types)?.to_vec()),
            ],
            &[SchemaType::BYTES32, SchemaType::BYTES32],
        )?;
        let names: Vec<String> = field_names.iter().map(|n| n.to_string()).collect();
        let metadata = encode_row(
            &[
                FieldValue::String(table_id.name()),
                FieldValue::Bytes(abi::encode(&[Token::StringArray(names)])),
            ],
            &[SchemaType::String, SchemaType::Bytes],
        )?;
        self.schemas.insert(table_id, value_types.to_vec());
        Ok(vec![
            self.emit(StoreEvent::SetRecord {
                table_id: SCHEMA_TABLE_ID,
                key: target.clone(),
                data: schema,
            }),
            self.emit(StoreEvent::SetRecord {
                table_id: METADATA_TABLE_ID,
                key: target,
                data: metadata,
            }),
        ])
    }

    fn types(&self, table_id: TableId) -> Result<&[SchemaType], CoreError> {
        self.schemas
            .get(&table_id)
            .map(Vec::as_slice)
            .ok_or_else(|| CoreError::InvalidSchema(format!("{} not registered", table_id.name())))
    }

    pub fn set_record(
        &mut self,
        table_id: TableId,
        key: &[[u8; 32]],
        values: &[FieldValue],
    ) -> Result<LogRecord, CoreError> {
        let data = encode_row(values, self.types(table_id)?)?;
        Ok(self.raw_set_record(table_id, key, data))
    }

    /// A set-record event with an arbitrary payload, for malformed input.
    pub fn raw_set_record(&mut self, table_id: TableId, key: &[[u8; 32]], data: Vec<u8>) -> LogRecord {
        self.emit(StoreEvent::SetRecord {
            table_id,
            key: key.to_vec(),
            data,
        })
    }

    pub fn set_field(
        &mut self,
        table_id: TableId,
        key: &[[u8; 32]],
        index: u8,
        value: &FieldValue,
    ) -> Result<LogRecord, CoreError> {
        let ty = self
            .types(table_id)?
            .get(usize::from(index))
            .copied()
            .ok_or_else(|| CoreError::InvalidSchema(format!("no field {index}")))?;
        let data = encode_field(value, ty)?;
        Ok(self.emit(StoreEvent::SetField {
            table_id,
            key: key.to_vec(),
            schema_index: index,
            data,
        }))
    }

    pub fn delete_record(&mut self, table_id: TableId, key: &[[u8; 32]]) -> LogRecord {
        self.emit(StoreEvent::DeleteRecord {
            table_id,
            key: key.to_vec(),
        })
    }
}

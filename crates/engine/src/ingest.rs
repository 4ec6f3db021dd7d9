use storesync_core::abi::AbiReader;
use storesync_core::codec::{decode_field, decode_row, decode_schema_word};
use storesync_core::{
    DecodeError, FieldValue, LogRecord, MudMutation, SchemaType, StoreEvent, TableId,
    METADATA_TABLE_ID, SCHEMA_TABLE_ID,
};
use storesync_storage::{MemoryStore, TableStore};
use tracing::debug;

use crate::error::EngineError;

/// Drop reorg-retracted records and order the rest by position in the log.
/// The sort is stable so equal positions keep their arrival order.
pub fn normalize(mut records: Vec<LogRecord>) -> Vec<LogRecord> {
    records.retain(|r| !r.removed);
    records.sort_by_key(|r| (r.block_number, r.log_index));
    records
}

/// What one record did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// A row changed. Deletes carry no fields.
    Row(MudMutation),
    /// A table's schema was registered.
    Schema(TableId),
    /// A table's name and field names were registered.
    Metadata(TableId),
    /// A record the store has no use for.
    Ignored,
}

/// Apply one record to the store.
///
/// Records for the schema and metadata tables update the described table
/// instead of storing a row.
pub fn dispatch(store: &MemoryStore, record: &LogRecord) -> Result<Applied, EngineError> {
    let event = StoreEvent::parse(record)?;
    let world = record.address;
    let table_id = event.table_id();

    if table_id == SCHEMA_TABLE_ID || table_id == METADATA_TABLE_ID {
        return match event {
            StoreEvent::SetRecord { key, data, .. } => {
                let target = system_target(&key)?;
                // a rejected record must not create the target table
                if table_id == SCHEMA_TABLE_ID {
                    let (value_types, key_types) = decode_schema_record(&data)?;
                    let table = store.get_or_create_table(world, target);
                    store.set_schema(&table, value_types, key_types);
                    Ok(Applied::Schema(target))
                } else {
                    let (name, field_names) = decode_metadata_record(&data)?;
                    let table = store.get_or_create_table(world, target);
                    store.set_metadata(&table, &name, field_names);
                    Ok(Applied::Metadata(target))
                }
            }
            other => {
                debug!(
                    kind = other.kind().as_str(),
                    "ignoring partial update to a system table"
                );
                Ok(Applied::Ignored)
            }
        };
    }

    let table = store.get_or_create_table(world, table_id);
    let key = event.row_key();
    let mutation = match event {
        StoreEvent::SetRecord { data, .. } => {
            let schema = table.schema();
            let fields = decode_row(&data, &schema.value_types, &schema.field_names)
                .map_err(|e| e.in_table(table.name()))?;
            store.set_row(&table, &key, fields)?
        }
        StoreEvent::SetField {
            schema_index, data, ..
        } => {
            let schema = table.schema();
            let index = usize::from(schema_index);
            let field = decode_field(&data, &schema.value_types, index, &schema.field_names)
                .map_err(|e| e.in_table(table.name()))?;
            store.set_field(&table, &key, index, field.value)?
        }
        StoreEvent::DeleteRecord { .. } => store.delete_row(&table, &key),
    };
    Ok(Applied::Row(mutation))
}

/// System table rows are keyed by the id of the table they describe.
fn system_target(key: &[[u8; 32]]) -> Result<TableId, DecodeError> {
    match key.first() {
        Some(word) => Ok(TableId::from_bytes(*word)),
        None => Err(DecodeError::malformed("system table key", "empty key tuple")),
    }
}

/// `(valueSchema bytes32, keySchema bytes32)`.
fn decode_schema_record(data: &[u8]) -> Result<(Vec<SchemaType>, Vec<SchemaType>), DecodeError> {
    let decode = || -> Result<_, DecodeError> {
        let fields = decode_row(data, &[SchemaType::BYTES32, SchemaType::BYTES32], &[])?;
        let mut words = fields.iter().map(|f| f.value.as_bytes().unwrap_or_default());
        let value = decode_schema_word(words.next().unwrap_or_default())?;
        let key = decode_schema_word(words.next().unwrap_or_default())?;
        Ok((value, key))
    };
    decode().map_err(|e| e.in_table("mudstore:schema"))
}

/// `(tableName string, abiEncodedFieldNames bytes)`; the names are an ABI `string[]`.
fn decode_metadata_record(data: &[u8]) -> Result<(String, Vec<String>), DecodeError> {
    let fields = decode_row(data, &[SchemaType::String, SchemaType::Bytes], &[])
        .map_err(|e| e.in_table("mudstore:StoreMetadata"))?;
    let (Some(FieldValue::String(name)), Some(FieldValue::Bytes(encoded))) =
        (fields.first().map(|f| &f.value), fields.get(1).map(|f| &f.value))
    else {
        return Err(DecodeError::malformed("metadata record", "unexpected field types"));
    };
    let names = if encoded.is_empty() {
        Vec::new()
    } else {
        AbiReader::new(encoded).string_array(0)?
    };
    Ok((name.clone(), names))
}

use crate::abi::{self, AbiReader, Token};
use crate::error::DecodeError;
use crate::ids::{encode_hex, row_key, Address, TableId, TxHash};

/// keccak256("StoreSetRecord(bytes32,bytes32[],bytes)")
pub const SET_RECORD_TOPIC: [u8; 32] = [
    0x91, 0x2a, 0xf8, 0x73, 0xe8, 0x52, 0x23, 0x5a,
    0xae, 0x78, 0xa1, 0xd2, 0x5a, 0xe9, 0xbb, 0x28,
    0xb6, 0x16, 0xa6, 0x7c, 0x36, 0x89, 0x8c, 0x53,
    0xa1, 0x4f, 0xd8, 0x18, 0x45, 0x04, 0xee, 0x32,
];

/// keccak256("StoreSetField(bytes32,bytes32[],uint8,bytes)")
pub const SET_FIELD_TOPIC: [u8; 32] = [
    0xd0, 0x1f, 0x9f, 0x13, 0x68, 0xf8, 0x31, 0x52,
    0x8f, 0xc9, 0xfe, 0x64, 0x42, 0x36, 0x6b, 0x2b,
    0x7d, 0x95, 0x7f, 0xbf, 0xff, 0x3b, 0xcf, 0x7c,
    0x24, 0xd9, 0xab, 0x5f, 0xe5, 0x1f, 0x8c, 0x46,
];

/// keccak256("StoreDeleteRecord(bytes32,bytes32[])")
pub const DELETE_RECORD_TOPIC: [u8; 32] = [
    0x2c, 0xc8, 0x61, 0x0b, 0x80, 0xef, 0x19, 0x40,
    0x9a, 0xe5, 0x1e, 0xcb, 0xdd, 0x9c, 0x13, 0x79,
    0x60, 0xfb, 0x22, 0xae, 0x9e, 0xf2, 0xd8, 0x17,
    0xd3, 0x6e, 0xc1, 0xb6, 0x85, 0xd6, 0x8e, 0xcd,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SetRecord,
    SetField,
    DeleteRecord,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [Self::SetRecord, Self::SetField, Self::DeleteRecord];

    pub fn from_topic(topic: &[u8; 32]) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.topic() == *topic)
    }

    pub fn topic(self) -> [u8; 32] {
        match self {
            Self::SetRecord => SET_RECORD_TOPIC,
            Self::SetField => SET_FIELD_TOPIC,
            Self::DeleteRecord => DELETE_RECORD_TOPIC,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SetRecord => "StoreSetRecord",
            Self::SetField => "StoreSetField",
            Self::DeleteRecord => "StoreDeleteRecord",
        }
    }
}

/// One raw record from the external log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Emitting contract; identifies the world.
    pub address: Address,
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: TxHash,
    /// Set when a reorg retracted the record.
    pub removed: bool,
}

impl LogRecord {
    pub fn kind(&self) -> Option<EventKind> {
        self.topics.first().and_then(EventKind::from_topic)
    }

    /// Hex of `topic0`, for diagnostics.
    pub fn discriminator(&self) -> String {
        self.topics
            .first()
            .map_or_else(|| "<none>".to_string(), |t| encode_hex(t))
    }
}

/// A parsed store mutation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    SetRecord {
        table_id: TableId,
        key: Vec<[u8; 32]>,
        data: Vec<u8>,
    },
    SetField {
        table_id: TableId,
        key: Vec<[u8; 32]>,
        schema_index: u8,
        data: Vec<u8>,
    },
    DeleteRecord {
        table_id: TableId,
        key: Vec<[u8; 32]>,
    },
}

impl StoreEvent {
    pub fn parse(record: &LogRecord) -> Result<Self, DecodeError> {
        let kind = record.kind().ok_or_else(|| DecodeError::UnknownEvent {
            topic: record.discriminator(),
        })?;
        let reader = AbiReader::new(&record.data);
        let table_id = TableId::from_bytes(reader.bytes32(0)?);
        let key = reader.bytes32_array(1)?;
        let event = match kind {
            EventKind::SetRecord => Self::SetRecord {
                table_id,
                key,
                data: reader.bytes(2)?,
            },
            EventKind::SetField => Self::SetField {
                table_id,
                key,
                schema_index: reader.uint8(2)?,
                data: reader.bytes(3)?,
            },
            EventKind::DeleteRecord => Self::DeleteRecord { table_id, key },
        };
        Ok(event)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::SetRecord { .. } => EventKind::SetRecord,
            Self::SetField { .. } => EventKind::SetField,
            Self::DeleteRecord { .. } => EventKind::DeleteRecord,
        }
    }

    pub fn table_id(&self) -> TableId {
        match self {
            Self::SetRecord { table_id, .. }
            | Self::SetField { table_id, .. }
            | Self::DeleteRecord { table_id, .. } => *table_id,
        }
    }

    pub fn key(&self) -> &[[u8; 32]] {
        match self {
            Self::SetRecord { key, .. }
            | Self::SetField { key, .. }
            | Self::DeleteRecord { key, .. } => key,
        }
    }

    pub fn row_key(&self) -> String {
        row_key(self.key())
    }

    /// ABI-encoded event data, as it appears in a log's `data`.
    pub fn encode_data(&self) -> Vec<u8> {
        match self {
            Self::SetRecord {
                table_id,
                key,
                data,
            } => abi::encode(&[
                Token::Word(*table_id.as_bytes()),
                Token::Bytes32Array(key.clone()),
                Token::Bytes(data.clone()),
            ]),
            Self::SetField {
                table_id,
                key,
                schema_index,
                data,
            } => abi::encode(&[
                Token::Word(*table_id.as_bytes()),
                Token::Bytes32Array(key.clone()),
                Token::uint(u64::from(*schema_index)),
                Token::Bytes(data.clone()),
            ]),
            Self::DeleteRecord { table_id, key } => abi::encode(&[
                Token::Word(*table_id.as_bytes()),
                Token::Bytes32Array(key.clone()),
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(event: &StoreEvent) -> LogRecord {
        LogRecord {
            address: Address::from_bytes([1; 20]),
            topics: vec![event.kind().topic()],
            data: event.encode_data(),
            block_number: 1,
            log_index: 0,
            tx_hash: TxHash::default(),
            removed: false,
        }
    }

    #[test]
    fn parses_each_kind() {
        let table_id = TableId::from_parts("", "Position");
        let events = [
            StoreEvent::SetRecord {
                table_id,
                key: vec![[9; 32]],
                data: vec![0, 0, 0, 3],
            },
            StoreEvent::SetField {
                table_id,
                key: vec![[9; 32]],
                schema_index: 1,
                data: vec![0, 0, 0, 4],
            },
            StoreEvent::DeleteRecord {
                table_id,
                key: vec![[9; 32], [8; 32]],
            },
        ];
        for event in events {
            let parsed = StoreEvent::parse(&record(&event)).unwrap();
            assert_eq!(parsed, event);
        }
    }

    #[test]
    fn unknown_discriminator_rejected() {
        let mut rec = record(&StoreEvent::DeleteRecord {
            table_id: TableId::default(),
            key: vec![],
        });
        rec.topics = vec![[0xee; 32]];
        assert!(rec.kind().is_none());
        match StoreEvent::parse(&rec).unwrap_err() {
            DecodeError::UnknownEvent { topic } => assert_eq!(topic, encode_hex(&[0xee; 32])),
            other => panic!("expected UnknownEvent, got {other:?}"),
        }
    }

    #[test]
    fn truncated_payload_rejected() {
        let mut rec = record(&StoreEvent::SetRecord {
            table_id: TableId::default(),
            key: vec![[1; 32]],
            data: vec![1, 2, 3],
        });
        rec.data.truncate(70);
        assert!(StoreEvent::parse(&rec).is_err());
    }

    #[test]
    fn row_key_joins_tuple() {
        let event = StoreEvent::DeleteRecord {
            table_id: TableId::default(),
            key: vec![[0xab; 32]],
        };
        assert_eq!(event.row_key(), format!("0x{}", "ab".repeat(32)));
    }
}

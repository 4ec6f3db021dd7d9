use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Render bytes as `0x`-prefixed lowercase hex.
pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn decode_hex(s: &str) -> Result<Vec<u8>, CoreError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(digits).map_err(|e| CoreError::InvalidHex(format!("{s}: {e}")))
}

/// Storage key for a row: the key tuple concatenated and hex encoded.
pub fn row_key(key_tuple: &[[u8; 32]]) -> String {
    encode_hex(&key_tuple.concat())
}

macro_rules! byte_id {
    ($name:ident, $len:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name([u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
                let arr: [u8; $len] = bytes.try_into().map_err(|_| CoreError::InvalidLength {
                    label: stringify!($name),
                    expected: $len,
                    actual: bytes.len(),
                })?;
                Ok(Self(arr))
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                encode_hex(&self.0)
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.to_hex()[..10])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_slice(&decode_hex(s)?)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

byte_id!(Address, 20);
byte_id!(TableId, 32);
byte_id!(TxHash, 32);

const fn pack_label(out: &mut [u8; 32], offset: usize, label: &[u8]) {
    let mut i = 0;
    while i < label.len() && i < 16 {
        out[offset + i] = label[i];
        i += 1;
    }
}

fn unpack_label(bytes: &[u8]) -> String {
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

impl TableId {
    /// Table ids are `bytes16(namespace) ++ bytes16(name)`, zero padded.
    pub const fn from_parts(namespace: &str, name: &str) -> Self {
        let mut bytes = [0u8; 32];
        pack_label(&mut bytes, 0, namespace.as_bytes());
        pack_label(&mut bytes, 16, name.as_bytes());
        Self(bytes)
    }

    pub fn namespace(&self) -> String {
        unpack_label(&self.0[..16])
    }

    pub fn name(&self) -> String {
        unpack_label(&self.0[16..])
    }
}

/// Rows here describe the value schema of other tables.
pub const SCHEMA_TABLE_ID: TableId = TableId::from_parts("mudstore", "schema");

/// Rows here carry the human-readable name and field names of other tables.
pub const METADATA_TABLE_ID: TableId = TableId::from_parts("mudstore", "StoreMetadata");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let addr = Address::from_bytes([0xAB; 20]);
        let parsed: Address = addr.to_hex().parse().unwrap();
        assert_eq!(addr, parsed);
        assert_eq!(addr.to_hex(), format!("0x{}", "ab".repeat(20)));
    }

    #[test]
    fn wrong_length_rejected() {
        let err = "0x0102".parse::<TxHash>().unwrap_err();
        match err {
            CoreError::InvalidLength {
                expected, actual, ..
            } => {
                assert_eq!(expected, 32);
                assert_eq!(actual, 2);
            }
            other => panic!("expected InvalidLength, got {other:?}"),
        }
    }

    #[test]
    fn table_id_parts() {
        assert_eq!(SCHEMA_TABLE_ID.namespace(), "mudstore");
        assert_eq!(SCHEMA_TABLE_ID.name(), "schema");
        assert_eq!(METADATA_TABLE_ID.name(), "StoreMetadata");

        let id = TableId::from_parts("", "Position");
        assert_eq!(id.namespace(), "");
        assert_eq!(id.name(), "Position");
    }

    #[test]
    fn row_key_concatenates_tuple() {
        let key = row_key(&[[0x11; 32], [0x22; 32]]);
        assert_eq!(key.len(), 2 + 128);
        assert!(key.starts_with("0x1111"));
        assert!(key.ends_with("2222"));
    }
}

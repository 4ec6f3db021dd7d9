use std::fmt;

use crate::error::DecodeError;

const UINT_BASE: u8 = 0;
const INT_BASE: u8 = 32;
const FIXED_BYTES_BASE: u8 = 64;
const BOOL_TAG: u8 = 96;
const ADDRESS_TAG: u8 = 97;
const ARRAY_BASE: u8 = 98;
const BYTES_TAG: u8 = 196;
const STRING_TAG: u8 = 197;

/// A fixed-width element type. `bytes` / `len` are in bytes (1..=32).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticType {
    Uint { bytes: u8 },
    Int { bytes: u8 },
    FixedBytes { len: u8 },
    Bool,
    Address,
}

impl StaticType {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0..=31 => Some(Self::Uint { bytes: tag - UINT_BASE + 1 }),
            32..=63 => Some(Self::Int { bytes: tag - INT_BASE + 1 }),
            64..=95 => Some(Self::FixedBytes { len: tag - FIXED_BYTES_BASE + 1 }),
            BOOL_TAG => Some(Self::Bool),
            ADDRESS_TAG => Some(Self::Address),
            _ => None,
        }
    }

    fn tag(self) -> u8 {
        match self {
            Self::Uint { bytes } => UINT_BASE + bytes - 1,
            Self::Int { bytes } => INT_BASE + bytes - 1,
            Self::FixedBytes { len } => FIXED_BYTES_BASE + len - 1,
            Self::Bool => BOOL_TAG,
            Self::Address => ADDRESS_TAG,
        }
    }

    pub fn width(self) -> usize {
        match self {
            Self::Uint { bytes } | Self::Int { bytes } => bytes as usize,
            Self::FixedBytes { len } => len as usize,
            Self::Bool => 1,
            Self::Address => 20,
        }
    }
}

impl fmt::Display for StaticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint { bytes } => write!(f, "uint{}", *bytes as u16 * 8),
            Self::Int { bytes } => write!(f, "int{}", *bytes as u16 * 8),
            Self::FixedBytes { len } => write!(f, "bytes{len}"),
            Self::Bool => f.write_str("bool"),
            Self::Address => f.write_str("address"),
        }
    }
}

/// Value type of one schema column, decoded from the store's numeric tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaType {
    Static(StaticType),
    Array(StaticType),
    Bytes,
    String,
}

impl SchemaType {
    pub const BOOL: Self = Self::Static(StaticType::Bool);
    pub const ADDRESS: Self = Self::Static(StaticType::Address);
    pub const UINT8: Self = Self::Static(StaticType::Uint { bytes: 1 });
    pub const UINT32: Self = Self::Static(StaticType::Uint { bytes: 4 });
    pub const UINT256: Self = Self::Static(StaticType::Uint { bytes: 32 });
    pub const INT32: Self = Self::Static(StaticType::Int { bytes: 4 });
    pub const BYTES32: Self = Self::Static(StaticType::FixedBytes { len: 32 });

    pub fn from_tag(tag: u8) -> Result<Self, DecodeError> {
        let ty = match tag {
            BYTES_TAG => Some(Self::Bytes),
            STRING_TAG => Some(Self::String),
            ARRAY_BASE..BYTES_TAG => StaticType::from_tag(tag - ARRAY_BASE).map(Self::Array),
            _ => StaticType::from_tag(tag).map(Self::Static),
        };
        ty.ok_or(DecodeError::UnknownType { tag })
    }

    pub fn tag(self) -> u8 {
        match self {
            Self::Static(s) => s.tag(),
            Self::Array(s) => ARRAY_BASE + s.tag(),
            Self::Bytes => BYTES_TAG,
            Self::String => STRING_TAG,
        }
    }

    /// Byte width for fixed-size types, `None` for length-prefixed ones.
    pub fn static_width(self) -> Option<usize> {
        match self {
            Self::Static(s) => Some(s.width()),
            _ => None,
        }
    }

    pub fn is_dynamic(self) -> bool {
        self.static_width().is_none()
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(s) => write!(f, "{s}"),
            Self::Array(s) => write!(f, "{s}[]"),
            Self::Bytes => f.write_str("bytes"),
            Self::String => f.write_str("string"),
        }
    }
}

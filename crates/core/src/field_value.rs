use num_bigint::{BigInt, BigUint};
use std::fmt;

use crate::ids::{encode_hex, Address};

/// A decoded column value.
///
/// Integers are arbitrary precision so every schema width (8..=256 bits)
/// survives decoding without truncation or sign-extension surprises.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Uint(BigUint),
    Int(BigInt),
    Bool(bool),
    Bytes(Vec<u8>),
    String(String),
    Address(Address),
    Array(Vec<FieldValue>),
}

/// Equality is defined on the canonical rendering. Reconciliation relies on
/// this, so `Uint(5)` and `Int(5)` compare equal.
impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for FieldValue {}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Uint(_) => "uint",
            Self::Int(_) => "int",
            Self::Bool(_) => "bool",
            Self::Bytes(_) => "bytes",
            Self::String(_) => "string",
            Self::Address(_) => "address",
            Self::Array(_) => "array",
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Uint(n) => u64::try_from(n).ok(),
            Self::Int(n) => u64::try_from(n).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Uint(n) => i64::try_from(n).ok(),
            Self::Int(n) => i64::try_from(n).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Self::Address(a) => Some(*a),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint(n) => write!(f, "{n}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Bytes(b) => write!(f, "\"{}\"", encode_hex(b)),
            // JSON string escaping keeps the rendering unambiguous inside arrays.
            Self::String(s) => match serde_json::to_string(s) {
                Ok(quoted) => f.write_str(&quoted),
                Err(_) => Err(fmt::Error),
            },
            Self::Address(a) => write!(f, "\"{a}\""),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<u64> for FieldValue {
    fn from(n: u64) -> Self {
        Self::Uint(BigUint::from(n))
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Int(BigInt::from(n))
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Address> for FieldValue {
    fn from(a: Address) -> Self {
        Self::Address(a)
    }
}

/// One named column of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\":{}", self.name, self.value)
    }
}

/// Render a row as `{"a":1,"b":true}`. `None` (a deleted row) renders empty.
pub fn render_row(fields: Option<&[Field]>) -> String {
    let Some(fields) = fields else {
        return String::new();
    };
    let body: Vec<String> = fields.iter().map(Field::to_string).collect();
    format!("{{{}}}", body.join(","))
}

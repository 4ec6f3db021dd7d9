//! Packed row codec.
//!
//! Layout of a full record: static fields back to back in schema order; then,
//! if the schema has dynamic fields, a 32-byte length word (bytes 0..4 hold
//! the total dynamic length, followed by one big-endian `u16` per dynamic
//! field); then the dynamic payloads concatenated.

use num_bigint::{BigInt, BigUint, Sign};

use crate::error::{CoreError, DecodeError};
use crate::field_value::{Field, FieldValue};
use crate::ids::Address;
use crate::schema_type::{SchemaType, StaticType};

pub const LENGTH_WORD: usize = 32;
const TOTAL_LENGTH_BYTES: usize = 4;
const FIELD_LENGTH_BYTES: usize = 2;
/// A schema word has room for 28 type tags after its 4-byte header.
pub const MAX_FIELDS: usize = 28;

fn field_name(names: &[String], index: usize) -> String {
    names
        .get(index)
        .cloned()
        .unwrap_or_else(|| format!("field{index}"))
}

fn split_schema(types: &[SchemaType]) -> Result<(usize, usize), DecodeError> {
    let num_static = types.iter().take_while(|t| !t.is_dynamic()).count();
    if types[num_static..].iter().any(|t| !t.is_dynamic()) {
        return Err(DecodeError::malformed(
            "schema",
            "static field declared after a dynamic field",
        ));
    }
    let static_len = types[..num_static]
        .iter()
        .filter_map(|t| t.static_width())
        .sum();
    Ok((num_static, static_len))
}

fn decode_static(ty: StaticType, bytes: &[u8]) -> FieldValue {
    match ty {
        StaticType::Uint { .. } => FieldValue::Uint(BigUint::from_bytes_be(bytes)),
        StaticType::Int { .. } => FieldValue::Int(BigInt::from_signed_bytes_be(bytes)),
        StaticType::FixedBytes { .. } => FieldValue::Bytes(bytes.to_vec()),
        // Only the literal encoding 1 is true; any other byte decodes as false.
        StaticType::Bool => FieldValue::Bool(bytes.first() == Some(&1)),
        StaticType::Address => {
            let mut arr = [0u8; 20];
            arr.copy_from_slice(bytes);
            FieldValue::Address(Address::from_bytes(arr))
        }
    }
}

fn decode_dynamic(ty: SchemaType, bytes: &[u8]) -> Result<FieldValue, DecodeError> {
    match ty {
        SchemaType::Bytes => Ok(FieldValue::Bytes(bytes.to_vec())),
        SchemaType::String => String::from_utf8(bytes.to_vec())
            .map(FieldValue::String)
            .map_err(|e| DecodeError::malformed("string field", e.to_string())),
        SchemaType::Array(element) => {
            let width = element.width();
            if bytes.len() % width != 0 {
                return Err(DecodeError::malformed(
                    "array field",
                    format!("{} bytes is not a multiple of {width}", bytes.len()),
                ));
            }
            Ok(FieldValue::Array(
                bytes
                    .chunks_exact(width)
                    .map(|chunk| decode_static(element, chunk))
                    .collect(),
            ))
        }
        SchemaType::Static(s) => Ok(decode_static(s, bytes)),
    }
}

/// Decode a full packed record into one field per schema type.
pub fn decode_row(
    data: &[u8],
    types: &[SchemaType],
    names: &[String],
) -> Result<Vec<Field>, DecodeError> {
    let (num_static, static_len) = split_schema(types)?;
    let dynamic_types = &types[num_static..];

    if dynamic_types.is_empty() && data.len() != static_len {
        return Err(DecodeError::Length {
            context: "static record",
            expected: static_len,
            actual: data.len(),
        });
    }
    if !dynamic_types.is_empty() && data.len() < static_len + LENGTH_WORD {
        return Err(DecodeError::Length {
            context: "record header",
            expected: static_len + LENGTH_WORD,
            actual: data.len(),
        });
    }

    let mut fields = Vec::with_capacity(types.len());
    let mut offset = 0;
    for (i, ty) in types[..num_static].iter().enumerate() {
        let SchemaType::Static(s) = ty else {
            continue;
        };
        let width = s.width();
        fields.push(Field {
            name: field_name(names, i),
            value: decode_static(*s, &data[offset..offset + width]),
        });
        offset += width;
    }

    if dynamic_types.is_empty() {
        return Ok(fields);
    }

    let lengths = decode_length_word(&data[offset..offset + LENGTH_WORD], dynamic_types.len())?;
    offset += LENGTH_WORD;
    let dynamic_len: usize = lengths.iter().sum();
    if data.len() != offset + dynamic_len {
        return Err(DecodeError::Length {
            context: "dynamic record",
            expected: offset + dynamic_len,
            actual: data.len(),
        });
    }

    for (j, (ty, len)) in dynamic_types.iter().zip(&lengths).enumerate() {
        fields.push(Field {
            name: field_name(names, num_static + j),
            value: decode_dynamic(*ty, &data[offset..offset + len])?,
        });
        offset += len;
    }

    Ok(fields)
}

fn decode_length_word(word: &[u8], count: usize) -> Result<Vec<usize>, DecodeError> {
    if TOTAL_LENGTH_BYTES + count * FIELD_LENGTH_BYTES > LENGTH_WORD {
        return Err(DecodeError::malformed(
            "length word",
            format!("{count} dynamic fields do not fit"),
        ));
    }
    let mut total = [0u8; TOTAL_LENGTH_BYTES];
    total.copy_from_slice(&word[..TOTAL_LENGTH_BYTES]);
    let total = u32::from_be_bytes(total) as usize;

    let lengths: Vec<usize> = (0..count)
        .map(|i| {
            let at = TOTAL_LENGTH_BYTES + i * FIELD_LENGTH_BYTES;
            u16::from_be_bytes([word[at], word[at + 1]]) as usize
        })
        .collect();
    let sum: usize = lengths.iter().sum();
    if sum != total {
        return Err(DecodeError::malformed(
            "length word",
            format!("field lengths sum to {sum} but total is {total}"),
        ));
    }
    Ok(lengths)
}

/// Decode the payload of a single-field update.
pub fn decode_field(
    data: &[u8],
    types: &[SchemaType],
    index: usize,
    names: &[String],
) -> Result<Field, DecodeError> {
    let ty = *types.get(index).ok_or(DecodeError::FieldIndex {
        index,
        len: types.len(),
    })?;
    let value = match ty.static_width() {
        Some(width) if data.len() != width => {
            return Err(DecodeError::Length {
                context: "static field",
                expected: width,
                actual: data.len(),
            });
        }
        _ => decode_dynamic(ty, data)?,
    };
    Ok(Field {
        name: field_name(names, index),
        value,
    })
}

/// Zero value used to materialise a row that a single-field update touches
/// before any full record exists for it.
pub fn default_value(ty: SchemaType) -> FieldValue {
    match ty {
        SchemaType::Static(StaticType::Uint { .. }) => FieldValue::Uint(BigUint::default()),
        SchemaType::Static(StaticType::Int { .. }) => FieldValue::Int(BigInt::default()),
        SchemaType::Static(StaticType::FixedBytes { len }) => {
            FieldValue::Bytes(vec![0; len as usize])
        }
        SchemaType::Static(StaticType::Bool) => FieldValue::Bool(false),
        SchemaType::Static(StaticType::Address) => FieldValue::Address(Address::default()),
        SchemaType::Array(_) => FieldValue::Array(Vec::new()),
        SchemaType::Bytes => FieldValue::Bytes(Vec::new()),
        SchemaType::String => FieldValue::String(String::new()),
    }
}

/// A row of defaults for `types`, named after `names`.
pub fn default_row(types: &[SchemaType], names: &[String]) -> Vec<Field> {
    types
        .iter()
        .enumerate()
        .map(|(i, ty)| Field {
            name: field_name(names, i),
            value: default_value(*ty),
        })
        .collect()
}

fn encode_static(value: &FieldValue, ty: StaticType, out: &mut Vec<u8>) -> Result<(), CoreError> {
    let schema_ty = SchemaType::Static(ty);
    let width = ty.width();
    match (ty, value) {
        (StaticType::Uint { .. }, FieldValue::Uint(n)) => {
            let bytes = n.to_bytes_be();
            if bytes.len() > width {
                return Err(CoreError::Overflow {
                    value: n.to_string(),
                    ty: schema_ty,
                });
            }
            out.resize(out.len() + width - bytes.len(), 0);
            out.extend_from_slice(&bytes);
        }
        (StaticType::Int { .. }, FieldValue::Int(n)) => {
            let bytes = n.to_signed_bytes_be();
            if bytes.len() > width {
                return Err(CoreError::Overflow {
                    value: n.to_string(),
                    ty: schema_ty,
                });
            }
            let pad = if n.sign() == Sign::Minus { 0xff } else { 0x00 };
            out.resize(out.len() + width - bytes.len(), pad);
            out.extend_from_slice(&bytes);
        }
        (StaticType::FixedBytes { .. }, FieldValue::Bytes(b)) => {
            if b.len() > width {
                return Err(CoreError::InvalidLength {
                    label: "fixed bytes",
                    expected: width,
                    actual: b.len(),
                });
            }
            out.extend_from_slice(b);
            out.resize(out.len() + width - b.len(), 0);
        }
        (StaticType::Bool, FieldValue::Bool(b)) => out.push(u8::from(*b)),
        (StaticType::Address, FieldValue::Address(a)) => out.extend_from_slice(a.as_bytes()),
        (_, other) => {
            return Err(CoreError::TypeMismatch {
                ty: schema_ty,
                found: other.type_name(),
            });
        }
    }
    Ok(())
}

/// Encode one value in the form a single-field update carries.
pub fn encode_field(value: &FieldValue, ty: SchemaType) -> Result<Vec<u8>, CoreError> {
    let mut out = Vec::new();
    match (ty, value) {
        (SchemaType::Static(s), v) => encode_static(v, s, &mut out)?,
        (SchemaType::Bytes, FieldValue::Bytes(b)) => out.extend_from_slice(b),
        (SchemaType::String, FieldValue::String(s)) => out.extend_from_slice(s.as_bytes()),
        (SchemaType::Array(element), FieldValue::Array(items)) => {
            for item in items {
                encode_static(item, element, &mut out)?;
            }
        }
        (_, other) => {
            return Err(CoreError::TypeMismatch {
                ty,
                found: other.type_name(),
            });
        }
    }
    Ok(out)
}

/// Inverse of [`decode_row`].
pub fn encode_row(values: &[FieldValue], types: &[SchemaType]) -> Result<Vec<u8>, CoreError> {
    if values.len() != types.len() {
        return Err(CoreError::InvalidSchema(format!(
            "{} values for {} schema fields",
            values.len(),
            types.len()
        )));
    }
    let (num_static, _) = split_schema(types)?;

    let mut out = Vec::new();
    for (value, ty) in values[..num_static].iter().zip(types) {
        out.extend(encode_field(value, *ty)?);
    }
    if num_static == types.len() {
        return Ok(out);
    }

    let dynamic: Vec<Vec<u8>> = values[num_static..]
        .iter()
        .zip(&types[num_static..])
        .map(|(v, t)| encode_field(v, *t))
        .collect::<Result<_, _>>()?;
    if TOTAL_LENGTH_BYTES + dynamic.len() * FIELD_LENGTH_BYTES > LENGTH_WORD {
        return Err(CoreError::InvalidSchema(format!(
            "{} dynamic fields do not fit in the length word",
            dynamic.len()
        )));
    }

    let mut word = [0u8; LENGTH_WORD];
    let mut total: u32 = 0;
    for (i, payload) in dynamic.iter().enumerate() {
        let len = u16::try_from(payload.len()).map_err(|_| CoreError::InvalidLength {
            label: "dynamic field",
            expected: u16::MAX as usize,
            actual: payload.len(),
        })?;
        let at = TOTAL_LENGTH_BYTES + i * FIELD_LENGTH_BYTES;
        word[at..at + FIELD_LENGTH_BYTES].copy_from_slice(&len.to_be_bytes());
        total += u32::from(len);
    }
    word[..TOTAL_LENGTH_BYTES].copy_from_slice(&total.to_be_bytes());
    out.extend_from_slice(&word);
    for payload in dynamic {
        out.extend(payload);
    }
    Ok(out)
}

/// Decode a schema word: static data length (2 bytes), static field count,
/// dynamic field count, then one type tag per field.
pub fn decode_schema_word(word: &[u8]) -> Result<Vec<SchemaType>, DecodeError> {
    if word.len() != 32 {
        return Err(DecodeError::Length {
            context: "schema word",
            expected: 32,
            actual: word.len(),
        });
    }
    let static_len = u16::from_be_bytes([word[0], word[1]]) as usize;
    let num_static = word[2] as usize;
    let num_dynamic = word[3] as usize;
    if num_static + num_dynamic > MAX_FIELDS {
        return Err(DecodeError::malformed(
            "schema word",
            format!("{} fields exceed the maximum of {MAX_FIELDS}", num_static + num_dynamic),
        ));
    }

    let types = word[4..4 + num_static + num_dynamic]
        .iter()
        .map(|tag| SchemaType::from_tag(*tag))
        .collect::<Result<Vec<_>, _>>()?;

    let (declared_static, computed_len) = split_schema(&types)?;
    if declared_static != num_static || computed_len != static_len {
        return Err(DecodeError::malformed(
            "schema word",
            format!(
                "header declares {num_static} static fields / {static_len} bytes, types give {declared_static} / {computed_len}"
            ),
        ));
    }
    Ok(types)
}

pub fn encode_schema_word(types: &[SchemaType]) -> Result<[u8; 32], CoreError> {
    if types.len() > MAX_FIELDS {
        return Err(CoreError::InvalidSchema(format!(
            "{} fields exceed the maximum of {MAX_FIELDS}",
            types.len()
        )));
    }
    let (num_static, static_len) = split_schema(types)?;
    let static_len = u16::try_from(static_len)
        .map_err(|_| CoreError::InvalidSchema("static data too long".into()))?;

    let mut word = [0u8; 32];
    word[..2].copy_from_slice(&static_len.to_be_bytes());
    word[2] = num_static as u8;
    word[3] = (types.len() - num_static) as u8;
    for (i, ty) in types.iter().enumerate() {
        word[4 + i] = ty.tag();
    }
    Ok(word)
}

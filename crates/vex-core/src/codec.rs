//! Vector wire format
//!
//! Vectors travel as packed bytes with no header:
//! - `float32`: `4 * dimension` bytes, little-endian IEEE-754
//! - `int8`: `dimension` bytes, two's complement
//! - `bit`: `ceil(dimension / 8)` bytes, most-significant bit first
//!
//! Textual input is a JSON array of numbers (or of 0/1 and booleans for bit
//! vectors). Which form was supplied is detected from the host value's type.

use crate::error::{Result, VexError};
use crate::types::vector::{BitVector, ElementType, VectorValue};

/// A vector as supplied by a caller, before decoding.
#[derive(Debug, Clone, Copy)]
pub enum VectorInput<'a> {
    Blob(&'a [u8]),
    Text(&'a str),
}

/// Check that `bytes` is a well-formed vector of the given type and dimension.
pub fn validate(bytes: &[u8], element_type: ElementType, dimension: usize) -> Result<()> {
    if dimension == 0 {
        return Err(VexError::Format(
            "zero-length vectors are not supported".into(),
        ));
    }
    let expected = element_type.byte_len(dimension);
    if bytes.len() != expected {
        return Err(VexError::Format(format!(
            "{} vector of dimension {} needs {} bytes, got {}",
            element_type,
            dimension,
            expected,
            bytes.len()
        )));
    }
    Ok(())
}

/// Decode wire bytes into an owned typed vector.
///
/// Unused trailing bits of a bit vector are ignored and cleared.
pub fn decode(bytes: &[u8], element_type: ElementType, dimension: usize) -> Result<VectorValue> {
    validate(bytes, element_type, dimension)?;
    let value = match element_type {
        ElementType::Float32 => VectorValue::Float32(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        ElementType::Int8 => VectorValue::Int8(bytes.iter().map(|b| *b as i8).collect()),
        ElementType::Bit => VectorValue::Bit(BitVector::new(bytes.to_vec(), dimension)?.clear_tail()),
    };
    Ok(value)
}

/// Encode a typed vector into its canonical wire bytes.
pub fn encode(value: &VectorValue) -> Result<Vec<u8>> {
    if value.dimension() == 0 {
        return Err(VexError::Format(
            "zero-length vectors are not supported".into(),
        ));
    }
    match value {
        VectorValue::Float32(v) => Ok(v.iter().flat_map(|f| f.to_le_bytes()).collect()),
        VectorValue::Int8(v) => Ok(v.iter().map(|i| *i as u8).collect()),
        VectorValue::Bit(bits) => {
            if !bits.has_clean_tail() {
                return Err(VexError::Format(format!(
                    "unused trailing bits of a bit vector of dimension {} must be zero",
                    bits.dimension()
                )));
            }
            Ok(bits.as_bytes().to_vec())
        }
    }
}

/// Dimension implied by a blob when no column declares one.
pub fn infer_dimension(bytes: &[u8], element_type: ElementType) -> Result<usize> {
    if bytes.is_empty() {
        return Err(VexError::Format(
            "zero-length vectors are not supported".into(),
        ));
    }
    match element_type {
        ElementType::Float32 => {
            if bytes.len() % 4 != 0 {
                return Err(VexError::Format(format!(
                    "invalid float32 vector BLOB length {}: must be divisible by 4",
                    bytes.len()
                )));
            }
            Ok(bytes.len() / 4)
        }
        ElementType::Int8 => Ok(bytes.len()),
        ElementType::Bit => Ok(bytes.len() * 8),
    }
}

/// Parse a JSON array literal into a vector of the requested element type.
pub fn parse_json(text: &str, element_type: ElementType) -> Result<VectorValue> {
    let trimmed = text.trim_start();
    if !trimmed.starts_with('[') {
        return Err(VexError::Parse(
            "vector text must be a JSON array".into(),
        ));
    }
    let parsed: serde_json::Value = serde_json::from_str(trimmed)
        .map_err(|e| VexError::Parse(format!("invalid vector JSON: {}", e)))?;
    let items = parsed
        .as_array()
        .ok_or_else(|| VexError::Parse("vector text must be a JSON array".into()))?;
    if items.is_empty() {
        return Err(VexError::Format(
            "zero-length vectors are not supported".into(),
        ));
    }

    match element_type {
        ElementType::Float32 => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let x = item.as_f64().ok_or_else(|| {
                    VexError::Parse(format!("element {} is not a number: {}", i, item))
                })?;
                let f = x as f32;
                if !f.is_finite() {
                    return Err(VexError::Parse(format!(
                        "element {} is out of float32 range: {}",
                        i, x
                    )));
                }
                Ok(f)
            })
            .collect::<Result<Vec<_>>>()
            .map(VectorValue::Float32),
        ElementType::Int8 => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let x = item.as_i64().ok_or_else(|| {
                    VexError::Parse(format!("element {} is not an integer: {}", i, item))
                })?;
                i8::try_from(x).map_err(|_| {
                    VexError::Parse(format!(
                        "element {} is out of int8 range [-128, 127]: {}",
                        i, x
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(VectorValue::Int8),
        ElementType::Bit => items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                serde_json::Value::Bool(b) => Ok(*b),
                other => match other.as_i64() {
                    Some(0) => Ok(false),
                    Some(1) => Ok(true),
                    _ => Err(VexError::Parse(format!(
                        "element {} of a bit vector must be 0, 1, true or false: {}",
                        i, other
                    ))),
                },
            })
            .collect::<Result<Vec<_>>>()
            .map(|bits| VectorValue::Bit(BitVector::from_bools(&bits))),
    }
}

/// Decode caller input, auto-detecting bytes vs. JSON text.
///
/// With `dimension` given, blobs must match it exactly (`Format`) and parsed
/// text must have that many elements (`TypeMismatch`).
pub fn coerce(
    input: VectorInput<'_>,
    element_type: ElementType,
    dimension: Option<usize>,
) -> Result<VectorValue> {
    match input {
        VectorInput::Blob(bytes) => {
            let dimension = match dimension {
                Some(d) => d,
                None => infer_dimension(bytes, element_type)?,
            };
            decode(bytes, element_type, dimension)
        }
        VectorInput::Text(text) => {
            let value = parse_json(text, element_type)?;
            match dimension {
                Some(d) if d != value.dimension() => Err(VexError::TypeMismatch(format!(
                    "expected {} dimensions but received {}",
                    d,
                    value.dimension()
                ))),
                _ => Ok(value),
            }
        }
    }
}

/// Render a vector as a JSON array.
pub fn to_json(value: &VectorValue) -> Result<String> {
    let rendered = match value {
        VectorValue::Float32(v) => serde_json::to_string(v),
        VectorValue::Int8(v) => serde_json::to_string(v),
        VectorValue::Bit(bits) => {
            serde_json::to_string(&bits.iter().map(u8::from).collect::<Vec<_>>())
        }
    };
    rendered.map_err(|e| VexError::Internal(format!("failed to render vector JSON: {}", e)))
}

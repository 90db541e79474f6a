//! Vector element types, distance metrics and typed vector values

use crate::error::{Result, VexError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Element encodings supported by vector columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// 32-bit little-endian floating point (default)
    Float32,
    /// 8-bit signed integer
    Int8,
    /// 1-bit binary vector, packed most-significant-bit first
    Bit,
}

impl ElementType {
    /// Number of bytes a vector of `dimension` elements occupies on the wire.
    pub fn byte_len(&self, dimension: usize) -> usize {
        match self {
            ElementType::Float32 => dimension * 4,
            ElementType::Int8 => dimension,
            ElementType::Bit => dimension.div_ceil(8),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ElementType::Float32 => "float32",
            ElementType::Int8 => "int8",
            ElementType::Bit => "bit",
        }
    }

    /// Keyword used in vec0 column declarations.
    pub fn ddl_keyword(&self) -> &'static str {
        match self {
            ElementType::Float32 => "float",
            ElementType::Int8 => "int8",
            ElementType::Bit => "bit",
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Default for ElementType {
    fn default() -> Self {
        ElementType::Float32
    }
}

impl FromStr for ElementType {
    type Err = VexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "float" | "f32" | "float32" => Ok(ElementType::Float32),
            "int8" | "i8" => Ok(ElementType::Int8),
            "bit" => Ok(ElementType::Bit),
            other => Err(VexError::Format(format!(
                "unrecognized vector element type '{}'",
                other
            ))),
        }
    }
}

/// Distance metrics for similarity search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Euclidean distance (L2 norm)
    L2,
    /// Manhattan distance (L1 norm)
    L1,
    /// Cosine distance, `1 - cos(a, b)`
    Cosine,
    /// Count of differing bits (bit vectors only)
    Hamming,
}

impl Metric {
    /// Metric a column gets when its declaration names none.
    pub fn default_for(element_type: ElementType) -> Self {
        match element_type {
            ElementType::Bit => Metric::Hamming,
            ElementType::Float32 | ElementType::Int8 => Metric::L2,
        }
    }

    /// Whether this metric is defined for vectors of `element_type`.
    pub fn supports(&self, element_type: ElementType) -> bool {
        match self {
            Metric::Hamming => element_type == ElementType::Bit,
            Metric::L2 | Metric::L1 | Metric::Cosine => element_type != ElementType::Bit,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Metric::L2 => "l2",
            Metric::L1 => "l1",
            Metric::Cosine => "cosine",
            Metric::Hamming => "hamming",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = VexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "l2" => Ok(Metric::L2),
            "l1" => Ok(Metric::L1),
            "cosine" => Ok(Metric::Cosine),
            "hamming" => Ok(Metric::Hamming),
            other => Err(VexError::Config(format!(
                "unknown distance metric '{}'",
                other
            ))),
        }
    }
}

/// Packed bit vector, most-significant bit first within each byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitVector {
    dimension: usize,
    bytes: Vec<u8>,
}

impl BitVector {
    /// Wrap packed bytes. The byte count must be exactly `ceil(dimension / 8)`;
    /// trailing bits are kept as given and checked when encoding.
    pub fn new(bytes: Vec<u8>, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(VexError::Format(
                "zero-length vectors are not supported".into(),
            ));
        }
        let expected = ElementType::Bit.byte_len(dimension);
        if bytes.len() != expected {
            return Err(VexError::Format(format!(
                "bit vector of dimension {} needs {} bytes, got {}",
                dimension,
                expected,
                bytes.len()
            )));
        }
        Ok(Self { dimension, bytes })
    }

    pub fn from_bools(bits: &[bool]) -> Self {
        let mut bytes = vec![0u8; bits.len().div_ceil(8)];
        for (i, bit) in bits.iter().enumerate() {
            if *bit {
                bytes[i / 8] |= 0x80 >> (i % 8);
            }
        }
        Self {
            dimension: bits.len(),
            bytes,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn get(&self, index: usize) -> bool {
        index < self.dimension && self.bytes[index / 8] & (0x80 >> (index % 8)) != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.dimension).map(move |i| self.get(i))
    }

    /// Mask selecting the used bits of the final byte.
    pub(crate) fn tail_mask(dimension: usize) -> u8 {
        match dimension % 8 {
            0 => 0xff,
            used => 0xffu8 << (8 - used),
        }
    }

    /// True when every unused bit of the final byte is zero.
    pub fn has_clean_tail(&self) -> bool {
        match self.bytes.last() {
            Some(last) => last & !Self::tail_mask(self.dimension) == 0,
            None => true,
        }
    }

    /// Clear unused trailing bits.
    pub(crate) fn clear_tail(mut self) -> Self {
        let mask = Self::tail_mask(self.dimension);
        if let Some(last) = self.bytes.last_mut() {
            *last &= mask;
        }
        self
    }
}

/// A decoded vector held in an owned, typed buffer
#[derive(Debug, Clone, PartialEq)]
pub enum VectorValue {
    Float32(Vec<f32>),
    Int8(Vec<i8>),
    Bit(BitVector),
}

impl VectorValue {
    pub fn element_type(&self) -> ElementType {
        match self {
            VectorValue::Float32(_) => ElementType::Float32,
            VectorValue::Int8(_) => ElementType::Int8,
            VectorValue::Bit(_) => ElementType::Bit,
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            VectorValue::Float32(v) => v.len(),
            VectorValue::Int8(v) => v.len(),
            VectorValue::Bit(b) => b.dimension(),
        }
    }

    /// Components widened to `f32`; bits become 0.0 or 1.0.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self {
            VectorValue::Float32(v) => v.clone(),
            VectorValue::Int8(v) => v.iter().map(|x| *x as f32).collect(),
            VectorValue::Bit(b) => b.iter().map(|x| if x { 1.0 } else { 0.0 }).collect(),
        }
    }

    /// Fail with `TypeMismatch` unless `other` has the same element type and dimension.
    pub fn ensure_compatible(&self, other: &VectorValue) -> Result<()> {
        if self.element_type() != other.element_type() {
            return Err(VexError::TypeMismatch(format!(
                "vector element types differ: {} vs {}",
                self.element_type(),
                other.element_type()
            )));
        }
        if self.dimension() != other.dimension() {
            return Err(VexError::TypeMismatch(format!(
                "vector dimensions differ: {} vs {}",
                self.dimension(),
                other.dimension()
            )));
        }
        Ok(())
    }
}

//! Vector types and configuration

use serde::{Deserialize, Serialize};
use vex_core::{codec, BitVector, ElementType, Metric, Result, VectorValue, VexError};

/// Configuration for a vector column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Vector element type
    #[serde(default)]
    pub element_type: ElementType,
    /// Vector dimension (number of elements)
    pub dimension: usize,
    /// Distance metric used by KNN queries on the column
    pub metric: Metric,
}

impl VectorConfig {
    /// Create a new vector configuration
    pub fn new(element_type: ElementType, dimension: usize, metric: Metric) -> Self {
        Self {
            element_type,
            dimension,
            metric,
        }
    }

    /// float32 column with the element type's default metric
    pub fn float32(dimension: usize) -> Self {
        Self::new(
            ElementType::Float32,
            dimension,
            Metric::default_for(ElementType::Float32),
        )
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Check the combination before it reaches a table declaration.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(VexError::Config("vector dimension must be positive".into()));
        }
        if !self.metric.supports(self.element_type) {
            return Err(VexError::Config(format!(
                "distance metric {} is not defined for {} vectors",
                self.metric, self.element_type
            )));
        }
        Ok(())
    }

    /// vec0 declaration for a column named `column`
    pub(crate) fn column_declaration(&self, column: &str) -> String {
        format!(
            "{} {}[{}] distance_metric={}",
            column,
            self.element_type.ddl_keyword(),
            self.dimension,
            self.metric
        )
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            element_type: ElementType::Float32,
            dimension: 384, // Common dimension for sentence transformers
            metric: Metric::Cosine,
        }
    }
}

/// A vector embedding
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    value: VectorValue,
}

impl Vector {
    /// Create a float32 vector
    pub fn new(data: Vec<f32>) -> Self {
        Self {
            value: VectorValue::Float32(data),
        }
    }

    pub fn int8(data: Vec<i8>) -> Self {
        Self {
            value: VectorValue::Int8(data),
        }
    }

    pub fn bits(bits: &[bool]) -> Self {
        Self {
            value: VectorValue::Bit(BitVector::from_bools(bits)),
        }
    }

    /// Serialize to the packed BLOB stored in vec0 tables
    pub fn to_blob(&self) -> Result<Vec<u8>> {
        codec::encode(&self.value)
    }

    /// Deserialize a BLOB of the given element type
    ///
    /// The dimension is inferred from the byte length, except for bit
    /// vectors where it is taken as `8 * len`.
    pub fn from_blob(blob: &[u8], element_type: ElementType) -> Result<Self> {
        let dimension = codec::infer_dimension(blob, element_type)?;
        Ok(Self {
            value: codec::decode(blob, element_type, dimension)?,
        })
    }

    /// Convert to a JSON array (for queries)
    pub fn to_json(&self) -> Result<String> {
        codec::to_json(&self.value)
    }

    pub fn element_type(&self) -> ElementType {
        self.value.element_type()
    }

    pub fn dimension(&self) -> usize {
        self.value.dimension()
    }

    pub fn value(&self) -> &VectorValue {
        &self.value
    }
}

impl From<Vec<f32>> for Vector {
    fn from(data: Vec<f32>) -> Self {
        Self::new(data)
    }
}

impl From<VectorValue> for Vector {
    fn from(value: VectorValue) -> Self {
        Self { value }
    }
}

/// Search result with its distance from the query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Row ID of the result
    pub rowid: i64,
    /// Distance from the query; lower is more similar for every metric
    pub distance: f32,
}

impl SearchResult {
    pub fn new(rowid: i64, distance: f32) -> Self {
        Self { rowid, distance }
    }

    /// Convert the distance to a similarity score
    ///
    /// Cosine distance becomes cosine similarity (1.0 = same direction);
    /// other metrics are returned unchanged.
    pub fn similarity(&self, metric: Metric) -> f32 {
        match metric {
            Metric::Cosine => 1.0 - self.distance,
            _ => self.distance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_blob_roundtrip() {
        let original = Vector::new(vec![0.1, 0.2, 0.3, 0.4]);
        let blob = original.to_blob().unwrap();
        assert_eq!(blob.len(), 16);
        let decoded = Vector::from_blob(&blob, ElementType::Float32).unwrap();
        assert_eq!(decoded, original);

        let bits = Vector::bits(&[true, false, true]);
        assert_eq!(bits.to_blob().unwrap(), vec![0b1010_0000]);
    }

    #[test]
    fn test_vector_json() {
        let vector = Vector::new(vec![1.0, 2.0, 3.0]);
        assert_eq!(vector.to_json().unwrap(), "[1.0,2.0,3.0]");
        assert_eq!(Vector::int8(vec![1, -2]).to_json().unwrap(), "[1,-2]");
    }

    #[test]
    fn test_column_declaration() {
        let config = VectorConfig::new(ElementType::Float32, 384, Metric::Cosine);
        assert_eq!(
            config.column_declaration("embedding"),
            "embedding float[384] distance_metric=cosine"
        );
        assert_eq!(
            VectorConfig::float32(8).column_declaration("v"),
            "v float[8] distance_metric=l2"
        );
    }

    #[test]
    fn test_config_validation() {
        assert!(VectorConfig::default().validate().is_ok());
        assert!(VectorConfig::float32(0).validate().is_err());
        assert!(VectorConfig::new(ElementType::Bit, 64, Metric::Cosine)
            .validate()
            .is_err());
        assert!(VectorConfig::new(ElementType::Bit, 64, Metric::Hamming)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_invalid_blob() {
        let result = Vector::from_blob(&[0u8, 1, 2], ElementType::Float32);
        assert!(matches!(result, Err(VexError::Format(_))));
    }

    #[test]
    fn test_similarity() {
        let result = SearchResult::new(1, 0.25);
        assert_eq!(result.similarity(Metric::Cosine), 0.75);
        assert_eq!(result.similarity(Metric::L2), 0.25);
    }
}

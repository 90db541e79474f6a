pub mod schema;
pub mod value;
pub mod vector;

pub use schema::{
    ColumnDef, ColumnKind, KeyType, MetadataType, TableSchema, VectorColumn,
    DEFAULT_CHUNK_SIZE, MAX_DIMENSION,
};
pub use value::{Affinity, Row, Value};
pub use vector::{BitVector, ElementType, Metric, VectorValue};

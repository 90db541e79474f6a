//! Table schema for vec0 tables: column declarations, limits and row validation

use crate::codec::{self, VectorInput};
use crate::error::{Result, VexError};
use crate::types::value::{Affinity, Value};
use crate::types::vector::{ElementType, Metric};
use serde::{Deserialize, Serialize};

pub const MAX_DIMENSION: usize = 8192;
pub const MAX_VECTOR_COLUMNS: usize = 16;
pub const MAX_PARTITION_COLUMNS: usize = 4;
pub const MAX_AUXILIARY_COLUMNS: usize = 16;
pub const MAX_METADATA_COLUMNS: usize = 16;
pub const DEFAULT_CHUNK_SIZE: usize = 1024;
pub const MAX_CHUNK_SIZE: usize = 4096;

/// A vector column: name, element encoding, fixed dimension and metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorColumn {
    pub name: String,
    pub element_type: ElementType,
    pub dimension: usize,
    pub metric: Metric,
}

impl VectorColumn {
    pub fn new(name: impl Into<String>, element_type: ElementType, dimension: usize) -> Self {
        Self {
            name: name.into(),
            element_type,
            dimension,
            metric: Metric::default_for(element_type),
        }
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Expected byte length of a stored vector.
    pub fn byte_len(&self) -> usize {
        self.element_type.byte_len(self.dimension)
    }
}

/// Value type of a primary key or partition key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    Integer,
    Text,
}

impl KeyType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            KeyType::Integer => "INTEGER",
            KeyType::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataType {
    Boolean,
    Integer,
    Float,
    Text,
}

impl MetadataType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            MetadataType::Boolean | MetadataType::Integer => "INTEGER",
            MetadataType::Float => "REAL",
            MetadataType::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    /// `integer primary key` aliases the rowid; `text primary key` is a
    /// unique, non-NULL key stored beside an assigned rowid.
    PrimaryKey(KeyType),
    Vector(VectorColumn),
    PartitionKey(KeyType),
    /// `+name [type]`: stored and returned, never filtered inside a scan.
    Auxiliary(Option<String>),
    Metadata(MetadataType),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn vector(column: VectorColumn) -> Self {
        Self {
            name: column.name.clone(),
            kind: ColumnKind::Vector(column),
        }
    }

    pub fn declared_type(&self) -> String {
        match &self.kind {
            ColumnKind::PrimaryKey(ty) | ColumnKind::PartitionKey(ty) => ty.sql_type().into(),
            ColumnKind::Vector(_) => "BLOB".into(),
            ColumnKind::Auxiliary(ty) => ty.clone().unwrap_or_default(),
            ColumnKind::Metadata(ty) => ty.sql_type().into(),
        }
    }

    /// Affinity the host applies when comparing against this column.
    pub fn affinity(&self) -> Affinity {
        Affinity::from_declared(&self.declared_type())
    }
}

/// Quote an identifier for use in generated SQL.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Schema of one vec0 table, fixed at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    columns: Vec<ColumnDef>,
    chunk_size: usize,
}

impl TableSchema {
    /// Build a schema, enforcing column limits and naming rules.
    pub fn new(columns: Vec<ColumnDef>, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_size % 8 != 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(VexError::Config(format!(
                "chunk_size must be a positive multiple of 8 no greater than {}, got {}",
                MAX_CHUNK_SIZE, chunk_size
            )));
        }

        let mut seen: Vec<String> = Vec::with_capacity(columns.len());
        let (mut vectors, mut partitions, mut auxiliary, mut metadata, mut keys) =
            (0usize, 0usize, 0usize, 0usize, 0usize);

        for column in &columns {
            let lowered = column.name.to_ascii_lowercase();
            if matches!(lowered.as_str(), "rowid" | "distance" | "k") {
                return Err(VexError::Config(format!(
                    "column name '{}' is reserved",
                    column.name
                )));
            }
            if seen.contains(&lowered) {
                return Err(VexError::Config(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
            seen.push(lowered);

            match &column.kind {
                ColumnKind::PrimaryKey(_) => keys += 1,
                ColumnKind::Vector(v) => {
                    vectors += 1;
                    if v.dimension == 0 || v.dimension > MAX_DIMENSION {
                        return Err(VexError::Config(format!(
                            "dimension for vector column '{}' must be between 1 and {}, got {}",
                            v.name, MAX_DIMENSION, v.dimension
                        )));
                    }
                    if !v.metric.supports(v.element_type) {
                        return Err(VexError::Config(format!(
                            "distance metric {} is not supported on {} vector column '{}'",
                            v.metric, v.element_type, v.name
                        )));
                    }
                }
                ColumnKind::PartitionKey(_) => partitions += 1,
                ColumnKind::Auxiliary(_) => auxiliary += 1,
                ColumnKind::Metadata(_) => metadata += 1,
            }
        }

        let limits = [
            (keys, 1, "primary key"),
            (vectors, MAX_VECTOR_COLUMNS, "vector"),
            (partitions, MAX_PARTITION_COLUMNS, "partition key"),
            (auxiliary, MAX_AUXILIARY_COLUMNS, "auxiliary"),
            (metadata, MAX_METADATA_COLUMNS, "metadata"),
        ];
        for (count, max, what) in limits {
            if count > max {
                return Err(VexError::Config(format!(
                    "too many {} columns: at most {} allowed, got {}",
                    what, max, count
                )));
            }
        }
        if vectors == 0 {
            return Err(VexError::Config(
                "at least one vector column is required".into(),
            ));
        }

        Ok(Self {
            columns,
            chunk_size,
        })
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&ColumnDef> {
        self.columns.get(index)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Index of the hidden `distance` column.
    pub fn distance_column(&self) -> usize {
        self.columns.len()
    }

    /// Index of the hidden `k` column.
    pub fn k_column(&self) -> usize {
        self.columns.len() + 1
    }

    pub fn primary_key(&self) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| matches!(c.kind, ColumnKind::PrimaryKey(_)))
    }

    /// The `integer primary key` column, if any. It holds the rowid.
    pub fn rowid_alias(&self) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.kind == ColumnKind::PrimaryKey(KeyType::Integer))
    }

    /// The `text primary key` column, if any.
    pub fn text_key(&self) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.kind == ColumnKind::PrimaryKey(KeyType::Text))
    }

    pub fn vector_column(&self, index: usize) -> Option<&VectorColumn> {
        match self.columns.get(index).map(|c| &c.kind) {
            Some(ColumnKind::Vector(v)) => Some(v),
            _ => None,
        }
    }

    pub fn vector_columns(&self) -> impl Iterator<Item = (usize, &VectorColumn)> {
        self.columns
            .iter()
            .enumerate()
            .filter_map(|(i, c)| match &c.kind {
                ColumnKind::Vector(v) => Some((i, v)),
                _ => None,
            })
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// `CREATE TABLE` statement declaring this table's shape to the host.
    pub fn declared_sql(&self) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let ty = c.declared_type();
                if ty.is_empty() {
                    quote_identifier(&c.name)
                } else {
                    format!("{} {}", quote_identifier(&c.name), ty)
                }
            })
            .collect();
        parts.push("distance REAL HIDDEN".into());
        parts.push("k INTEGER HIDDEN".into());
        format!("CREATE TABLE x({})", parts.join(", "))
    }

    /// Combine an explicit rowid with a primary-key alias value, if declared.
    pub fn resolve_rowid(&self, explicit: Option<i64>, values: &[Value]) -> Result<Option<i64>> {
        let alias = match self.rowid_alias() {
            Some(pk) => match values.get(pk) {
                None | Some(Value::Null) => None,
                Some(Value::Integer(i)) => Some(*i),
                Some(other) => {
                    return Err(VexError::ConstraintViolation(format!(
                        "primary key column '{}' must be an integer, got {}",
                        self.columns[pk].name,
                        other.type_name()
                    )))
                }
            },
            None => None,
        };
        match (explicit, alias) {
            (Some(a), Some(b)) if a != b => Err(VexError::ConstraintViolation(format!(
                "rowid {} conflicts with primary key value {}",
                a, b
            ))),
            (Some(a), _) => Ok(Some(a)),
            (None, b) => Ok(b),
        }
    }

    /// Validate and normalize a full set of column values before a write.
    ///
    /// Vector columns are decoded and re-encoded into canonical bytes. Any
    /// failure rejects the whole row.
    pub fn prepare_row(&self, values: Vec<Value>) -> Result<Vec<Value>> {
        if values.len() != self.columns.len() {
            return Err(VexError::ConstraintViolation(format!(
                "expected {} column values, got {}",
                self.columns.len(),
                values.len()
            )));
        }

        self.columns
            .iter()
            .zip(values)
            .map(|(column, value)| normalize_value(column, value))
            .collect()
    }
}

fn normalize_value(column: &ColumnDef, value: Value) -> Result<Value> {
    let violation = |detail: String| {
        VexError::ConstraintViolation(format!("column '{}': {}", column.name, detail))
    };

    match &column.kind {
        ColumnKind::PrimaryKey(KeyType::Integer) => match value {
            Value::Null | Value::Integer(_) => Ok(value),
            other => Err(violation(format!(
                "expected integer, got {}",
                other.type_name()
            ))),
        },
        ColumnKind::PrimaryKey(KeyType::Text) => match value {
            Value::Text(t) => Ok(Value::Text(t)),
            other => Err(violation(format!(
                "text primary key expects TEXT, got {}",
                other.type_name()
            ))),
        },
        ColumnKind::Vector(v) => {
            let input = match &value {
                Value::Blob(b) => VectorInput::Blob(b),
                Value::Text(t) => VectorInput::Text(t),
                Value::Null => return Err(violation("vector value cannot be NULL".into())),
                other => {
                    return Err(violation(format!(
                        "expected a BLOB or JSON array, got {}",
                        other.type_name()
                    )))
                }
            };
            let vector = codec::coerce(input, v.element_type, Some(v.dimension))
                .map_err(|e| in_column(e, &column.name))?;
            let bytes = codec::encode(&vector).map_err(|e| in_column(e, &column.name))?;
            Ok(Value::Blob(bytes))
        }
        ColumnKind::PartitionKey(ty) => match (ty, value) {
            (_, Value::Null) => Ok(Value::Null),
            (KeyType::Integer, Value::Integer(i)) => Ok(Value::Integer(i)),
            (KeyType::Text, Value::Text(t)) => Ok(Value::Text(t)),
            (ty, other) => Err(violation(format!(
                "partition key expects {:?}, got {}",
                ty,
                other.type_name()
            ))),
        },
        ColumnKind::Auxiliary(_) => Ok(value),
        ColumnKind::Metadata(ty) => match (ty, value) {
            (_, Value::Null) => Err(violation("metadata value cannot be NULL".into())),
            (MetadataType::Boolean, Value::Integer(i)) if i == 0 || i == 1 => {
                Ok(Value::Integer(i))
            }
            (MetadataType::Integer, Value::Integer(i)) => Ok(Value::Integer(i)),
            (MetadataType::Float, Value::Real(f)) => Ok(Value::Real(f)),
            (MetadataType::Float, Value::Integer(i)) => Ok(Value::Real(i as f64)),
            (MetadataType::Text, Value::Text(t)) => Ok(Value::Text(t)),
            (ty, other) => Err(violation(format!(
                "metadata column of type {:?} cannot hold {}",
                ty,
                other.type_name()
            ))),
        },
    }
}

/// Prefix an error message with the offending column, keeping its kind.
pub(crate) fn in_column(err: VexError, column: &str) -> VexError {
    match err {
        VexError::Format(m) => VexError::Format(format!("column '{}': {}", column, m)),
        VexError::Parse(m) => VexError::Parse(format!("column '{}': {}", column, m)),
        VexError::TypeMismatch(m) => {
            VexError::TypeMismatch(format!("column '{}': {}", column, m))
        }
        other => other,
    }
}

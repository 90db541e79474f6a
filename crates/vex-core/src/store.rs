use crate::error::{Result, VexError};
use crate::types::schema::TableSchema;
use crate::types::value::{Row, Value};
use std::collections::btree_map;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Lazy sequence of rows produced by a store scan
///
/// Rows arrive in ascending rowid order. Calling `RowStore::scan` again
/// restarts from the beginning.
pub trait RowScan {
    /// Get the next row
    ///
    /// Returns None when iteration is complete
    fn next_row(&mut self) -> Result<Option<Row>>;
}

/// Per-table row persistence: rowid plus one value per declared column
///
/// Vector values are validated and normalized through the table schema
/// before any write; a failure leaves the store unchanged.
pub trait RowStore {
    type Scan<'a>: RowScan
    where
        Self: 'a;

    fn schema(&self) -> &TableSchema;

    /// Insert a row, returning its rowid
    ///
    /// Without an explicit rowid (or primary key value) the next unused
    /// rowid is assigned: one more than the current maximum.
    fn insert(&mut self, rowid: Option<i64>, values: Vec<Value>) -> Result<i64>;

    /// Replace all column values of an existing row
    fn update(&mut self, rowid: i64, values: Vec<Value>) -> Result<()>;

    fn delete(&mut self, rowid: i64) -> Result<()>;

    fn get(&self, rowid: i64) -> Result<Row>;

    /// Fetch the row whose `text primary key` equals `key`
    ///
    /// `NotFound` if no row has that key or the table has no text key.
    fn get_by_key(&self, key: &str) -> Result<Row>;

    /// Scan rows whose partition columns equal the given values
    ///
    /// A NULL partition value never matches.
    fn scan_filtered(&self, partition: &[(usize, Value)]) -> Result<Self::Scan<'_>>;

    /// Scan every row
    fn scan(&self) -> Result<Self::Scan<'_>> {
        self.scan_filtered(&[])
    }
}

/// Whether `values` satisfies every partition equality in `partition`.
pub fn partition_matches(values: &[Value], partition: &[(usize, Value)]) -> bool {
    partition.iter().all(|(column, expected)| {
        matches!(
            values.get(*column).and_then(|v| v.sql_cmp(expected)),
            Some(std::cmp::Ordering::Equal)
        )
    })
}

/// Text key of a prepared row, if the table declares one.
pub fn text_key_of<'v>(schema: &TableSchema, values: &'v [Value]) -> Option<&'v str> {
    match schema.text_key().and_then(|pk| values.get(pk)) {
        Some(Value::Text(key)) => Some(key),
        _ => None,
    }
}

pub fn duplicate_key(key: &str) -> VexError {
    VexError::ConstraintViolation(format!("primary key '{}' already exists", key))
}

/// In-memory row store, ordered by rowid
#[derive(Debug, Clone)]
pub struct MemoryRowStore {
    schema: Arc<TableSchema>,
    rows: BTreeMap<i64, Vec<Value>>,
    keys: HashMap<String, i64>,
}

impl MemoryRowStore {
    pub fn new(schema: Arc<TableSchema>) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            keys: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn next_rowid(&self) -> Result<i64> {
        match self.rows.keys().next_back() {
            None => Ok(1),
            Some(max) => max.checked_add(1).ok_or_else(|| {
                VexError::ConstraintViolation("rowid space exhausted".into())
            }),
        }
    }
}

impl RowStore for MemoryRowStore {
    type Scan<'a> = MemoryScan<'a>;

    fn schema(&self) -> &TableSchema {
        &self.schema
    }

    fn insert(&mut self, rowid: Option<i64>, values: Vec<Value>) -> Result<i64> {
        let rowid = self.schema.resolve_rowid(rowid, &values)?;
        let mut values = self.schema.prepare_row(values)?;

        let rowid = match rowid {
            Some(id) if self.rows.contains_key(&id) => {
                return Err(VexError::ConstraintViolation(format!(
                    "rowid {} already exists",
                    id
                )))
            }
            Some(id) => id,
            None => self.next_rowid()?,
        };
        if let Some(key) = text_key_of(&self.schema, &values) {
            if self.keys.contains_key(key) {
                return Err(duplicate_key(key));
            }
            self.keys.insert(key.to_string(), rowid);
        }
        if let Some(pk) = self.schema.rowid_alias() {
            values[pk] = Value::Integer(rowid);
        }
        self.rows.insert(rowid, values);
        Ok(rowid)
    }

    fn update(&mut self, rowid: i64, values: Vec<Value>) -> Result<()> {
        let current = self
            .rows
            .get(&rowid)
            .ok_or_else(|| VexError::NotFound(format!("rowid {}", rowid)))?;
        if let (Some(old), Some(new)) = (
            text_key_of(&self.schema, current),
            text_key_of(&self.schema, &values),
        ) {
            if old != new {
                return Err(VexError::ConstraintViolation(format!(
                    "primary key of row {} cannot change from '{}' to '{}'",
                    rowid, old, new
                )));
            }
        }
        if let Some(alias) = self.schema.resolve_rowid(None, &values)? {
            if alias != rowid {
                return Err(VexError::ConstraintViolation(format!(
                    "primary key of row {} cannot change to {}",
                    rowid, alias
                )));
            }
        }
        let mut values = self.schema.prepare_row(values)?;
        if let Some(pk) = self.schema.rowid_alias() {
            values[pk] = Value::Integer(rowid);
        }
        self.rows.insert(rowid, values);
        Ok(())
    }

    fn delete(&mut self, rowid: i64) -> Result<()> {
        let values = self
            .rows
            .remove(&rowid)
            .ok_or_else(|| VexError::NotFound(format!("rowid {}", rowid)))?;
        if let Some(key) = text_key_of(&self.schema, &values) {
            self.keys.remove(key);
        }
        Ok(())
    }

    fn get(&self, rowid: i64) -> Result<Row> {
        self.rows
            .get(&rowid)
            .map(|values| Row::new(rowid, values.clone()))
            .ok_or_else(|| VexError::NotFound(format!("rowid {}", rowid)))
    }

    fn get_by_key(&self, key: &str) -> Result<Row> {
        match self.keys.get(key) {
            Some(rowid) => self.get(*rowid),
            None => Err(VexError::NotFound(format!("primary key '{}'", key))),
        }
    }

    fn scan_filtered(&self, partition: &[(usize, Value)]) -> Result<MemoryScan<'_>> {
        Ok(MemoryScan {
            rows: self.rows.iter(),
            partition: partition.to_vec(),
        })
    }
}

pub struct MemoryScan<'a> {
    rows: btree_map::Iter<'a, i64, Vec<Value>>,
    partition: Vec<(usize, Value)>,
}

impl RowScan for MemoryScan<'_> {
    fn next_row(&mut self) -> Result<Option<Row>> {
        for (rowid, values) in self.rows.by_ref() {
            if partition_matches(values, &self.partition) {
                return Ok(Some(Row::new(*rowid, values.clone())));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::schema::{ColumnDef, ColumnKind, KeyType, VectorColumn};
    use crate::types::vector::ElementType;

    fn store() -> MemoryRowStore {
        let schema = TableSchema::new(
            vec![
                ColumnDef::new("id", ColumnKind::PrimaryKey(KeyType::Integer)),
                ColumnDef::vector(VectorColumn::new("v", ElementType::Float32, 2)),
                ColumnDef::new("user", ColumnKind::PartitionKey(KeyType::Text)),
            ],
            8,
        )
        .unwrap();
        MemoryRowStore::new(Arc::new(schema))
    }

    fn row(v: &str, user: Option<&str>) -> Vec<Value> {
        vec![
            Value::Null,
            Value::from(v),
            user.map(Value::from).unwrap_or(Value::Null),
        ]
    }

    fn collect(mut scan: impl RowScan) -> Vec<i64> {
        let mut ids = Vec::new();
        while let Some(row) = scan.next_row().unwrap() {
            ids.push(row.rowid);
        }
        ids
    }

    #[test]
    fn test_auto_rowid_is_max_plus_one() {
        let mut store = store();
        assert_eq!(store.insert(None, row("[1, 2]", None)).unwrap(), 1);
        assert_eq!(store.insert(Some(10), row("[1, 2]", None)).unwrap(), 10);
        assert_eq!(store.insert(None, row("[1, 2]", None)).unwrap(), 11);

        // Primary key alias fills in for the rowid
        let mut aliased = row("[1, 2]", None);
        aliased[0] = Value::Integer(5);
        assert_eq!(store.insert(None, aliased).unwrap(), 5);
        assert_eq!(store.get(5).unwrap().values[0], Value::Integer(5));
        assert_eq!(store.get(11).unwrap().values[0], Value::Integer(11));
    }

    #[test]
    fn test_duplicate_rowid_rejected() {
        let mut store = store();
        store.insert(Some(1), row("[1, 2]", None)).unwrap();
        let err = store.insert(Some(1), row("[3, 4]", None)).unwrap_err();
        assert!(matches!(err, VexError::ConstraintViolation(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_invalid_vector_leaves_store_unchanged() {
        let mut store = store();
        store.insert(Some(1), row("[1, 2]", None)).unwrap();
        assert!(store.insert(None, row("[1, 2, 3]", None)).is_err());
        assert!(store.update(1, row("[1", None)).is_err());
        assert_eq!(store.len(), 1);
        let mut expected = 1.0f32.to_le_bytes().to_vec();
        expected.extend_from_slice(&2.0f32.to_le_bytes());
        assert_eq!(store.get(1).unwrap().values[1], Value::Blob(expected));
    }

    #[test]
    fn test_update_delete_not_found() {
        let mut store = store();
        assert!(matches!(
            store.update(3, row("[1, 2]", None)),
            Err(VexError::NotFound(_))
        ));
        assert!(matches!(store.delete(3), Err(VexError::NotFound(_))));
        assert!(matches!(store.get(3), Err(VexError::NotFound(_))));

        store.insert(Some(3), row("[1, 2]", None)).unwrap();
        store.update(3, row("[5, 6]", Some("a"))).unwrap();
        assert_eq!(store.get(3).unwrap().values[2], Value::from("a"));
        store.delete(3).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_scan_is_ordered_and_restartable() {
        let mut store = store();
        for (id, user) in [(4, "b"), (2, "a"), (9, "a"), (7, "c")] {
            store.insert(Some(id), row("[0, 0]", Some(user))).unwrap();
        }
        store.insert(Some(1), row("[0, 0]", None)).unwrap();

        assert_eq!(collect(store.scan().unwrap()), vec![1, 2, 4, 7, 9]);
        assert_eq!(collect(store.scan().unwrap()), vec![1, 2, 4, 7, 9]);
        assert_eq!(
            collect(store.scan_filtered(&[(2, Value::from("a"))]).unwrap()),
            vec![2, 9]
        );
        assert!(collect(store.scan_filtered(&[(2, Value::Null)]).unwrap()).is_empty());
    }

    #[test]
    fn test_text_primary_key() {
        let schema = TableSchema::new(
            vec![
                ColumnDef::new("id", ColumnKind::PrimaryKey(KeyType::Text)),
                ColumnDef::vector(VectorColumn::new("v", ElementType::Float32, 2)),
            ],
            8,
        )
        .unwrap();
        let mut store = MemoryRowStore::new(Arc::new(schema));
        let keyed = |key: &str, v: &str| vec![Value::from(key), Value::from(v)];

        assert_eq!(store.insert(None, keyed("alpha", "[1, 2]")).unwrap(), 1);
        assert_eq!(store.insert(None, keyed("beta", "[3, 4]")).unwrap(), 2);
        assert_eq!(store.get_by_key("beta").unwrap().rowid, 2);
        assert_eq!(store.get(1).unwrap().values[0], Value::from("alpha"));

        let err = store.insert(None, keyed("alpha", "[0, 0]")).unwrap_err();
        assert!(matches!(err, VexError::ConstraintViolation(m) if m.contains("'alpha'")));
        assert_eq!(store.len(), 2);

        assert!(store.insert(None, vec![Value::Integer(3), Value::from("[0, 0]")]).is_err());
        assert!(matches!(
            store.update(1, keyed("gamma", "[1, 2]")),
            Err(VexError::ConstraintViolation(_))
        ));
        store.update(1, keyed("alpha", "[9, 9]")).unwrap();

        store.delete(1).unwrap();
        assert!(matches!(store.get_by_key("alpha"), Err(VexError::NotFound(_))));
        assert_eq!(store.insert(None, keyed("alpha", "[1, 1]")).unwrap(), 3);
    }
}

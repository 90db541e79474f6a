//! Shadow table backing a vec0 table
//!
//! Each vec0 table `t` stores its rows in one ordinary table `t_rows`:
//! `rowid INTEGER PRIMARY KEY` plus one column `c{i}` per declared column,
//! except an `integer primary key`, which is the rowid itself. Slots carry
//! the declared column type; a text primary key slot is `UNIQUE NOT NULL`.

use crate::convert::{from_sql, storage_error, to_sql};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::collections::VecDeque;
use std::sync::Arc;
use vex_core::types::schema::quote_identifier;
use vex_core::store::{duplicate_key, text_key_of, RowScan, RowStore};
use vex_core::{observe, ColumnDef, ColumnKind, KeyType, Result, Row, TableSchema, Value, VexError};

/// Location of a vec0 table's shadow storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowTable {
    schema_name: String,
    table_name: String,
}

impl ShadowTable {
    pub fn new(schema_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            table_name: table_name.into(),
        }
    }

    /// Fully qualified, quoted name of the rows table.
    pub fn rows_table(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.schema_name),
            quote_identifier(&format!("{}_rows", self.table_name))
        )
    }

    pub fn create(&self, conn: &Connection, schema: &TableSchema) -> Result<()> {
        let mut columns = vec!["rowid INTEGER PRIMARY KEY".to_string()];
        for (i, column) in stored_columns(schema) {
            columns.push(slot_declaration(i, column));
        }
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.rows_table(),
            columns.join(", ")
        );
        conn.execute(&sql, []).map_err(storage_error)?;
        Ok(())
    }

    pub fn destroy(&self, conn: &Connection) -> Result<()> {
        conn.execute(&format!("DROP TABLE IF EXISTS {}", self.rows_table()), [])
            .map_err(storage_error)?;
        Ok(())
    }
}

fn slot(column: usize) -> String {
    format!("c{}", column)
}

fn slot_declaration(index: usize, column: &ColumnDef) -> String {
    match &column.kind {
        ColumnKind::PrimaryKey(_) => format!("{} TEXT NOT NULL UNIQUE", slot(index)),
        ColumnKind::Auxiliary(_) => slot(index),
        _ => format!("{} {}", slot(index), column.declared_type()),
    }
}

/// Declared columns with a storage slot: everything but the rowid alias.
fn stored_columns(schema: &TableSchema) -> impl Iterator<Item = (usize, &ColumnDef)> {
    schema
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| c.kind != ColumnKind::PrimaryKey(KeyType::Integer))
}

fn select_list(schema: &TableSchema) -> String {
    let mut list = vec!["rowid".to_string()];
    list.extend(stored_columns(schema).map(|(i, _)| slot(i)));
    list.join(", ")
}

fn read_row(schema: &TableSchema, row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    let rowid: i64 = row.get(0)?;
    let mut values = vec![Value::Null; schema.len()];
    let mut index = 1;
    for (i, column) in schema.columns().iter().enumerate() {
        if column.kind == ColumnKind::PrimaryKey(KeyType::Integer) {
            values[i] = Value::Integer(rowid);
        } else {
            values[i] = from_sql(row.get::<_, SqlValue>(index)?);
            index += 1;
        }
    }
    Ok(Row::new(rowid, values))
}

/// Row store over a shadow table, borrowing the host connection.
pub struct SqliteRowStore<'c> {
    conn: &'c Connection,
    table: ShadowTable,
    schema: Arc<TableSchema>,
}

impl<'c> SqliteRowStore<'c> {
    pub fn new(conn: &'c Connection, table: ShadowTable, schema: Arc<TableSchema>) -> Self {
        Self {
            conn,
            table,
            schema,
        }
    }

    /// Start a lazy full or partition-filtered scan that can outlive this store.
    pub fn paged_scan(&self, partition: &[(usize, Value)]) -> PagedScan {
        PagedScan::new(&self.table, self.schema.clone(), partition)
    }

    fn stored_values(&self, values: &[Value]) -> Vec<SqlValue> {
        stored_columns(&self.schema)
            .map(|(i, _)| to_sql(&values[i]))
            .collect()
    }

    fn select_where(&self, condition: &str, param: SqlValue) -> Result<Option<Row>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            select_list(&self.schema),
            self.table.rows_table(),
            condition
        );
        self.conn
            .query_row(&sql, [param], |row| read_row(&self.schema, row))
            .optional()
            .map_err(storage_error)
    }
}

impl<'c> RowStore for SqliteRowStore<'c> {
    type Scan<'a> = SqliteScan<'a> where Self: 'a;

    fn schema(&self) -> &TableSchema {
        &self.schema
    }

    fn insert(&mut self, rowid: Option<i64>, values: Vec<Value>) -> Result<i64> {
        let rowid = self.schema.resolve_rowid(rowid, &values)?;
        let values = self.schema.prepare_row(values)?;
        if let Some(key) = text_key_of(&self.schema, &values) {
            match self.get_by_key(key) {
                Ok(_) => return Err(duplicate_key(key)),
                Err(VexError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let mut params = vec![rowid.map_or(SqlValue::Null, SqlValue::Integer)];
        params.extend(self.stored_values(&values));
        let placeholders = vec!["?"; params.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table.rows_table(),
            select_list(&self.schema),
            placeholders
        );

        self.conn
            .execute(&sql, params_from_iter(params))
            .map_err(|e| match (storage_error(e), rowid) {
                (VexError::ConstraintViolation(_), Some(id)) => {
                    VexError::ConstraintViolation(format!("rowid {} already exists", id))
                }
                (other, _) => other,
            })?;
        observe::record_row_mutation("insert");
        Ok(self.conn.last_insert_rowid())
    }

    fn update(&mut self, rowid: i64, values: Vec<Value>) -> Result<()> {
        if let Some(new) = text_key_of(&self.schema, &values) {
            let current = self.get(rowid)?;
            if let Some(old) = text_key_of(&self.schema, &current.values) {
                if old != new {
                    return Err(VexError::ConstraintViolation(format!(
                        "primary key of row {} cannot change from '{}' to '{}'",
                        rowid, old, new
                    )));
                }
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
        let values = self.schema.prepare_row(values)?;

        let assignments: Vec<String> = stored_columns(&self.schema)
            .map(|(i, _)| format!("{} = ?", slot(i)))
            .collect();
        let mut params = self.stored_values(&values);
        params.push(SqlValue::Integer(rowid));

        // Every table has at least one vector column, so there is always a slot to set.
        let sql = format!(
            "UPDATE {} SET {} WHERE rowid = ?",
            self.table.rows_table(),
            assignments.join(", ")
        );
        let changed = self
            .conn
            .execute(&sql, params_from_iter(params))
            .map_err(storage_error)?;

        if changed == 0 {
            return Err(VexError::NotFound(format!("rowid {}", rowid)));
        }
        observe::record_row_mutation("update");
        Ok(())
    }

    fn delete(&mut self, rowid: i64) -> Result<()> {
        let changed = self
            .conn
            .execute(
                &format!("DELETE FROM {} WHERE rowid = ?", self.table.rows_table()),
                [rowid],
            )
            .map_err(storage_error)?;
        if changed == 0 {
            return Err(VexError::NotFound(format!("rowid {}", rowid)));
        }
        observe::record_row_mutation("delete");
        Ok(())
    }

    fn get(&self, rowid: i64) -> Result<Row> {
        self.select_where("rowid = ?", SqlValue::Integer(rowid))?
            .ok_or_else(|| VexError::NotFound(format!("rowid {}", rowid)))
    }

    fn get_by_key(&self, key: &str) -> Result<Row> {
        let found = match self.schema.text_key() {
            Some(pk) => {
                self.select_where(&format!("{} = ?", slot(pk)), SqlValue::Text(key.to_string()))?
            }
            None => None,
        };
        found.ok_or_else(|| VexError::NotFound(format!("primary key '{}'", key)))
    }

    fn scan_filtered(&self, partition: &[(usize, Value)]) -> Result<SqliteScan<'_>> {
        Ok(SqliteScan {
            conn: self.conn,
            pages: self.paged_scan(partition),
        })
    }
}

/// Lazy scan state, reading `chunk_size` rows per page in rowid order.
///
/// Holds no borrow of the connection between pages, so a cursor can keep
/// one across calls.
#[derive(Debug)]
pub struct PagedScan {
    schema: Arc<TableSchema>,
    sql: String,
    partition: Vec<SqlValue>,
    after: Option<i64>,
    buffer: VecDeque<Row>,
    exhausted: bool,
}

impl PagedScan {
    fn new(table: &ShadowTable, schema: Arc<TableSchema>, partition: &[(usize, Value)]) -> Self {
        let mut filters = vec!["rowid > ?".to_string()];
        filters.extend(partition.iter().map(|(column, _)| format!("{} = ?", slot(*column))));
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY rowid LIMIT {}",
            select_list(&schema),
            table.rows_table(),
            filters.join(" AND "),
            schema.chunk_size()
        );
        Self {
            schema,
            sql,
            partition: partition.iter().map(|(_, v)| to_sql(v)).collect(),
            after: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn next_row(&mut self, conn: &Connection) -> Result<Option<Row>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_page(conn)?;
        }
        Ok(self.buffer.pop_front())
    }

    fn fetch_page(&mut self, conn: &Connection) -> Result<()> {
        let mut params = vec![SqlValue::Integer(self.after.unwrap_or(i64::MIN))];
        params.extend(self.partition.iter().cloned());

        let mut stmt = conn.prepare(&self.sql).map_err(storage_error)?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| read_row(&self.schema, row))
            .map_err(storage_error)?;
        for row in rows {
            self.buffer.push_back(row.map_err(storage_error)?);
        }

        if self.buffer.len() < self.schema.chunk_size() {
            self.exhausted = true;
        }
        self.after = self.buffer.back().map(|row| row.rowid).or(self.after);
        Ok(())
    }
}

pub struct SqliteScan<'a> {
    conn: &'a Connection,
    pages: PagedScan,
}

impl RowScan for SqliteScan<'_> {
    fn next_row(&mut self) -> Result<Option<Row>> {
        self.pages.next_row(self.conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vex_core::parse_table_args;

    fn setup(args: &[&str]) -> (Connection, ShadowTable, Arc<TableSchema>) {
        let conn = Connection::open_in_memory().unwrap();
        let schema = Arc::new(parse_table_args(args).unwrap());
        let table = ShadowTable::new("main", "items");
        table.create(&conn, &schema).unwrap();
        (conn, table, schema)
    }

    fn ids(mut scan: impl RowScan) -> Vec<i64> {
        let mut out = Vec::new();
        while let Some(row) = scan.next_row().unwrap() {
            out.push(row.rowid);
        }
        out
    }

    #[test]
    fn test_insert_get_update_delete() {
        let (conn, table, schema) = setup(&["id integer primary key", "v float[2]", "+note"]);
        let mut store = SqliteRowStore::new(&conn, table, schema);

        let id = store
            .insert(None, vec![Value::Null, Value::from("[1, 2]"), Value::from("a")])
            .unwrap();
        assert_eq!(id, 1);
        let id = store
            .insert(None, vec![Value::Integer(7), Value::from("[3, 4]"), Value::Null])
            .unwrap();
        assert_eq!(id, 7);
        assert_eq!(
            store.insert(None, vec![Value::Null, Value::from("[0, 0]"), Value::Null]).unwrap(),
            8
        );

        let row = store.get(7).unwrap();
        assert_eq!(row.values[0], Value::Integer(7));
        assert_eq!(row.values[2], Value::Null);

        store
            .update(7, vec![Value::Null, Value::from("[5, 6]"), Value::from("b")])
            .unwrap();
        assert_eq!(store.get(7).unwrap().values[2], Value::from("b"));
        assert!(matches!(
            store.update(7, vec![Value::Integer(9), Value::from("[5, 6]"), Value::Null]),
            Err(VexError::ConstraintViolation(_))
        ));

        store.delete(7).unwrap();
        assert!(matches!(store.get(7), Err(VexError::NotFound(_))));
        assert!(matches!(store.delete(7), Err(VexError::NotFound(_))));
        assert!(matches!(
            store.update(7, vec![Value::Null, Value::from("[5, 6]"), Value::Null]),
            Err(VexError::NotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_rowid() {
        let (conn, table, schema) = setup(&["v float[1]"]);
        let mut store = SqliteRowStore::new(&conn, table, schema);
        store.insert(Some(3), vec![Value::from("[1]")]).unwrap();
        let err = store.insert(Some(3), vec![Value::from("[2]")]).unwrap_err();
        assert!(matches!(err, VexError::ConstraintViolation(_)));
    }

    #[test]
    fn test_paged_scan_crosses_pages() {
        let (conn, table, schema) = setup(&["v float[1]", "user integer partition key", "chunk_size=8"]);
        let mut store = SqliteRowStore::new(&conn, table, schema);
        for id in 1..=30 {
            store
                .insert(Some(id * 2), vec![Value::from(format!("[{}]", id)), Value::Integer(id % 3)])
                .unwrap();
        }

        let all = ids(store.scan().unwrap());
        assert_eq!(all, (1..=30).map(|i| i * 2).collect::<Vec<_>>());

        let partition = ids(store.scan_filtered(&[(1, Value::Integer(0))]).unwrap());
        assert_eq!(partition, (1..=10).map(|i| i * 6).collect::<Vec<_>>());

        // A detached paged scan keeps its position between fetches.
        let mut paged = store.paged_scan(&[]);
        let mut seen = 0;
        while paged.next_row(&conn).unwrap().is_some() {
            seen += 1;
        }
        assert_eq!(seen, 30);
    }

    #[test]
    fn test_destroy() {
        let (conn, table, _schema) = setup(&["v float[1]"]);
        let count = |conn: &Connection| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table.rows_table()), [], |r| {
                r.get::<_, i64>(0)
            })
        };
        assert_eq!(count(&conn).unwrap(), 0);
        table.destroy(&conn).unwrap();
        assert!(count(&conn).is_err());
        table.destroy(&conn).unwrap();
    }

    #[test]
    fn test_text_primary_key() {
        let (conn, table, schema) = setup(&["id text primary key", "v float[1]"]);
        let mut store = SqliteRowStore::new(&conn, table, schema);

        assert_eq!(store.insert(None, vec![Value::from("a"), Value::from("[1]")]).unwrap(), 1);
        assert_eq!(store.insert(None, vec![Value::from("b"), Value::from("[2]")]).unwrap(), 2);
        assert_eq!(store.get(1).unwrap().values[0], Value::from("a"));
        assert_eq!(store.get_by_key("b").unwrap().rowid, 2);
        assert!(matches!(store.get_by_key("z"), Err(VexError::NotFound(_))));

        let err = store
            .insert(None, vec![Value::from("a"), Value::from("[3]")])
            .unwrap_err();
        assert!(matches!(err, VexError::ConstraintViolation(m) if m.contains("'a'")));
        assert!(matches!(
            store.insert(None, vec![Value::Integer(5), Value::from("[3]")]),
            Err(VexError::ConstraintViolation(_))
        ));

        store.update(1, vec![Value::from("a"), Value::from("[9]")]).unwrap();
        assert!(matches!(
            store.update(1, vec![Value::from("c"), Value::from("[9]")]),
            Err(VexError::ConstraintViolation(_))
        ));
        store.delete(1).unwrap();
        assert!(store.get_by_key("a").is_err());
    }
}

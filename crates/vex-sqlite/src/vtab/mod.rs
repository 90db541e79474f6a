//! The `vec0` virtual table module
//!
//! `CREATE VIRTUAL TABLE items USING vec0(embedding float[384], ...)` declares
//! a table whose rows live in a shadow table and whose `MATCH` constraint
//! drives an exact KNN scan:
//!
//! ```sql
//! SELECT rowid, distance FROM items
//! WHERE embedding MATCH ?1
//! ORDER BY distance
//! LIMIT 10;
//! ```

mod cursor;

pub use cursor::VecCursor;

use crate::convert::{from_sql, host_error};
use crate::shadow::{ShadowTable, SqliteRowStore};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::vtab::{
    sqlite3_vtab, CreateVTab, IndexConstraintOp, IndexInfo, Inserts, UpdateVTab, Updates, VTab,
    VTabConnection, VTabKind,
};
use rusqlite::{ffi, Connection};
use std::os::raw::c_int;
use std::sync::Arc;
use tracing::{debug, info};
use vex_core::planner::{self, CmpOp, Constraint, ConstraintOp, OrderTerm, PlanConstraint};
use vex_core::{parse_table_args, TableSchema, Value, VexError};

pub const MODULE_NAME: &str = "vec0";

/// Register the `vec0` module on a connection.
pub fn register_module(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_module(MODULE_NAME, rusqlite::vtab::update_module::<VecTable>(), None)
}

#[repr(C)]
pub struct VecTable {
    base: sqlite3_vtab,
    db: *mut ffi::sqlite3,
    table_name: String,
    shadow: ShadowTable,
    schema: Arc<TableSchema>,
}

impl VecTable {
    pub fn name(&self) -> &str {
        &self.table_name
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Non-owning handle to the connection this table lives on.
    fn host(&self) -> rusqlite::Result<Connection> {
        // SAFETY: `db` is the live handle the table was connected with; a
        // connection built from a borrowed handle does not close it on drop.
        unsafe { Connection::from_handle(self.db) }
    }

    fn store<'c>(&self, conn: &'c Connection) -> SqliteRowStore<'c> {
        SqliteRowStore::new(conn, self.shadow.clone(), self.schema.clone())
    }

    fn column_values(
        &self,
        offset: usize,
        get: impl Fn(usize) -> rusqlite::Result<SqlValue>,
    ) -> rusqlite::Result<Vec<Value>> {
        (0..self.schema.len())
            .map(|i| get(i + offset).map(from_sql))
            .collect()
    }

    fn parse_args(args: &[&[u8]]) -> vex_core::Result<(String, String, TableSchema)> {
        let args = args
            .iter()
            .map(|arg| {
                std::str::from_utf8(arg)
                    .map_err(|e| VexError::Config(format!("vec0 argument is not UTF-8: {}", e)))
            })
            .collect::<vex_core::Result<Vec<&str>>>()?;

        // args: module name, schema name, table name, then declarations
        let (schema_name, table_name) = match args.as_slice() {
            [_, schema, table, ..] => (schema.to_string(), table.to_string()),
            _ => {
                return Err(VexError::Config(
                    "vec0 expects a schema and table name".into(),
                ))
            }
        };
        let declarations: Vec<&str> = args[3..]
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .collect();

        let schema = parse_table_args(&declarations)?;
        Ok((schema_name, table_name, schema))
    }
}

fn constraint_op(op: IndexConstraintOp) -> ConstraintOp {
    match op {
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_EQ => ConstraintOp::Cmp(CmpOp::Eq),
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_NE => ConstraintOp::Cmp(CmpOp::Ne),
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_LT => ConstraintOp::Cmp(CmpOp::Lt),
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_LE => ConstraintOp::Cmp(CmpOp::Le),
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_GT => ConstraintOp::Cmp(CmpOp::Gt),
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_GE => ConstraintOp::Cmp(CmpOp::Ge),
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_MATCH => ConstraintOp::Match,
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_LIMIT => ConstraintOp::Limit,
        _ => ConstraintOp::Other,
    }
}

/// Make `match(a, b)` resolvable so `col MATCH ?` reaches `best_index`.
fn overload_match(db: *mut ffi::sqlite3) -> rusqlite::Result<()> {
    // SAFETY: `db` is the live connection handle passed to xCreate/xConnect
    // and the name is a NUL-terminated static string.
    let rc = unsafe { ffi::sqlite3_overload_function(db, b"match\0".as_ptr().cast(), 2) };
    if rc == ffi::SQLITE_OK {
        Ok(())
    } else {
        Err(rusqlite::Error::SqliteFailure(
            ffi::Error::new(rc),
            Some("could not overload match()".into()),
        ))
    }
}

// Negative column numbers denote the rowid.
fn host_column(column: c_int) -> Option<usize> {
    usize::try_from(column).ok()
}

unsafe impl<'vtab> VTab<'vtab> for VecTable {
    type Aux = ();
    type Cursor = VecCursor<'vtab>;

    fn connect(
        db: &mut VTabConnection,
        _aux: Option<&Self::Aux>,
        args: &[&[u8]],
    ) -> rusqlite::Result<(String, Self)> {
        let (schema_name, table_name, schema) = Self::parse_args(args).map_err(host_error)?;

        // SAFETY: the handle stays valid for the lifetime of the table.
        let db_handle = unsafe { db.handle() };
        overload_match(db_handle)?;

        let sql = schema.declared_sql();
        Ok((
            sql,
            VecTable {
                base: sqlite3_vtab::default(),
                db: db_handle,
                shadow: ShadowTable::new(schema_name, table_name.clone()),
                table_name,
                schema: Arc::new(schema),
            },
        ))
    }

    fn best_index(&self, info: &mut IndexInfo) -> rusqlite::Result<()> {
        let constraints: Vec<PlanConstraint> = info
            .constraints()
            .map(|c| PlanConstraint {
                constraint: Constraint::classify(
                    &self.schema,
                    host_column(c.column()),
                    constraint_op(c.operator()),
                ),
                usable: c.is_usable(),
            })
            .collect();
        let order_by: Vec<OrderTerm> = info
            .order_bys()
            .map(|o| OrderTerm {
                column: host_column(o.column()).unwrap_or(usize::MAX),
                desc: o.is_order_by_desc(),
            })
            .collect();

        let plan = planner::plan(&self.schema, &constraints, &order_by);
        debug!(
            table = %self.table_name,
            strategy = plan.strategy.name(),
            cost = plan.estimated_cost,
            "vec0 plan"
        );

        for (i, usage) in plan.usage.iter().enumerate() {
            if let Some(usage) = usage {
                let mut slot = info.constraint_usage(i);
                slot.set_argv_index(usage.argv_index as c_int);
                slot.set_omit(usage.omit);
            }
        }
        info.set_idx_str(&plan.strategy.encode().map_err(host_error)?);
        info.set_estimated_cost(plan.estimated_cost);
        info.set_estimated_rows(plan.estimated_rows);
        info.set_order_by_consumed(plan.order_by_consumed);
        Ok(())
    }

    fn open(&mut self) -> rusqlite::Result<VecCursor<'vtab>> {
        Ok(VecCursor::new())
    }
}

impl<'vtab> CreateVTab<'vtab> for VecTable {
    const KIND: VTabKind = VTabKind::Default;

    fn create(
        db: &mut VTabConnection,
        aux: Option<&Self::Aux>,
        args: &[&[u8]],
    ) -> rusqlite::Result<(String, Self)> {
        let (sql, table) = Self::connect(db, aux, args)?;
        let conn = table.host()?;
        table
            .shadow
            .create(&conn, &table.schema)
            .map_err(host_error)?;
        info!(
            table = %table.table_name,
            columns = table.schema.len(),
            "Created vec0 table"
        );
        Ok((sql, table))
    }

    fn destroy(&self) -> rusqlite::Result<()> {
        let conn = self.host()?;
        self.shadow.destroy(&conn).map_err(host_error)?;
        info!(table = %self.table_name, "Dropped vec0 table");
        Ok(())
    }
}

impl<'vtab> UpdateVTab<'vtab> for VecTable {
    fn delete(&mut self, arg: ValueRef<'_>) -> rusqlite::Result<()> {
        let rowid = match arg {
            ValueRef::Integer(i) => i,
            other => {
                return Err(host_error(VexError::TypeMismatch(format!(
                    "DELETE requires an integer rowid, got {:?}",
                    other.data_type()
                ))))
            }
        };
        let conn = self.host()?;
        vex_core::RowStore::delete(&mut self.store(&conn), rowid).map_err(host_error)
    }

    fn insert(&mut self, args: &Inserts<'_>) -> rusqlite::Result<i64> {
        // args: [0] NULL, [1] rowid or NULL, [2..] column values, distance, k
        let rowid = args.get::<Option<i64>>(1)?;
        let values = self.column_values(2, |i| args.get::<SqlValue>(i))?;
        let conn = self.host()?;
        vex_core::RowStore::insert(&mut self.store(&conn), rowid, values).map_err(host_error)
    }

    fn update(&mut self, args: &Updates<'_>) -> rusqlite::Result<()> {
        // args: [0] old rowid, [1] new rowid, [2..] column values, distance, k
        let old_rowid = args.get::<i64>(0)?;
        let new_rowid = args.get::<i64>(1)?;
        if old_rowid != new_rowid {
            return Err(host_error(VexError::ConstraintViolation(format!(
                "changing rowid {} to {} is not supported",
                old_rowid, new_rowid
            ))));
        }
        let values = self.column_values(2, |i| args.get::<SqlValue>(i))?;
        let conn = self.host()?;
        vex_core::RowStore::update(&mut self.store(&conn), old_rowid, values).map_err(host_error)
    }
}

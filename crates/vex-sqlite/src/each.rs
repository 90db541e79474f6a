//! `vec_each`: a table-valued function yielding one row per vector element
//!
//! ```sql
//! SELECT rowid, value FROM vec_each('[1, 2, 3]');
//! ```
//!
//! The rowid is the element index. Float32 elements are returned as REAL,
//! int8 and bit elements as INTEGER. Virtual table arguments carry no
//! subtype, so a BLOB argument is read as float32; JSON text is accepted
//! as well.

use rusqlite::types::{Null, Value as SqlValue};
use rusqlite::vtab::{
    eponymous_only_module, sqlite3_vtab, sqlite3_vtab_cursor, Context, Filters,
    IndexConstraintOp, IndexInfo, VTab, VTabConfig, VTabConnection, VTabCursor,
};
use rusqlite::{ffi, Connection};
use std::marker::PhantomData;
use std::os::raw::c_int;
use vex_core::codec::{self, VectorInput};
use vex_core::{ElementType, VectorValue, VexError};

pub const MODULE_NAME: &str = "vec_each";

const VECTOR_COLUMN: c_int = 1;
const EACH_COST: f64 = 100_000.0;

/// Register the `vec_each` table-valued function on a connection.
pub fn register_module(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_module(MODULE_NAME, eponymous_only_module::<EachTable>(), None)
}

fn each_error(err: VexError) -> rusqlite::Error {
    rusqlite::Error::ModuleError(format!("vec_each: {}", err))
}

#[repr(C)]
pub struct EachTable {
    base: sqlite3_vtab,
}

unsafe impl<'vtab> VTab<'vtab> for EachTable {
    type Aux = ();
    type Cursor = EachCursor<'vtab>;

    fn connect(
        db: &mut VTabConnection,
        _aux: Option<&()>,
        _args: &[&[u8]],
    ) -> rusqlite::Result<(String, Self)> {
        db.config(VTabConfig::Innocuous)?;
        Ok((
            "CREATE TABLE x(value, vector HIDDEN)".to_owned(),
            EachTable {
                base: sqlite3_vtab::default(),
            },
        ))
    }

    fn best_index(&self, info: &mut IndexInfo) -> rusqlite::Result<()> {
        let vector = info.constraints().position(|c| {
            c.column() == VECTOR_COLUMN
                && c.is_usable()
                && c.operator() == IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_EQ
        });
        let Some(i) = vector else {
            // Without the argument there is nothing to iterate.
            return Err(rusqlite::Error::SqliteFailure(
                ffi::Error::new(ffi::SQLITE_CONSTRAINT),
                None,
            ));
        };

        let mut usage = info.constraint_usage(i);
        usage.set_argv_index(1);
        usage.set_omit(true);
        info.set_estimated_cost(EACH_COST);
        info.set_estimated_rows(EACH_COST as i64);
        Ok(())
    }

    fn open(&mut self) -> rusqlite::Result<EachCursor<'vtab>> {
        Ok(EachCursor {
            base: sqlite3_vtab_cursor::default(),
            vector: None,
            bytes: Vec::new(),
            index: 0,
            phantom: PhantomData,
        })
    }
}

#[repr(C)]
pub struct EachCursor<'vtab> {
    base: sqlite3_vtab_cursor,
    vector: Option<VectorValue>,
    bytes: Vec<u8>,
    index: usize,
    phantom: PhantomData<&'vtab EachTable>,
}

fn read_vector(value: &SqlValue) -> vex_core::Result<VectorValue> {
    let input = match value {
        SqlValue::Blob(bytes) => VectorInput::Blob(bytes),
        SqlValue::Text(text) => VectorInput::Text(text),
        other => {
            return Err(VexError::TypeMismatch(format!(
                "expected a vector BLOB or JSON array, got {:?}",
                other.data_type()
            )))
        }
    };
    codec::coerce(input, ElementType::Float32, None)
}

unsafe impl VTabCursor for EachCursor<'_> {
    fn filter(
        &mut self,
        _idx_num: c_int,
        _idx_str: Option<&str>,
        args: &Filters<'_>,
    ) -> rusqlite::Result<()> {
        self.vector = None;
        self.index = 0;
        let vector = read_vector(&args.get::<SqlValue>(0)?).map_err(each_error)?;
        self.bytes = codec::encode(&vector).map_err(each_error)?;
        self.vector = Some(vector);
        Ok(())
    }

    fn next(&mut self) -> rusqlite::Result<()> {
        self.index += 1;
        Ok(())
    }

    fn eof(&self) -> bool {
        self.vector
            .as_ref()
            .map_or(true, |v| self.index >= v.dimension())
    }

    fn column(&self, ctx: &mut Context, col: c_int) -> rusqlite::Result<()> {
        if col == VECTOR_COLUMN {
            return ctx.set_result(&self.bytes);
        }
        match &self.vector {
            Some(VectorValue::Float32(v)) => ctx.set_result(&(v[self.index] as f64)),
            Some(VectorValue::Int8(v)) => ctx.set_result(&i64::from(v[self.index])),
            Some(VectorValue::Bit(bits)) => ctx.set_result(&i64::from(bits.get(self.index))),
            None => ctx.set_result(&Null),
        }
    }

    fn rowid(&self) -> rusqlite::Result<i64> {
        Ok(self.index as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::functions::register_functions(&conn).unwrap();
        register_module(&conn).unwrap();
        conn
    }

    fn rows(conn: &Connection, sql: &str) -> Vec<(i64, f64)> {
        let mut stmt = conn.prepare(sql).unwrap();
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        rows
    }

    #[test]
    fn test_each_element_of_json_and_blob() {
        let conn = conn();
        let expected = vec![(0, 1.0), (1, -2.5), (2, 3.0)];
        assert_eq!(rows(&conn, "SELECT rowid, value FROM vec_each('[1, -2.5, 3]')"), expected);
        assert_eq!(
            rows(&conn, "SELECT rowid, value FROM vec_each(vec_f32('[1, -2.5, 3]'))"),
            expected
        );
    }

    #[test]
    fn test_each_joins_against_a_table() {
        let conn = conn();
        conn.execute_batch(
            "CREATE TABLE docs(id INTEGER PRIMARY KEY, v BLOB);
             INSERT INTO docs VALUES (1, vec_f32('[1, 2]')), (2, vec_f32('[3]'));",
        )
        .unwrap();
        let total: f64 = conn
            .query_row(
                "SELECT SUM(e.value) FROM docs, vec_each(docs.v) AS e",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(total, 6.0);
    }

    #[test]
    fn test_each_rejects_bad_input() {
        let conn = conn();
        for sql in [
            "SELECT value FROM vec_each(12)",
            "SELECT value FROM vec_each(x'000000')",
            "SELECT value FROM vec_each('[1, 2')",
            "SELECT value FROM vec_each",
        ] {
            let result = conn.prepare(sql).and_then(|mut stmt| {
                let values = stmt
                    .query_map([], |r| r.get::<_, f64>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>();
                values
            });
            assert!(result.is_err(), "{}", sql);
        }
    }
}

use super::VecTable;
use crate::convert::{from_sql, host_error, to_sql};
use crate::shadow::PagedScan;
use rusqlite::types::{Null, Value as SqlValue};
use rusqlite::vtab::{sqlite3_vtab_cursor, Context, Filters, VTabCursor};
use std::marker::PhantomData;
use std::os::raw::c_int;
use vex_core::knn::{Candidate, KnnQuery, KnnScan};
use vex_core::planner::ScanStrategy;
use vex_core::{Affinity, Row, RowStore, Value, VexError};

enum CursorState {
    Idle,
    FullScan {
        pages: PagedScan,
        current: Option<Row>,
    },
    Point {
        row: Option<Row>,
    },
    Knn {
        scan: KnnScan,
        current: Option<(Candidate, Row)>,
    },
}

impl CursorState {
    fn current_row(&self) -> Option<&Row> {
        match self {
            CursorState::Idle => None,
            CursorState::FullScan { current, .. } => current.as_ref(),
            CursorState::Point { row } => row.as_ref(),
            CursorState::Knn { current, .. } => current.as_ref().map(|(_, row)| row),
        }
    }
}

/// Cursor over one vec0 scan
///
/// Each `filter` call replaces the previous state; buffers and the KNN
/// result set are released when the cursor is re-filtered or closed.
#[repr(C)]
pub struct VecCursor<'vtab> {
    base: sqlite3_vtab_cursor,
    state: CursorState,
    phantom: PhantomData<&'vtab VecTable>,
}

impl<'vtab> VecCursor<'vtab> {
    pub(super) fn new() -> Self {
        Self {
            base: sqlite3_vtab_cursor::default(),
            state: CursorState::Idle,
            phantom: PhantomData,
        }
    }

    fn table(&self) -> &'vtab VecTable {
        // SAFETY: SQLite sets pVtab to the owning table, which outlives its cursors.
        unsafe { &*(self.base.pVtab as *const VecTable) }
    }

    fn start(&mut self, strategy: ScanStrategy, args: Vec<Value>) -> vex_core::Result<()> {
        let table = self.table();
        let conn = table.host().map_err(crate::convert::storage_error)?;
        let store = table.store(&conn);

        self.state = match strategy {
            ScanStrategy::FullScan => {
                let mut pages = store.paged_scan(&[]);
                let current = pages.next_row(&conn)?;
                CursorState::FullScan { pages, current }
            }
            ScanStrategy::Point => {
                let row = match args.first() {
                    Some(Value::Integer(rowid)) => found(store.get(*rowid))?,
                    Some(Value::Real(f)) if f.fract() == 0.0 => found(store.get(*f as i64))?,
                    _ => None,
                };
                CursorState::Point { row }
            }
            ScanStrategy::KeyLookup => {
                let key = args.into_iter().next().map(|v| v.with_affinity(Affinity::Text));
                let row = match key {
                    Some(Value::Text(key)) => found(store.get_by_key(&key))?,
                    _ => None,
                };
                CursorState::Point { row }
            }
            ScanStrategy::Knn(plan) => {
                let query = KnnQuery::bind(table.schema(), &plan, args)?;
                let mut scan = KnnScan::new(query);
                scan.run(&store)?;
                let current = next_neighbor(&mut scan, &store)?;
                CursorState::Knn { scan, current }
            }
        };
        Ok(())
    }

    fn advance(&mut self) -> vex_core::Result<()> {
        let table = self.table();
        match &mut self.state {
            CursorState::Idle => {}
            CursorState::FullScan { pages, current } => {
                let conn = table.host().map_err(crate::convert::storage_error)?;
                *current = pages.next_row(&conn)?;
            }
            CursorState::Point { row } => *row = None,
            CursorState::Knn { scan, current } => {
                let conn = table.host().map_err(crate::convert::storage_error)?;
                *current = next_neighbor(scan, &table.store(&conn))?;
            }
        }
        Ok(())
    }
}

fn found(lookup: vex_core::Result<Row>) -> vex_core::Result<Option<Row>> {
    match lookup {
        Ok(row) => Ok(Some(row)),
        Err(VexError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn next_neighbor<S: RowStore>(
    scan: &mut KnnScan,
    store: &S,
) -> vex_core::Result<Option<(Candidate, Row)>> {
    match scan.next() {
        Some(candidate) => {
            let row = store.get(candidate.rowid)?;
            Ok(Some((candidate, row)))
        }
        None => Ok(None),
    }
}

unsafe impl VTabCursor for VecCursor<'_> {
    fn filter(
        &mut self,
        _idx_num: c_int,
        idx_str: Option<&str>,
        args: &Filters<'_>,
    ) -> rusqlite::Result<()> {
        self.state = CursorState::Idle;
        let strategy = match idx_str {
            Some(descriptor) => ScanStrategy::decode(descriptor).map_err(host_error)?,
            None => ScanStrategy::FullScan,
        };
        let args = (0..args.len())
            .map(|i| args.get::<SqlValue>(i).map(from_sql))
            .collect::<rusqlite::Result<Vec<Value>>>()?;

        let result = self.start(strategy, args);
        if result.is_err() {
            self.state = CursorState::Idle;
        }
        result.map_err(host_error)
    }

    fn next(&mut self) -> rusqlite::Result<()> {
        let result = self.advance();
        if result.is_err() {
            self.state = CursorState::Idle;
        }
        result.map_err(host_error)
    }

    fn eof(&self) -> bool {
        self.state.current_row().is_none()
    }

    fn column(&self, ctx: &mut Context, col: c_int) -> rusqlite::Result<()> {
        let schema = self.table().schema();
        let col = usize::try_from(col).unwrap_or(usize::MAX);

        if col == schema.distance_column() {
            return match &self.state {
                CursorState::Knn {
                    current: Some((candidate, _)),
                    ..
                } => ctx.set_result(&(candidate.distance as f64)),
                _ => ctx.set_result(&Null),
            };
        }
        if col == schema.k_column() {
            return match &self.state {
                CursorState::Knn { scan, .. } => match scan.query().k {
                    Some(k) => ctx.set_result(&(k as i64)),
                    None => ctx.set_result(&Null),
                },
                _ => ctx.set_result(&Null),
            };
        }

        match self.state.current_row().and_then(|row| row.value(col)) {
            Some(value) => ctx.set_result(&to_sql(value)),
            None => ctx.set_result(&Null),
        }
    }

    fn rowid(&self) -> rusqlite::Result<i64> {
        self.state
            .current_row()
            .map(|row| row.rowid)
            .ok_or_else(|| host_error(VexError::Internal("cursor is past the last row".into())))
    }
}

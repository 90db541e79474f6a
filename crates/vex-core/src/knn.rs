//! Exact k-nearest-neighbor scan over a row store
//!
//! A [`KnnScan`] moves through `Uninitialized -> Filtering -> Emitting -> Done`.
//! Filtering consumes the whole candidate sequence once, scoring every row
//! that passes the pre-filters and keeping at most `k` of them in a bounded
//! max-heap. Emitting drains the survivors in ascending distance, ties broken
//! by ascending rowid.

use crate::codec::{self, VectorInput};
use crate::error::{Result, VexError};
use crate::observe;
use crate::planner::{CmpOp, KnnArg, KnnBound, KnnPlan};
use crate::store::{partition_matches, RowScan, RowStore};
use crate::types::schema::{in_column, TableSchema};
use crate::types::value::{Affinity, Row, Value};
use crate::types::vector::{ElementType, Metric, VectorValue};
use crate::distance::distance;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;
use tracing::debug;

// Upper bound on heap capacity reserved up front; k itself may be huge.
const MAX_RESERVED_CANDIDATES: usize = 1024;

/// Pre-filters applied to each candidate before it is admitted to the heap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateFilter {
    /// Partition column equalities.
    pub partition: Vec<(usize, Value)>,
    /// Metadata column comparisons: `column <op> value`.
    pub metadata: Vec<(usize, CmpOp, Value)>,
    /// Bounds on the computed distance: `distance <op> bound`.
    pub distance: Vec<(CmpOp, f64)>,
}

impl CandidateFilter {
    fn accepts_row(&self, values: &[Value]) -> bool {
        partition_matches(values, &self.partition)
            && self.metadata.iter().all(|(column, op, expected)| {
                values
                    .get(*column)
                    .and_then(|v| v.sql_cmp(expected))
                    .map_or(false, |ordering| op.accepts(ordering))
            })
    }

    fn accepts_distance(&self, d: f32) -> bool {
        self.distance.iter().all(|(op, bound)| {
            (d as f64)
                .partial_cmp(bound)
                .map_or(false, |ordering| op.accepts(ordering))
        })
    }
}

/// A bound KNN request against one vector column.
#[derive(Debug, Clone, PartialEq)]
pub struct KnnQuery {
    pub column: usize,
    pub vector: VectorValue,
    pub metric: Metric,
    /// None scores every row.
    pub k: Option<usize>,
    pub filter: CandidateFilter,
}

impl KnnQuery {
    pub fn new(schema: &TableSchema, column: usize, vector: VectorValue, k: Option<usize>) -> Result<Self> {
        let target = schema.vector_column(column).ok_or_else(|| {
            VexError::Internal(format!("column {} is not a vector column", column))
        })?;
        if vector.element_type() != target.element_type || vector.dimension() != target.dimension {
            return Err(VexError::TypeMismatch(format!(
                "query vector {}[{}] does not match column '{}' {}[{}]",
                vector.element_type(),
                vector.dimension(),
                target.name,
                target.element_type,
                target.dimension
            )));
        }
        Ok(Self {
            column,
            vector,
            metric: target.metric,
            k,
            filter: CandidateFilter::default(),
        })
    }

    /// Bind the filter arguments of a planned KNN scan.
    ///
    /// `args` arrive in the order given by `plan.args`.
    pub fn bind(schema: &TableSchema, plan: &KnnPlan, args: Vec<Value>) -> Result<Self> {
        if args.len() != plan.args.len() {
            return Err(VexError::Internal(format!(
                "KNN plan expects {} arguments, got {}",
                plan.args.len(),
                args.len()
            )));
        }
        let target = schema.vector_column(plan.column).ok_or_else(|| {
            VexError::Internal(format!("column {} is not a vector column", plan.column))
        })?;

        let mut vector = None;
        let mut k = None;
        let mut filter = CandidateFilter::default();

        for (arg, value) in plan.args.iter().zip(args) {
            match arg {
                KnnArg::Query => {
                    let input = match &value {
                        Value::Blob(b) => VectorInput::Blob(b),
                        Value::Text(t) => VectorInput::Text(t),
                        other => {
                            return Err(VexError::TypeMismatch(format!(
                                "column '{}': MATCH expects a vector BLOB or JSON array, got {}",
                                target.name,
                                other.type_name()
                            )))
                        }
                    };
                    let decoded = codec::coerce(input, target.element_type, Some(target.dimension))
                        .map_err(|e| in_column(e, &target.name))?;
                    vector = Some(decoded);
                }
                KnnArg::K => match value {
                    Value::Integer(n) if n >= 0 => k = Some(n as usize),
                    Value::Integer(n) => {
                        return Err(VexError::ConstraintViolation(format!(
                            "k must be greater than or equal to 0, got {}",
                            n
                        )))
                    }
                    other => {
                        return Err(VexError::TypeMismatch(format!(
                            "k must be an integer, got {}",
                            other.type_name()
                        )))
                    }
                },
                // A negative LIMIT means no limit.
                KnnArg::Limit => match value {
                    Value::Integer(n) if n >= 0 => k = Some(n as usize),
                    Value::Integer(_) => k = None,
                    other => {
                        return Err(VexError::TypeMismatch(format!(
                            "LIMIT must be an integer, got {}",
                            other.type_name()
                        )))
                    }
                },
                KnnArg::Partition { column } => {
                    filter.partition.push((*column, with_column_affinity(schema, *column, value)))
                }
                KnnArg::Metadata { column, op } => {
                    let value = with_column_affinity(schema, *column, value);
                    filter.metadata.push((*column, *op, value))
                }
                KnnArg::Distance { op } => {
                    let value = value.with_affinity(Affinity::Real);
                    let bound = value.as_f64().ok_or_else(|| {
                        VexError::TypeMismatch(format!(
                            "distance constraint expects a number, got {}",
                            value.type_name()
                        ))
                    })?;
                    filter.distance.push((*op, bound));
                }
            }
        }

        let vector = vector.ok_or_else(|| {
            VexError::Internal("KNN plan has no query argument".into())
        })?;
        if plan.bound == KnnBound::Unbounded {
            k = None;
        }

        Ok(Self {
            column: plan.column,
            vector,
            metric: target.metric,
            k,
            filter,
        })
    }
}

// Filter operands are compared the way the host compares them against the
// declared column, so `user = '1'` matches an integer partition key.
fn with_column_affinity(schema: &TableSchema, column: usize, value: Value) -> Value {
    match schema.column(column) {
        Some(def) => value.with_affinity(def.affinity()),
        None => value,
    }
}

/// A scored candidate. Orders by distance, then rowid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub rowid: i64,
    pub distance: f32,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.rowid.cmp(&other.rowid))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub rows_scanned: u64,
    /// Largest number of candidates held at once.
    pub peak_heap_len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnnState {
    Uninitialized,
    Filtering,
    Emitting,
    Done,
}

enum Phase {
    Uninitialized,
    Filtering,
    Emitting(std::vec::IntoIter<Candidate>),
    Done,
}

pub struct KnnScan {
    query: KnnQuery,
    element_type: ElementType,
    dimension: usize,
    phase: Phase,
    stats: ScanStats,
}

impl KnnScan {
    pub fn new(query: KnnQuery) -> Self {
        Self {
            element_type: query.vector.element_type(),
            dimension: query.vector.dimension(),
            query,
            phase: Phase::Uninitialized,
            stats: ScanStats::default(),
        }
    }

    pub fn query(&self) -> &KnnQuery {
        &self.query
    }

    pub fn state(&self) -> KnnState {
        match self.phase {
            Phase::Uninitialized => KnnState::Uninitialized,
            Phase::Filtering => KnnState::Filtering,
            Phase::Emitting(_) => KnnState::Emitting,
            Phase::Done => KnnState::Done,
        }
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Run the filtering phase against a store, scanning only the query's partition.
    pub fn run<S: RowStore>(&mut self, store: &S) -> Result<()> {
        let scan = store.scan_filtered(&self.query.filter.partition)?;
        self.filter(scan)
    }

    /// Run the filtering phase over an arbitrary candidate sequence.
    pub fn filter(&mut self, mut scan: impl RowScan) -> Result<()> {
        if !matches!(self.phase, Phase::Uninitialized) {
            return Err(VexError::Internal("KNN scan was already filtered".into()));
        }
        self.phase = Phase::Filtering;

        if self.query.k == Some(0) {
            self.phase = Phase::Done;
            return Ok(());
        }

        let started = Instant::now();
        let result = match self.query.k {
            Some(k) => self.collect_bounded(&mut scan, k),
            None => self.collect_all(&mut scan),
        };
        let sorted = match result {
            Ok(sorted) => sorted,
            Err(e) => {
                self.phase = Phase::Done;
                return Err(e);
            }
        };

        observe::record_knn_scan(started.elapsed(), self.stats.rows_scanned, sorted.len() as u64);
        observe::set_heap_peak(self.stats.peak_heap_len);
        debug!(
            rows_scanned = self.stats.rows_scanned,
            peak_heap_len = self.stats.peak_heap_len,
            emitted = sorted.len(),
            "KNN filtering complete"
        );

        self.phase = Phase::Emitting(sorted.into_iter());
        Ok(())
    }

    fn collect_bounded(&mut self, scan: &mut impl RowScan, k: usize) -> Result<Vec<Candidate>> {
        let mut heap: BinaryHeap<Candidate> =
            BinaryHeap::with_capacity(k.min(MAX_RESERVED_CANDIDATES));

        while let Some(row) = scan.next_row()? {
            let Some(candidate) = self.score(&row)? else {
                continue;
            };
            if heap.len() < k {
                heap.push(candidate);
                self.stats.peak_heap_len = self.stats.peak_heap_len.max(heap.len());
            } else if heap.peek().map_or(false, |worst| candidate < *worst) {
                heap.pop();
                heap.push(candidate);
            }
        }
        Ok(heap.into_sorted_vec())
    }

    fn collect_all(&mut self, scan: &mut impl RowScan) -> Result<Vec<Candidate>> {
        let mut all = Vec::new();
        while let Some(row) = scan.next_row()? {
            if let Some(candidate) = self.score(&row)? {
                all.push(candidate);
            }
        }
        self.stats.peak_heap_len = all.len();
        all.sort_unstable();
        Ok(all)
    }

    fn score(&mut self, row: &Row) -> Result<Option<Candidate>> {
        self.stats.rows_scanned += 1;
        if !self.query.filter.accepts_row(&row.values) {
            return Ok(None);
        }

        let bytes = match row.value(self.query.column) {
            Some(Value::Blob(bytes)) => bytes,
            Some(other) => {
                return Err(VexError::Storage(format!(
                    "row {} holds a {} in a vector column",
                    row.rowid,
                    other.type_name()
                )))
            }
            None => {
                return Err(VexError::Storage(format!(
                    "row {} is missing vector column {}",
                    row.rowid, self.query.column
                )))
            }
        };
        let stored = codec::decode(bytes, self.element_type, self.dimension)?;
        let d = distance(&stored, &self.query.vector, self.query.metric)?;

        if !self.query.filter.accepts_distance(d) {
            return Ok(None);
        }
        Ok(Some(Candidate {
            rowid: row.rowid,
            distance: d,
        }))
    }

    /// Next neighbor in ascending distance order; None once exhausted.
    pub fn next(&mut self) -> Option<Candidate> {
        match &mut self.phase {
            Phase::Emitting(results) => match results.next() {
                Some(candidate) => Some(candidate),
                None => {
                    self.phase = Phase::Done;
                    None
                }
            },
            _ => None,
        }
    }

    /// Abandon the scan, releasing any buffered candidates.
    pub fn cancel(&mut self) {
        self.phase = Phase::Done;
    }
}

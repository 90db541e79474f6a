//! Constraint negotiation for vec0 scans
//!
//! The host describes the constraints and ORDER BY terms of a candidate plan;
//! [`plan`] picks a [`ScanStrategy`], assigns argument slots for the
//! constraints it consumes, and reports an estimated cost. The strategy is
//! carried to execution as a serialized descriptor string.

use crate::error::{Result, VexError};
use crate::observe;
use crate::types::schema::{ColumnKind, KeyType, TableSchema};
use crate::types::vector::ElementType;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const KNN_COST: f64 = 30.0;
pub const KNN_ROWS: i64 = 10;
pub const UNBOUNDED_KNN_COST: f64 = 300_000.0;
pub const POINT_COST: f64 = 10.0;
pub const POINT_ROWS: i64 = 1;
pub const FULL_SCAN_COST: f64 = 3_000_000.0;
pub const FULL_SCAN_ROWS: i64 = 100_000;

/// Comparison operator of a scalar constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    /// Whether `ordering` (left compared to right) satisfies the operator.
    pub fn accepts(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CmpOp::Eq => ordering == Equal,
            CmpOp::Ne => ordering != Equal,
            CmpOp::Lt => ordering == Less,
            CmpOp::Le => ordering != Greater,
            CmpOp::Gt => ordering == Greater,
            CmpOp::Ge => ordering != Less,
        }
    }
}

/// Operator as reported by the host, before classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    Cmp(CmpOp),
    Match,
    Limit,
    Other,
}

/// Element type and dimension of a MATCH argument, when visible at plan time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryShape {
    pub element_type: ElementType,
    pub dimension: usize,
}

/// A host constraint, classified against the table schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    RowidEq,
    /// Equality on a `text primary key`.
    KeyEq,
    Match {
        column: usize,
        query: Option<QueryShape>,
    },
    Limit,
    KEq,
    Distance(CmpOp),
    Partition {
        column: usize,
    },
    Metadata {
        column: usize,
        op: CmpOp,
    },
    Unsupported,
}

impl Constraint {
    /// Classify a host constraint. `column` is None for the rowid.
    pub fn classify(schema: &TableSchema, column: Option<usize>, op: ConstraintOp) -> Self {
        let column = match (op, column) {
            (ConstraintOp::Limit, _) => return Constraint::Limit,
            (ConstraintOp::Cmp(CmpOp::Eq), None) => return Constraint::RowidEq,
            (_, None) => return Constraint::Unsupported,
            (_, Some(c)) => c,
        };

        if column == schema.distance_column() {
            return match op {
                ConstraintOp::Cmp(op @ (CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge)) => {
                    Constraint::Distance(op)
                }
                _ => Constraint::Unsupported,
            };
        }
        if column == schema.k_column() {
            return match op {
                ConstraintOp::Cmp(CmpOp::Eq) => Constraint::KEq,
                _ => Constraint::Unsupported,
            };
        }

        match (schema.column(column).map(|c| &c.kind), op) {
            (Some(ColumnKind::PrimaryKey(KeyType::Integer)), ConstraintOp::Cmp(CmpOp::Eq)) => {
                Constraint::RowidEq
            }
            (Some(ColumnKind::PrimaryKey(KeyType::Text)), ConstraintOp::Cmp(CmpOp::Eq)) => {
                Constraint::KeyEq
            }
            (Some(ColumnKind::Vector(_)), ConstraintOp::Match) => Constraint::Match {
                column,
                query: None,
            },
            (Some(ColumnKind::PartitionKey(_)), ConstraintOp::Cmp(CmpOp::Eq)) => {
                Constraint::Partition { column }
            }
            (Some(ColumnKind::Metadata(_)), ConstraintOp::Cmp(op)) => {
                Constraint::Metadata { column, op }
            }
            _ => Constraint::Unsupported,
        }
    }
}

/// One entry of the host's constraint array.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanConstraint {
    pub constraint: Constraint,
    pub usable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: usize,
    pub desc: bool,
}

/// How a KNN scan is bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnnBound {
    Limit,
    K,
    Unbounded,
}

/// Meaning of each filter argument of a KNN scan, in argument order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "arg", rename_all = "snake_case")]
pub enum KnnArg {
    Query,
    K,
    Limit,
    Partition { column: usize },
    Metadata { column: usize, op: CmpOp },
    Distance { op: CmpOp },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnnPlan {
    pub column: usize,
    pub bound: KnnBound,
    pub args: Vec<KnnArg>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "plan", rename_all = "snake_case")]
pub enum ScanStrategy {
    FullScan,
    /// Rowid equality; one argument.
    Point,
    /// Text primary key equality; one argument.
    KeyLookup,
    Knn(KnnPlan),
}

impl ScanStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ScanStrategy::FullScan => "full_scan",
            ScanStrategy::Point => "point",
            ScanStrategy::KeyLookup => "key_lookup",
            ScanStrategy::Knn(k) if k.bound == KnnBound::Unbounded => "knn_unbounded",
            ScanStrategy::Knn(_) => "knn",
        }
    }

    /// Serialize into the plan descriptor handed from planning to execution.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| VexError::Internal(format!("failed to encode scan plan: {}", e)))
    }

    pub fn decode(descriptor: &str) -> Result<Self> {
        serde_json::from_str(descriptor).map_err(|e| {
            VexError::Internal(format!("invalid scan plan '{}': {}", descriptor, e))
        })
    }
}

/// Argument slot assigned to a consumed constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintUsage {
    /// 1-based position among the filter arguments.
    pub argv_index: usize,
    pub omit: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub strategy: ScanStrategy,
    /// Parallel to the request's constraints.
    pub usage: Vec<Option<ConstraintUsage>>,
    pub estimated_cost: f64,
    pub estimated_rows: i64,
    pub order_by_consumed: bool,
}

/// Choose a scan strategy for the given constraints and ORDER BY terms.
///
/// An infeasible KNN request falls back to a point or full scan that leaves
/// the MATCH constraint unconsumed, so the host reports it.
pub fn plan(schema: &TableSchema, constraints: &[PlanConstraint], order_by: &[OrderTerm]) -> Plan {
    let has_match = constraints
        .iter()
        .any(|c| c.usable && matches!(c.constraint, Constraint::Match { .. }));

    if has_match {
        match plan_knn(schema, constraints, order_by) {
            Ok(plan) => {
                observe::record_plan(plan.strategy.name());
                return plan;
            }
            Err(e) => {
                debug!("KNN plan rejected, falling back: {}", e);
                observe::record_plan_fallback();
            }
        }
    }

    let plan = plan_scan(constraints);
    observe::record_plan(plan.strategy.name());
    plan
}

fn plan_knn(
    schema: &TableSchema,
    constraints: &[PlanConstraint],
    order_by: &[OrderTerm],
) -> Result<Plan> {
    let usable = || constraints.iter().enumerate().filter(|(_, c)| c.usable);

    let matches: Vec<(usize, usize, Option<QueryShape>)> = usable()
        .filter_map(|(i, c)| match c.constraint {
            Constraint::Match { column, query } => Some((i, column, query)),
            _ => None,
        })
        .collect();
    let (match_index, column, shape) = match matches.as_slice() {
        [single] => *single,
        [] => return Err(VexError::PlanInfeasible("no usable MATCH constraint".into())),
        _ => {
            return Err(VexError::PlanInfeasible(
                "only one MATCH constraint is allowed per query".into(),
            ))
        }
    };

    let vector = schema.vector_column(column).ok_or_else(|| {
        VexError::PlanInfeasible(format!("column {} is not a vector column", column))
    })?;
    if let Some(shape) = shape {
        if shape.element_type != vector.element_type || shape.dimension != vector.dimension {
            return Err(VexError::PlanInfeasible(format!(
                "query vector {}[{}] does not match column '{}' {}[{}]",
                shape.element_type, shape.dimension, vector.name, vector.element_type, vector.dimension
            )));
        }
    }

    let order_by_consumed = match order_by {
        [] => false,
        [term] if term.column == schema.distance_column() && !term.desc => true,
        _ => {
            return Err(VexError::PlanInfeasible(
                "KNN results can only be ordered by distance ascending".into(),
            ))
        }
    };

    let limit = usable().find(|(_, c)| c.constraint == Constraint::Limit).map(|(i, _)| i);
    let k = usable().find(|(_, c)| c.constraint == Constraint::KEq).map(|(i, _)| i);

    let mut usage = vec![None; constraints.len()];
    let mut args = Vec::new();
    let mut assign = |index: usize, arg: KnnArg, args: &mut Vec<KnnArg>| {
        args.push(arg);
        usage[index] = Some(ConstraintUsage {
            argv_index: args.len(),
            omit: true,
        });
    };

    assign(match_index, KnnArg::Query, &mut args);
    let bound = match (limit, k) {
        (Some(_), Some(_)) => {
            return Err(VexError::PlanInfeasible(
                "LIMIT and k = ? cannot both bound a KNN query".into(),
            ))
        }
        (Some(i), None) => {
            assign(i, KnnArg::Limit, &mut args);
            KnnBound::Limit
        }
        (None, Some(i)) => {
            assign(i, KnnArg::K, &mut args);
            KnnBound::K
        }
        (None, None) => KnnBound::Unbounded,
    };

    for (i, c) in usable() {
        match c.constraint {
            Constraint::Partition { column } => assign(i, KnnArg::Partition { column }, &mut args),
            Constraint::Metadata { column, op } => {
                assign(i, KnnArg::Metadata { column, op }, &mut args)
            }
            Constraint::Distance(op) => assign(i, KnnArg::Distance { op }, &mut args),
            _ => {}
        }
    }

    let (estimated_cost, estimated_rows) = match bound {
        KnnBound::Unbounded => (UNBOUNDED_KNN_COST, FULL_SCAN_ROWS),
        _ => (KNN_COST, KNN_ROWS),
    };

    Ok(Plan {
        strategy: ScanStrategy::Knn(KnnPlan {
            column,
            bound,
            args,
        }),
        usage,
        estimated_cost,
        estimated_rows,
        order_by_consumed,
    })
}

fn plan_scan(constraints: &[PlanConstraint]) -> Plan {
    let mut usage = vec![None; constraints.len()];
    let find = |wanted: Constraint| {
        constraints
            .iter()
            .position(|c| c.usable && c.constraint == wanted)
    };
    let point = match find(Constraint::RowidEq) {
        Some(i) => Some((i, ScanStrategy::Point)),
        None => find(Constraint::KeyEq).map(|i| (i, ScanStrategy::KeyLookup)),
    };

    match point {
        Some((i, strategy)) => {
            usage[i] = Some(ConstraintUsage {
                argv_index: 1,
                omit: true,
            });
            Plan {
                strategy,
                usage,
                estimated_cost: POINT_COST,
                estimated_rows: POINT_ROWS,
                order_by_consumed: false,
            }
        }
        None => Plan {
            strategy: ScanStrategy::FullScan,
            usage,
            estimated_cost: FULL_SCAN_COST,
            estimated_rows: FULL_SCAN_ROWS,
            order_by_consumed: false,
        },
    }
}

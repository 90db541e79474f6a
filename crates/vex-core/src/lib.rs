//! Vex Core: host-independent pieces of the vec0 vector search table
//!
//! This crate holds everything that does not need SQLite:
//! - Vector types and the packed little-endian wire format
//! - Distance kernels (L2, L1, cosine, Hamming) and vector arithmetic
//! - Table schemas parsed from `vec0(...)` declarations
//! - The `RowStore` abstraction with an in-memory implementation
//! - Constraint negotiation (planner) and the exact KNN executor
//!
//! Key features:
//! - Bounded memory: a KNN scan keeps at most `k` candidates
//! - Deterministic output: ascending distance, ties by ascending rowid
//! - Plans travel from negotiation to execution as serialized descriptors

pub mod codec;
pub mod config;
pub mod ddl;
pub mod distance;
pub mod error;
pub mod knn;
pub mod observe;
pub mod ops;
pub mod planner;
pub mod store;
pub mod types;

pub use codec::VectorInput;
pub use config::{ReadPoolConfig, StoreConfig, SynchronousMode};
pub use ddl::parse_table_args;
pub use distance::distance;
pub use error::{Result, VexError};
pub use knn::{Candidate, CandidateFilter, KnnQuery, KnnScan, KnnState, ScanStats};
pub use planner::{
    plan, CmpOp, Constraint, ConstraintOp, ConstraintUsage, KnnArg, KnnBound, KnnPlan,
    OrderTerm, Plan, PlanConstraint, QueryShape, ScanStrategy,
};
pub use store::{MemoryRowStore, RowScan, RowStore};
pub use types::{
    Affinity, BitVector, ColumnDef, ColumnKind, ElementType, KeyType, MetadataType, Metric, Row,
    TableSchema, Value, VectorColumn, VectorValue,
};

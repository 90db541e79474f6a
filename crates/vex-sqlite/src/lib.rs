//! SQLite integration for vex
//!
//! Provides the `vec0` virtual table for exact KNN search, the `vec_each`
//! table-valued function, the `vec_*` scalar functions, and a store handle
//! that opens databases with all of them registered.
//!
//! Key features:
//! - `MATCH` + `LIMIT`/`k` queries planned and executed with bounded memory
//! - Rows persisted in a per-table shadow table, scanned in `chunk_size` pages
//! - Partition, metadata and distance constraints applied during the scan
//! - Optional read-only connection pool for concurrent queries

pub mod convert;
pub mod each;
pub mod functions;
pub mod read_pool;
pub mod register;
pub mod shadow;
pub mod store;
pub mod txn;
pub mod vtab;

pub use read_pool::{PooledSqliteConnection, SqliteReadPool};
pub use register::{register, AutoRegistration};
pub use store::SqliteVecStore;
pub use txn::WriteTxn;
pub use vtab::{VecCursor, VecTable, MODULE_NAME};

/// Crate version reported by `vec_version()`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

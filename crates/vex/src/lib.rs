//! Vector similarity search over SQLite `vec0` tables
//!
//! This crate is the high-level entry point of vex. It re-exports the store
//! handle from `vex-sqlite` and adds a typed search API on top of the `vec0`
//! virtual table.
//!
//! # Features
//!
//! - Vector types float32, int8 and bit
//! - Distance metrics L2, L1, cosine and Hamming
//! - Exact k-NN search with partition, metadata and distance filters
//! - Migration helpers for creating and dropping vector tables
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vex::{SqliteVecStore, StoreConfig, Vector, VectorConfig, VectorExtension, VectorSearch};
//!
//! # async fn example() -> vex::Result<()> {
//! let store = Arc::new(SqliteVecStore::open(StoreConfig::new("./data/vectors.db"))?);
//! store.vector_init("embeddings", "vector", VectorConfig::float32(3))?;
//!
//! let vector = Vector::new(vec![0.1, 0.2, 0.3]);
//! let blob = vector.to_blob()?;
//! store.transaction(|conn| {
//!     conn.execute(
//!         "INSERT INTO embeddings (rowid, vector) VALUES (?, ?)",
//!         rusqlite::params![1, blob],
//!     )
//!     .map_err(vex_sqlite::convert::storage_error)
//! })?;
//!
//! let query = Vector::new(vec![0.15, 0.25, 0.35]);
//! let search = VectorSearch::new(store.clone(), "embeddings", "vector")?;
//! let results = search.knn(&query, 10).await?;
//! # Ok(())
//! # }
//! ```

pub mod extension;
pub mod migration;
pub mod search;
pub mod types;

pub use extension::VectorExtension;
pub use migration::{create_vector_table, drop_vector_table};
pub use search::VectorSearch;
pub use types::{SearchResult, Vector, VectorConfig};

pub use vex_core::{ElementType, Metric, ReadPoolConfig, Result, StoreConfig, VexError};
pub use vex_sqlite::{register, AutoRegistration, SqliteVecStore};

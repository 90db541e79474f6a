//! Vector support on connections and store handles

use crate::migration::{create_vector_table, drop_vector_table};
use crate::types::VectorConfig;
use rusqlite::Connection;
use vex_core::{Result, VexError};
use vex_sqlite::convert::storage_error;
use vex_sqlite::SqliteVecStore;

/// Vector operations on anything that owns a SQLite connection
pub trait VectorExtension {
    /// Register the vec0 module and vector functions
    ///
    /// Stores opened with [`SqliteVecStore::open`] are already registered.
    fn register_vectors(&self) -> Result<()>;

    /// Create a vec0 table with a vector column
    ///
    /// # Example
    ///
    /// ```no_run
    /// use vex::{SqliteVecStore, StoreConfig, VectorConfig, VectorExtension};
    ///
    /// # fn example() -> vex::Result<()> {
    /// let store = SqliteVecStore::open(StoreConfig::new("./data/vectors.db"))?;
    /// store.vector_init("embeddings", "vector", VectorConfig::default())?;
    /// # Ok(())
    /// # }
    /// ```
    fn vector_init(&self, table: &str, column: &str, config: VectorConfig) -> Result<()>;

    /// Drop a vec0 table created by [`VectorExtension::vector_init`]
    fn vector_drop(&self, table: &str) -> Result<()>;

    /// Check whether the vector functions are available
    fn has_vector_support(&self) -> bool;

    /// Version reported by `vec_version()`
    fn vector_version(&self) -> Result<String>;
}

impl VectorExtension for Connection {
    fn register_vectors(&self) -> Result<()> {
        vex_sqlite::register(self)
    }

    fn vector_init(&self, table: &str, column: &str, config: VectorConfig) -> Result<()> {
        create_vector_table(self, table, column, config, &[])
    }

    fn vector_drop(&self, table: &str) -> Result<()> {
        drop_vector_table(self, table)
    }

    fn has_vector_support(&self) -> bool {
        self.prepare("SELECT vec_version()").is_ok()
    }

    fn vector_version(&self) -> Result<String> {
        self.query_row("SELECT vec_version()", [], |row| row.get(0))
            .map_err(storage_error)
    }
}

impl VectorExtension for SqliteVecStore {
    fn register_vectors(&self) -> Result<()> {
        self.execute(|conn| conn.register_vectors())
    }

    fn vector_init(&self, table: &str, column: &str, config: VectorConfig) -> Result<()> {
        self.execute(|conn| conn.vector_init(table, column, config))
    }

    fn vector_drop(&self, table: &str) -> Result<()> {
        self.execute(|conn| conn.vector_drop(table))
    }

    fn has_vector_support(&self) -> bool {
        self.query(|conn| Ok::<_, VexError>(conn.has_vector_support()))
            .unwrap_or(false)
    }

    fn vector_version(&self) -> Result<String> {
        self.query(|conn| conn.vector_version())
    }
}

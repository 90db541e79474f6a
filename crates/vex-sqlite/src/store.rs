use crate::convert::storage_error;
use crate::read_pool::SqliteReadPool;
use crate::register::register;
use crate::txn::WriteTxn;
use rusqlite::{Connection, OpenFlags};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;
use vex_core::{
    error::{Result, VexError},
    StoreConfig,
};

/// SQLite database with the vec0 module and vector functions registered
pub struct SqliteVecStore {
    conn: Arc<Mutex<Connection>>,
    read_pool: Option<Arc<SqliteReadPool>>,
    config: StoreConfig,
}

impl SqliteVecStore {
    /// Open (or create) the database at `cfg.path`
    pub fn open(cfg: StoreConfig) -> Result<Self> {
        // Create parent directory if needed
        if let Some(parent) = cfg.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            &cfg.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(storage_error)?;

        Self::configure_connection(&conn, &cfg)?;

        let read_pool = if cfg.read_pool.enabled {
            Some(Arc::new(SqliteReadPool::new(&cfg.path, cfg.read_pool.clone())?))
        } else {
            None
        };

        info!(path = %cfg.path.display(), pooled = read_pool.is_some(), "Opened vector store");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            read_pool,
            config: cfg,
        })
    }

    /// In-memory store, mostly for tests. The read pool is never enabled.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_error)?;
        let cfg = StoreConfig::new(":memory:").with_wal_mode(false);
        Self::configure_connection(&conn, &cfg)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            read_pool: None,
            config: cfg,
        })
    }

    /// Configure SQLite connection
    fn configure_connection(conn: &Connection, cfg: &StoreConfig) -> Result<()> {
        if cfg.wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| VexError::Config(e.to_string()))?;
        }

        conn.pragma_update(None, "synchronous", cfg.synchronous.as_pragma())
            .map_err(|e| VexError::Config(e.to_string()))?;

        conn.pragma_update(None, "cache_size", cfg.cache_size)
            .map_err(|e| VexError::Config(e.to_string()))?;

        register(conn)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Get the underlying connection
    ///
    /// Returns an Arc to the Mutex-protected SQLite connection.
    pub fn conn(&self) -> &Arc<Mutex<Connection>> {
        &self.conn
    }

    /// Read-only connection pool, when enabled in the configuration
    pub fn read_pool(&self) -> Option<&Arc<SqliteReadPool>> {
        self.read_pool.as_ref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| VexError::Internal(format!("connection mutex poisoned: {}", e)))
    }

    /// Run a read closure against the write connection
    pub fn query<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Execute a statement closure against the write connection
    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Connection) -> Result<()>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run a closure inside an immediate transaction, committing on success
    pub fn transaction<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let txn = self.begin_txn()?;
        let result = f(txn.connection())?;
        txn.commit()?;
        Ok(result)
    }

    /// Begin an immediate write transaction; it rolls back unless committed
    pub fn begin_txn(&self) -> Result<WriteTxn<'_>> {
        WriteTxn::new(self.lock()?)
    }

    /// Run a query closure on a blocking thread
    ///
    /// Uses a pooled read connection when the read pool is enabled, otherwise
    /// the write connection.
    pub async fn query_async<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let handle = match &self.read_pool {
            Some(pool) => {
                let pool = pool.clone();
                tokio::task::spawn_blocking(move || {
                    let conn = pool.acquire_blocking()?;
                    f(conn.connection())
                })
            }
            None => {
                let conn = self.conn.clone();
                tokio::task::spawn_blocking(move || {
                    let conn = conn
                        .lock()
                        .map_err(|e| VexError::Internal(format!("connection mutex poisoned: {}", e)))?;
                    f(&conn)
                })
            }
        };

        handle
            .await
            .map_err(|e| VexError::Internal(format!("query task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vex_core::ReadPoolConfig;

    #[test]
    fn test_open_registers_module() {
        let dir = TempDir::new().unwrap();
        let store = SqliteVecStore::open(StoreConfig::new(dir.path().join("db/vectors.db"))).unwrap();
        store
            .execute(|conn| {
                conn.execute_batch("CREATE VIRTUAL TABLE v USING vec0(embedding float[2])")
                    .map_err(storage_error)
            })
            .unwrap();
        let n: i64 = store
            .query(|conn| {
                conn.query_row("SELECT COUNT(*) FROM v", [], |r| r.get(0))
                    .map_err(storage_error)
            })
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let store = SqliteVecStore::open_in_memory().unwrap();
        store
            .execute(|conn| {
                conn.execute_batch("CREATE VIRTUAL TABLE v USING vec0(embedding float[2])")
                    .map_err(storage_error)
            })
            .unwrap();

        let result: Result<()> = store.transaction(|conn| {
            conn.execute("INSERT INTO v(rowid, embedding) VALUES (1, '[1, 2]')", [])
                .map_err(storage_error)?;
            conn.execute("INSERT INTO v(rowid, embedding) VALUES (2, '[1, 2, 3]')", [])
                .map_err(storage_error)?;
            Ok(())
        });
        assert!(result.is_err());

        let n: i64 = store
            .query(|conn| {
                conn.query_row("SELECT COUNT(*) FROM v", [], |r| r.get(0))
                    .map_err(storage_error)
            })
            .unwrap();
        assert_eq!(n, 0);

        store
            .transaction(|conn| {
                conn.execute("INSERT INTO v(rowid, embedding) VALUES (1, '[1, 2]')", [])
                    .map_err(storage_error)
            })
            .unwrap();
        let n: i64 = store
            .query(|conn| {
                conn.query_row("SELECT COUNT(*) FROM v", [], |r| r.get(0))
                    .map_err(storage_error)
            })
            .unwrap();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn test_query_async_uses_read_pool() {
        let dir = TempDir::new().unwrap();
        let cfg = StoreConfig::new(dir.path().join("vectors.db"))
            .with_read_pool(ReadPoolConfig::enabled(2));
        let store = SqliteVecStore::open(cfg).unwrap();
        assert_eq!(store.read_pool().unwrap().size(), 2);

        store
            .execute(|conn| {
                conn.execute_batch(
                    "CREATE VIRTUAL TABLE v USING vec0(embedding float[2]);
                     INSERT INTO v(rowid, embedding) VALUES (1, '[0, 0]'), (2, '[1, 1]');",
                )
                .map_err(storage_error)
            })
            .unwrap();

        let nearest: i64 = store
            .query_async(|conn| {
                conn.query_row(
                    "SELECT rowid FROM v WHERE embedding MATCH '[0.9, 0.9]' ORDER BY distance LIMIT 1",
                    [],
                    |r| r.get(0),
                )
                .map_err(storage_error)
            })
            .await
            .unwrap();
        assert_eq!(nearest, 2);
    }
}

//! Read-only connections for concurrent KNN queries
//!
//! A [`SqliteReadPool`] opens a fixed set of read-only readers on the store's
//! database file, each with vex registered so `vec0` tables and the `vec_*`
//! functions resolve. A tokio semaphore counts idle readers; holding a
//! [`PooledSqliteConnection`] holds both the permit and the reader's lock.

use crate::convert::storage_error;
use crate::register::register;
use rusqlite::{Connection, OpenFlags};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::debug;
use vex_core::{
    error::{Result, VexError},
    ReadPoolConfig,
};

const BLOCKING_POLL: Duration = Duration::from_millis(1);

/// A reader checked out of the pool; returned when dropped.
pub struct PooledSqliteConnection<'a> {
    conn: MutexGuard<'a, Connection>,
    _permit: SemaphorePermit<'a>,
}

impl PooledSqliteConnection<'_> {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Deref for PooledSqliteConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

/// Fixed-size set of read-only vex connections
///
/// ```ignore
/// let pool = SqliteReadPool::new(&db_path, ReadPoolConfig::enabled(4))?;
/// let reader = pool.acquire().await?;
/// let nearest: i64 = reader.query_row(
///     "SELECT rowid FROM items WHERE embedding MATCH ?1 ORDER BY distance LIMIT 1",
///     [query],
///     |row| row.get(0),
/// )?;
/// ```
pub struct SqliteReadPool {
    readers: Vec<Mutex<Connection>>,
    idle: Semaphore,
    wait: Duration,
    path: PathBuf,
}

fn open_reader(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(storage_error)?;
    register(&conn)?;
    Ok(conn)
}

fn wait_exceeded(wait: Duration) -> VexError {
    VexError::Timeout(format!("no idle reader within {:?}", wait))
}

impl SqliteReadPool {
    /// Open `config.pool_size` readers (at least one) on `path`.
    pub fn new(path: &Path, config: ReadPoolConfig) -> Result<Self> {
        let size = config.pool_size.max(1);
        let readers = (0..size)
            .map(|_| open_reader(path).map(Mutex::new))
            .collect::<Result<Vec<_>>>()?;
        debug!(path = %path.display(), size, "Opened read pool");

        Ok(Self {
            readers,
            idle: Semaphore::new(size),
            wait: Duration::from_millis(config.acquire_timeout_ms),
            path: path.to_path_buf(),
        })
    }

    // A permit guarantees at least one unlocked reader.
    fn claim<'a>(&'a self, permit: SemaphorePermit<'a>) -> Option<PooledSqliteConnection<'a>> {
        self.readers
            .iter()
            .find_map(|reader| reader.try_lock().ok())
            .map(|conn| PooledSqliteConnection {
                conn,
                _permit: permit,
            })
    }

    /// Wait up to the configured timeout for an idle reader.
    pub async fn acquire(&self) -> Result<PooledSqliteConnection<'_>> {
        let permit = tokio::time::timeout(self.wait, self.idle.acquire())
            .await
            .map_err(|_| wait_exceeded(self.wait))?
            .map_err(|e| VexError::Internal(format!("read pool closed: {}", e)))?;
        self.claim(permit)
            .ok_or_else(|| VexError::Internal("permit granted but every reader is busy".into()))
    }

    /// An idle reader, if one is free right now.
    pub fn try_acquire(&self) -> Option<PooledSqliteConnection<'_>> {
        self.idle
            .try_acquire()
            .ok()
            .and_then(|permit| self.claim(permit))
    }

    /// Poll for an idle reader from a blocking thread until the timeout.
    pub fn acquire_blocking(&self) -> Result<PooledSqliteConnection<'_>> {
        let deadline = Instant::now() + self.wait;
        loop {
            if let Some(reader) = self.try_acquire() {
                return Ok(reader);
            }
            if Instant::now() >= deadline {
                return Err(wait_exceeded(self.wait));
            }
            std::thread::sleep(BLOCKING_POLL);
        }
    }

    pub fn idle(&self) -> usize {
        self.idle.available_permits()
    }

    pub fn size(&self) -> usize {
        self.readers.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

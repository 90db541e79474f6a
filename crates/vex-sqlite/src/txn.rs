use crate::convert::storage_error;
use rusqlite::Connection;
use std::sync::MutexGuard;
use tracing::warn;
use vex_core::error::Result;

/// Immediate write transaction on the store's write connection
///
/// Holds the connection lock for its whole lifetime. Rolls back on drop
/// unless [`WriteTxn::commit`] succeeded.
pub struct WriteTxn<'a> {
    conn: MutexGuard<'a, Connection>,
    in_txn: bool,
}

impl<'a> WriteTxn<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Result<Self> {
        conn.execute("BEGIN IMMEDIATE TRANSACTION", [])
            .map_err(storage_error)?;

        Ok(Self { conn, in_txn: true })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn commit(mut self) -> Result<()> {
        if self.in_txn {
            self.conn.execute("COMMIT", []).map_err(storage_error)?;
            self.in_txn = false;
        }
        Ok(())
    }

    pub fn rollback(mut self) {
        self.rollback_in_place();
    }

    fn rollback_in_place(&mut self) {
        if self.in_txn {
            if let Err(e) = self.conn.execute("ROLLBACK", []) {
                warn!("rollback failed: {}", e);
            }
            self.in_txn = false;
        }
    }
}

impl Drop for WriteTxn<'_> {
    fn drop(&mut self) {
        self.rollback_in_place();
    }
}

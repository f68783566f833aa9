#![forbid(unsafe_code)]

mod audit;
mod error;
mod rows;
mod schema;
mod tx;

pub use error::StoreError;
pub use tx::SqliteTx;

use rusqlite::{Connection, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use toc_core::{AuditRecord, BookId, OutlineState, OutlineStore, StorageError, now_ms};

const DB_FILE: &str = "toc_outline.db";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreOptions {
    /// How long a writer waits for another connection's write lock before
    /// the attempt fails as busy.
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Outline store on a single SQLite file. Several stores (or processes) may
/// open the same directory; writers are serialized by SQLite's write lock.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with(storage_dir, StoreOptions::default())
    }

    pub fn open_with(
        storage_dir: impl AsRef<Path>,
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join(DB_FILE);
        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(options.busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        schema::preflight_gate(&conn)?;
        schema::install_schema(&conn, now_ms())?;
        tracing::debug!(path = %db_path.display(), "outline store opened");

        Ok(Self { conn, storage_dir })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }
}

impl OutlineStore for SqliteStore {
    type Tx<'a> = SqliteTx<'a>;

    fn load(&self, book_id: &BookId) -> Result<OutlineState, StorageError> {
        Ok(rows::load_state(&self.conn, book_id)?)
    }

    fn begin(&mut self) -> Result<Self::Tx<'_>, StorageError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        Ok(SqliteTx { tx })
    }

    fn audit_record(
        &self,
        book_id: &BookId,
        new_version: u64,
    ) -> Result<Option<AuditRecord>, StorageError> {
        Ok(audit::select_audit(&self.conn, book_id, new_version)?)
    }

    fn audit_log(
        &self,
        book_id: &BookId,
        since_version: u64,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, StorageError> {
        Ok(audit::list_audit(&self.conn, book_id, since_version, limit)?)
    }

    fn delete_book(&mut self, book_id: &BookId, deleted_at_ms: i64) -> Result<bool, StorageError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let deleted = rows::tombstone(&tx, book_id, deleted_at_ms)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(deleted)
    }
}

#![forbid(unsafe_code)]

use super::{audit, rows};
use rusqlite::Transaction;
use toc_core::{
    AuditDraft, AuditRecord, BookId, ItemId, OutlineHeader, OutlineItem, OutlineState,
    OutlineTx, StorageError,
};

/// One IMMEDIATE SQLite transaction. The write lock is taken at `begin`, so
/// a concurrent writer waits (up to the busy timeout) instead of failing at
/// commit. Dropping it rolls back.
pub struct SqliteTx<'a> {
    pub(super) tx: Transaction<'a>,
}

impl OutlineTx for SqliteTx<'_> {
    fn load(&self, book_id: &BookId) -> Result<OutlineState, StorageError> {
        Ok(rows::load_state(&self.tx, book_id)?)
    }

    fn upsert_item(&mut self, book_id: &BookId, item: &OutlineItem) -> Result<(), StorageError> {
        Ok(rows::upsert_item(&self.tx, book_id, item)?)
    }

    fn delete_item(&mut self, book_id: &BookId, id: &ItemId) -> Result<(), StorageError> {
        Ok(rows::delete_item(&self.tx, book_id, id)?)
    }

    fn write_header(&mut self, header: &OutlineHeader) -> Result<(), StorageError> {
        Ok(rows::write_header(&self.tx, header)?)
    }

    fn append_audit(&mut self, draft: &AuditDraft) -> Result<AuditRecord, StorageError> {
        Ok(audit::insert_audit(&self.tx, draft)?)
    }

    fn commit(self) -> Result<(), StorageError> {
        self.tx
            .commit()
            .map_err(|err| StorageError::from(super::StoreError::from(err)))
    }

    fn abort(self) -> Result<(), StorageError> {
        self.tx
            .rollback()
            .map_err(|err| StorageError::from(super::StoreError::from(err)))
    }
}

#![forbid(unsafe_code)]

//! Storage port. The engine only needs a transactional read-modify-write
//! primitive over three kinds of document: the outline header, its items,
//! and audit records.

use crate::audit::{AuditDraft, AuditRecord};
use crate::ids::{BookId, ItemId};
use crate::model::{OutlineHeader, OutlineItem, OutlineState};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageError {
    /// Busy/locked database, failed commit, dropped connection. Retryable.
    Transient(String),
    Backend(String),
    /// Stored data violates an outline invariant.
    Corrupt(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(message) => write!(f, "transient storage error: {message}"),
            Self::Backend(message) => write!(f, "storage error: {message}"),
            Self::Corrupt(message) => write!(f, "corrupt outline data: {message}"),
        }
    }
}

impl std::error::Error for StorageError {}

pub trait OutlineStore {
    type Tx<'a>: OutlineTx
    where
        Self: 'a;

    /// Single read outside any transaction; holds no lock.
    fn load(&self, book_id: &BookId) -> Result<OutlineState, StorageError>;

    /// Opens a write transaction. Writers on the same store file are
    /// serialized for the lifetime of the transaction.
    fn begin(&mut self) -> Result<Self::Tx<'_>, StorageError>;

    fn audit_record(
        &self,
        book_id: &BookId,
        new_version: u64,
    ) -> Result<Option<AuditRecord>, StorageError>;

    /// Records with `new_version > since_version`, ascending.
    fn audit_log(
        &self,
        book_id: &BookId,
        since_version: u64,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, StorageError>;

    /// Cascade delete: drops items and audit history and leaves a tombstone
    /// so the book can never be written again. Returns false when the book
    /// had no outline.
    fn delete_book(&mut self, book_id: &BookId, deleted_at_ms: i64) -> Result<bool, StorageError>;
}

/// Dropping a transaction without `commit` must discard every staged write.
pub trait OutlineTx {
    fn load(&self, book_id: &BookId) -> Result<OutlineState, StorageError>;

    fn upsert_item(&mut self, book_id: &BookId, item: &OutlineItem) -> Result<(), StorageError>;

    fn delete_item(&mut self, book_id: &BookId, id: &ItemId) -> Result<(), StorageError>;

    /// Creates or advances the header. Must refuse anything but a single
    /// step forward from the stored version.
    fn write_header(&mut self, header: &OutlineHeader) -> Result<(), StorageError>;

    fn append_audit(&mut self, draft: &AuditDraft) -> Result<AuditRecord, StorageError>;

    fn commit(self) -> Result<(), StorageError>;

    fn abort(self) -> Result<(), StorageError>;
}

pub fn now_ms() -> i64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    now.as_millis().min(i64::MAX as u128) as i64
}

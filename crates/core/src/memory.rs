#![forbid(unsafe_code)]

//! In-process [`OutlineStore`] for embedding and tests. Clones share state;
//! a transaction holds the lock until it commits or is dropped, and stages
//! its writes on private copies of the books it touches so an abort leaves
//! nothing behind.

use crate::audit::{AuditDraft, AuditRecord};
use crate::ids::{BookId, ItemId};
use crate::model::{Outline, OutlineHeader, OutlineItem, OutlineState};
use crate::store::{OutlineStore, OutlineTx, StorageError};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Debug, Default)]
struct BookEntry {
    header: Option<OutlineHeader>,
    deleted: bool,
    items: BTreeMap<ItemId, OutlineItem>,
    audit: BTreeMap<u64, AuditRecord>,
}

#[derive(Debug, Default)]
struct MemoryState {
    books: HashMap<BookId, BookEntry>,
    audit_seq: u64,
}

fn load_entry(book_id: &BookId, entry: Option<&BookEntry>) -> Result<OutlineState, StorageError> {
    let Some(entry) = entry else {
        return Ok(OutlineState::Uninitialized);
    };
    let Some(header) = entry.header.clone() else {
        return Ok(OutlineState::Uninitialized);
    };
    if entry.deleted {
        return Ok(OutlineState::Deleted {
            version: header.version,
        });
    }
    let items = entry.items.values().cloned().collect();
    Outline::assemble(header, items)
        .map(OutlineState::Active)
        .map_err(|err| StorageError::Corrupt(format!("outline {book_id}: {err}")))
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    shared: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.shared
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))
    }
}

pub struct MemoryTx<'a> {
    guard: MutexGuard<'a, MemoryState>,
    /// Copy-on-write: a book is cloned out of the shared state on first write.
    staged: HashMap<BookId, BookEntry>,
    audit_seq: u64,
}

impl MemoryTx<'_> {
    fn entry(&mut self, book_id: &BookId) -> &mut BookEntry {
        let committed = &self.guard.books;
        self.staged
            .entry(book_id.clone())
            .or_insert_with(|| committed.get(book_id).cloned().unwrap_or_default())
    }
}

impl OutlineStore for MemoryStore {
    type Tx<'a> = MemoryTx<'a>;

    fn load(&self, book_id: &BookId) -> Result<OutlineState, StorageError> {
        let state = self.lock()?;
        load_entry(book_id, state.books.get(book_id))
    }

    fn begin(&mut self) -> Result<Self::Tx<'_>, StorageError> {
        let guard = self.lock()?;
        let audit_seq = guard.audit_seq;
        Ok(MemoryTx {
            guard,
            staged: HashMap::new(),
            audit_seq,
        })
    }

    fn audit_record(
        &self,
        book_id: &BookId,
        new_version: u64,
    ) -> Result<Option<AuditRecord>, StorageError> {
        Ok(self
            .lock()?
            .books
            .get(book_id)
            .and_then(|entry| entry.audit.get(&new_version).cloned()))
    }

    fn audit_log(
        &self,
        book_id: &BookId,
        since_version: u64,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, StorageError> {
        Ok(self
            .lock()?
            .books
            .get(book_id)
            .map(|entry| {
                entry
                    .audit
                    .range(since_version.saturating_add(1)..)
                    .take(limit)
                    .map(|(_, record)| record.clone())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default())
    }

    fn delete_book(&mut self, book_id: &BookId, _deleted_at_ms: i64) -> Result<bool, StorageError> {
        let mut state = self.lock()?;
        let Some(entry) = state.books.get_mut(book_id) else {
            return Ok(false);
        };
        if entry.header.is_none() || entry.deleted {
            return Ok(false);
        }
        entry.deleted = true;
        entry.items.clear();
        entry.audit.clear();
        Ok(true)
    }
}

impl OutlineTx for MemoryTx<'_> {
    fn load(&self, book_id: &BookId) -> Result<OutlineState, StorageError> {
        let entry = self
            .staged
            .get(book_id)
            .or_else(|| self.guard.books.get(book_id));
        load_entry(book_id, entry)
    }

    fn upsert_item(&mut self, book_id: &BookId, item: &OutlineItem) -> Result<(), StorageError> {
        self.entry(book_id).items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    fn delete_item(&mut self, book_id: &BookId, id: &ItemId) -> Result<(), StorageError> {
        self.entry(book_id).items.remove(id);
        Ok(())
    }

    fn write_header(&mut self, header: &OutlineHeader) -> Result<(), StorageError> {
        let entry = self.entry(&header.book_id);
        if entry.deleted {
            return Err(StorageError::Corrupt(format!(
                "outline {} is deleted",
                header.book_id
            )));
        }
        let stored = entry.header.as_ref().map(|h| h.version).unwrap_or(0);
        if header.version != stored + 1 {
            return Err(StorageError::Corrupt(format!(
                "outline {} cannot move from v{stored} to v{}",
                header.book_id, header.version
            )));
        }
        entry.header = Some(header.clone());
        Ok(())
    }

    fn append_audit(&mut self, draft: &AuditDraft) -> Result<AuditRecord, StorageError> {
        self.audit_seq += 1;
        let id = format!("aud_{:016}", self.audit_seq);
        let record = AuditRecord::from_draft(id, draft.clone());
        let entry = self.entry(&draft.book_id);
        if entry.audit.contains_key(&record.new_version) {
            return Err(StorageError::Corrupt(format!(
                "audit record for {} v{} already exists",
                record.book_id, record.new_version
            )));
        }
        entry.audit.insert(record.new_version, record.clone());
        Ok(record)
    }

    fn commit(mut self) -> Result<(), StorageError> {
        let staged = std::mem::take(&mut self.staged);
        self.guard.books.extend(staged);
        self.guard.audit_seq = self.audit_seq;
        Ok(())
    }

    fn abort(self) -> Result<(), StorageError> {
        Ok(())
    }
}

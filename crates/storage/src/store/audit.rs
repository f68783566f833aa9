#![forbid(unsafe_code)]

use super::StoreError;
use super::rows::{from_sqlite_u64, parse_id, to_sqlite_i64};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use toc_core::{AuditDraft, AuditRecord, BookId};

const AUDIT_COLUMNS: &str =
    "seq, book_id, actor_id, base_version, new_version, operations_json, inverse_json, ts_ms";

struct AuditRow {
    seq: i64,
    book_id: String,
    actor_id: String,
    base_version: i64,
    new_version: i64,
    operations_json: String,
    inverse_json: String,
    ts_ms: i64,
}

fn audit_id(seq: i64) -> String {
    format!("aud_{seq:016}")
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRow> {
    Ok(AuditRow {
        seq: row.get(0)?,
        book_id: row.get(1)?,
        actor_id: row.get(2)?,
        base_version: row.get(3)?,
        new_version: row.get(4)?,
        operations_json: row.get(5)?,
        inverse_json: row.get(6)?,
        ts_ms: row.get(7)?,
    })
}

fn decode(row: AuditRow) -> Result<AuditRecord, StoreError> {
    Ok(AuditRecord {
        id: audit_id(row.seq),
        book_id: parse_id("book_id", row.book_id)?,
        actor_id: parse_id("actor_id", row.actor_id)?,
        base_version: from_sqlite_u64("base_version", row.base_version)?,
        new_version: from_sqlite_u64("new_version", row.new_version)?,
        operations_applied: serde_json::from_str(&row.operations_json)?,
        inverse_operations: serde_json::from_str(&row.inverse_json)?,
        timestamp_ms: row.ts_ms,
    })
}

pub(super) fn insert_audit(conn: &Connection, draft: &AuditDraft) -> Result<AuditRecord, StoreError> {
    let operations_json = serde_json::to_string(&draft.operations_applied)
        .map_err(|_| StoreError::InvalidInput("operations are not serializable"))?;
    let inverse_json = serde_json::to_string(&draft.inverse_operations)
        .map_err(|_| StoreError::InvalidInput("inverse operations are not serializable"))?;

    let inserted = conn.execute(
        "INSERT INTO audit_records(book_id, actor_id, base_version, new_version, \
                                   operations_json, inverse_json, ts_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            draft.book_id.as_str(),
            draft.actor_id.as_str(),
            to_sqlite_i64(draft.base_version)?,
            to_sqlite_i64(draft.new_version)?,
            operations_json,
            inverse_json,
            draft.timestamp_ms,
        ],
    );
    match inserted {
        Ok(_) => {}
        Err(err) if is_constraint_violation(&err) => {
            return Err(StoreError::Corrupt(format!(
                "audit record for {} v{} rejected: {err}",
                draft.book_id, draft.new_version
            )));
        }
        Err(err) => return Err(err.into()),
    }

    Ok(AuditRecord::from_draft(
        audit_id(conn.last_insert_rowid()),
        draft.clone(),
    ))
}

pub(super) fn select_audit(
    conn: &Connection,
    book_id: &BookId,
    new_version: u64,
) -> Result<Option<AuditRecord>, StoreError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {AUDIT_COLUMNS} FROM audit_records WHERE book_id=?1 AND new_version=?2"
            ),
            params![book_id.as_str(), to_sqlite_i64(new_version)?],
            read_row,
        )
        .optional()?;
    row.map(decode).transpose()
}

pub(super) fn list_audit(
    conn: &Connection,
    book_id: &BookId,
    since_version: u64,
    limit: usize,
) -> Result<Vec<AuditRecord>, StoreError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare(&format!(
        "SELECT {AUDIT_COLUMNS} FROM audit_records \
         WHERE book_id=?1 AND new_version>?2 ORDER BY new_version ASC LIMIT ?3"
    ))?;
    let rows = stmt.query_map(
        params![book_id.as_str(), to_sqlite_i64(since_version)?, limit],
        read_row,
    )?;

    let mut out = Vec::new();
    for row in rows {
        out.push(decode(row?)?);
    }
    Ok(out)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                || message
                    .as_deref()
                    .is_some_and(|value| value.contains("UNIQUE constraint failed"))
        }
        _ => false,
    }
}

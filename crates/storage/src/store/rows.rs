#![forbid(unsafe_code)]

use super::StoreError;
use rusqlite::{Connection, OptionalExtension, params};
use toc_core::{
    ActorId, BookId, ItemId, ItemStatus, Outline, OutlineHeader, OutlineItem, OutlineState,
};

#[derive(Debug)]
pub(super) struct HeaderRow {
    pub version: i64,
    pub updated_at_ms: i64,
    pub updated_by: String,
    pub deleted_at_ms: Option<i64>,
}

struct ItemRow {
    item_id: String,
    parent_id: Option<String>,
    title: String,
    description: Option<String>,
    level: i64,
    ord: i64,
    status: String,
    word_count: i64,
    estimated_reading_time: i64,
    content_ref: Option<String>,
}

pub(super) fn to_sqlite_i64(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("numeric overflow"))
}

pub(super) fn from_sqlite_u64(field: &str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field} is negative: {value}")))
}

fn from_sqlite_u32(field: &str, value: i64) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::Corrupt(format!("{field} out of range: {value}")))
}

pub(super) fn parse_id<T>(field: &str, raw: String) -> Result<T, StoreError>
where
    T: TryFrom<String>,
    T::Error: std::fmt::Display,
{
    T::try_from(raw).map_err(|err| StoreError::Corrupt(format!("{field}: {err}")))
}

pub(super) fn header_row(
    conn: &Connection,
    book_id: &BookId,
) -> Result<Option<HeaderRow>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT version, updated_at_ms, updated_by, deleted_at_ms \
             FROM outlines WHERE book_id=?1",
            params![book_id.as_str()],
            |row| {
                Ok(HeaderRow {
                    version: row.get(0)?,
                    updated_at_ms: row.get(1)?,
                    updated_by: row.get(2)?,
                    deleted_at_ms: row.get(3)?,
                })
            },
        )
        .optional()?)
}

fn item_rows(conn: &Connection, book_id: &BookId) -> Result<Vec<OutlineItem>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT item_id, parent_id, title, description, level, ord, status, \
                word_count, estimated_reading_time, content_ref \
         FROM outline_items WHERE book_id=?1 ORDER BY item_id",
    )?;
    let rows = stmt.query_map(params![book_id.as_str()], |row| {
        Ok(ItemRow {
            item_id: row.get(0)?,
            parent_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            level: row.get(4)?,
            ord: row.get(5)?,
            status: row.get(6)?,
            word_count: row.get(7)?,
            estimated_reading_time: row.get(8)?,
            content_ref: row.get(9)?,
        })
    })?;

    let mut items = Vec::new();
    for row in rows {
        items.push(decode_item(row?)?);
    }
    Ok(items)
}

fn decode_item(row: ItemRow) -> Result<OutlineItem, StoreError> {
    let status = ItemStatus::parse(&row.status)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown item status {:?}", row.status)))?;
    Ok(OutlineItem {
        id: parse_id("item_id", row.item_id)?,
        parent_id: row
            .parent_id
            .map(|raw| parse_id("parent_id", raw))
            .transpose()?,
        title: row.title,
        description: row.description,
        level: from_sqlite_u32("level", row.level)?,
        order: from_sqlite_u32("ord", row.ord)?,
        status,
        word_count: from_sqlite_u32("word_count", row.word_count)?,
        estimated_reading_time: from_sqlite_u32(
            "estimated_reading_time",
            row.estimated_reading_time,
        )?,
        content_ref: row.content_ref,
    })
}

/// Header plus items, validated as a forest. Works on a plain connection and
/// inside a transaction alike.
pub(super) fn load_state(conn: &Connection, book_id: &BookId) -> Result<OutlineState, StoreError> {
    let Some(header) = header_row(conn, book_id)? else {
        return Ok(OutlineState::Uninitialized);
    };
    let version = from_sqlite_u64("version", header.version)?;
    if header.deleted_at_ms.is_some() {
        return Ok(OutlineState::Deleted { version });
    }

    let header = OutlineHeader {
        book_id: book_id.clone(),
        version,
        updated_at_ms: header.updated_at_ms,
        updated_by: parse_id::<ActorId>("updated_by", header.updated_by)?,
    };
    let items = item_rows(conn, book_id)?;
    Outline::assemble(header, items)
        .map(OutlineState::Active)
        .map_err(|err| StoreError::Corrupt(format!("outline {book_id}: {err}")))
}

pub(super) fn upsert_item(
    conn: &Connection,
    book_id: &BookId,
    item: &OutlineItem,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO outline_items(book_id, item_id, parent_id, title, description, level, ord, \
                                   status, word_count, estimated_reading_time, content_ref) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
         ON CONFLICT(book_id, item_id) DO UPDATE SET \
           parent_id=excluded.parent_id, title=excluded.title, \
           description=excluded.description, level=excluded.level, ord=excluded.ord, \
           status=excluded.status, word_count=excluded.word_count, \
           estimated_reading_time=excluded.estimated_reading_time, \
           content_ref=excluded.content_ref",
        params![
            book_id.as_str(),
            item.id.as_str(),
            item.parent_id.as_ref().map(ItemId::as_str),
            item.title,
            item.description,
            i64::from(item.level),
            i64::from(item.order),
            item.status.as_str(),
            i64::from(item.word_count),
            i64::from(item.estimated_reading_time),
            item.content_ref,
        ],
    )?;
    Ok(())
}

pub(super) fn delete_item(
    conn: &Connection,
    book_id: &BookId,
    id: &ItemId,
) -> Result<(), StoreError> {
    conn.execute(
        "DELETE FROM outline_items WHERE book_id=?1 AND item_id=?2",
        params![book_id.as_str(), id.as_str()],
    )?;
    Ok(())
}

/// Creates the header at version 1 or advances it by exactly one. Anything
/// else means the caller's view of the outline is stale or the row is a
/// tombstone.
pub(super) fn write_header(conn: &Connection, header: &OutlineHeader) -> Result<(), StoreError> {
    let version = to_sqlite_i64(header.version)?;
    let changed = match header_row(conn, &header.book_id)? {
        None if header.version == 1 => conn.execute(
            "INSERT INTO outlines(book_id, version, updated_at_ms, updated_by, deleted_at_ms) \
             VALUES (?1, ?2, ?3, ?4, NULL)",
            params![
                header.book_id.as_str(),
                version,
                header.updated_at_ms,
                header.updated_by.as_str()
            ],
        )?,
        Some(row) if row.deleted_at_ms.is_none() && row.version + 1 == version => conn.execute(
            "UPDATE outlines SET version=?2, updated_at_ms=?3, updated_by=?4 \
             WHERE book_id=?1 AND version=?5 AND deleted_at_ms IS NULL",
            params![
                header.book_id.as_str(),
                version,
                header.updated_at_ms,
                header.updated_by.as_str(),
                row.version
            ],
        )?,
        Some(row) if row.deleted_at_ms.is_some() => {
            return Err(StoreError::Corrupt(format!(
                "outline {} is deleted",
                header.book_id
            )));
        }
        row => {
            let stored = row.map(|row| row.version).unwrap_or(0);
            return Err(StoreError::Corrupt(format!(
                "outline {} cannot move from v{stored} to v{}",
                header.book_id, header.version
            )));
        }
    };
    if changed != 1 {
        return Err(StoreError::Corrupt(format!(
            "outline {} header write touched {changed} rows",
            header.book_id
        )));
    }
    Ok(())
}

/// Tombstones the header and drops items and history. Returns false when
/// there was nothing live to delete.
pub(super) fn tombstone(
    conn: &Connection,
    book_id: &BookId,
    deleted_at_ms: i64,
) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE outlines SET deleted_at_ms=?2 WHERE book_id=?1 AND deleted_at_ms IS NULL",
        params![book_id.as_str(), deleted_at_ms],
    )?;
    if changed == 0 {
        return Ok(false);
    }
    conn.execute(
        "DELETE FROM outline_items WHERE book_id=?1",
        params![book_id.as_str()],
    )?;
    conn.execute(
        "DELETE FROM audit_records WHERE book_id=?1",
        params![book_id.as_str()],
    )?;
    Ok(true)
}

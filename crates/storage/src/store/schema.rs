#![forbid(unsafe_code)]

use super::StoreError;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeSet;

pub(super) const SCHEMA_VERSION: i64 = 1;

const REQUIRED_TABLES: [&str; 4] = ["store_state", "outlines", "outline_items", "audit_records"];

/// Refuses to touch a database file written by something else, or by an
/// incompatible schema revision. An empty file is fine.
pub(super) fn preflight_gate(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let mut rows = stmt.query([])?;
    let mut tables = BTreeSet::new();
    while let Some(row) = rows.next()? {
        tables.insert(row.get::<_, String>(0)?);
    }

    if tables.is_empty() {
        return Ok(());
    }
    if REQUIRED_TABLES
        .iter()
        .any(|table| !tables.contains(*table))
    {
        return Err(StoreError::InvalidInput(
            "RESET_REQUIRED: required table is missing",
        ));
    }

    let version = conn
        .query_row(
            "SELECT schema_version FROM store_state WHERE singleton=1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    match version {
        Some(SCHEMA_VERSION) => Ok(()),
        Some(_) => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema version mismatch",
        )),
        None => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema state row is missing",
        )),
    }
}

pub(super) fn install_schema(conn: &Connection, now_ms: i64) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;

        CREATE TABLE IF NOT EXISTS store_state (
          singleton INTEGER PRIMARY KEY CHECK(singleton = 1),
          schema_version INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS outlines (
          book_id TEXT PRIMARY KEY,
          version INTEGER NOT NULL CHECK(version >= 1),
          updated_at_ms INTEGER NOT NULL,
          updated_by TEXT NOT NULL,
          deleted_at_ms INTEGER
        );

        CREATE TABLE IF NOT EXISTS outline_items (
          book_id TEXT NOT NULL,
          item_id TEXT NOT NULL,
          parent_id TEXT,
          title TEXT NOT NULL,
          description TEXT,
          level INTEGER NOT NULL CHECK(level >= 1),
          ord INTEGER NOT NULL CHECK(ord >= 1),
          status TEXT NOT NULL,
          word_count INTEGER NOT NULL,
          estimated_reading_time INTEGER NOT NULL,
          content_ref TEXT,
          PRIMARY KEY(book_id, item_id),
          FOREIGN KEY(book_id) REFERENCES outlines(book_id)
            DEFERRABLE INITIALLY DEFERRED,
          CHECK(parent_id IS NULL OR parent_id <> item_id)
        );

        CREATE INDEX IF NOT EXISTS outline_items_by_parent
          ON outline_items(book_id, parent_id, ord);

        CREATE TABLE IF NOT EXISTS audit_records (
          seq INTEGER PRIMARY KEY AUTOINCREMENT,
          book_id TEXT NOT NULL,
          actor_id TEXT NOT NULL,
          base_version INTEGER NOT NULL,
          new_version INTEGER NOT NULL,
          operations_json TEXT NOT NULL,
          inverse_json TEXT NOT NULL,
          ts_ms INTEGER NOT NULL,
          UNIQUE(book_id, new_version),
          CHECK(new_version = base_version + 1)
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO store_state(singleton, schema_version, created_at_ms) \
         VALUES (1, ?1, ?2)",
        params![SCHEMA_VERSION, now_ms],
    )?;
    Ok(())
}

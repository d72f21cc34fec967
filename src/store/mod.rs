//! Relational store (§6) — rusqlite over a single file, WAL + busy-timeout,
//! `PRAGMA user_version` schema versioning, grounded on
//! `examples/xcorat-araliya-bot/crates/araliya-bot/src/subsystems/memory/stores/docstore_core.rs`.
//!
//! Every public method opens its own short-lived [`rusqlite::Connection`]
//! rather than caching one behind a lock, matching the teacher's
//! `IDocStore`/`IKGDocStore` pattern; WAL mode lets concurrent readers
//! proceed while a writer holds the file lock, and `busy_timeout` absorbs
//! the rest.

pub mod admin;
pub mod dedup;
pub mod maintenance;
pub mod messages;
pub mod stats;
pub mod validation;

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::error::AppError;

const SCHEMA_VERSION: i64 = 1;

/// Handle to the relational store (§6 relational schema).
#[derive(Debug, Clone)]
pub struct Store {
    db_path: PathBuf,
}

impl Store {
    /// Open (creating if absent) the database at `db_path` and apply the
    /// schema if this is a fresh file or an older `user_version`.
    pub fn open(db_path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AppError::Store(format!("create {}: {e}", parent.display())))?;
            }
        }
        let store = Self { db_path: db_path.to_path_buf() };
        let conn = store.conn()?;
        init_schema(&conn)?;
        Ok(store)
    }

    pub(crate) fn conn(&self) -> Result<Connection, AppError> {
        open_conn(&self.db_path)
    }
}

/// Open a connection and apply the pragmas every store operation depends on.
pub(crate) fn open_conn(db_path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open(db_path)
        .map_err(|e| AppError::Store(format!("open {}: {e}", db_path.display())))?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| AppError::Store(format!("set journal_mode WAL: {e}")))?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| AppError::Store(format!("set foreign_keys ON: {e}")))?;
    conn.pragma_update(None, "busy_timeout", 5000)
        .map_err(|e| AppError::Store(format!("set busy_timeout: {e}")))?;

    Ok(conn)
}

pub(crate) fn init_schema(conn: &Connection) -> Result<(), AppError> {
    let user_version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| AppError::Store(format!("read user_version: {e}")))?;
    if user_version >= SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp       TEXT NOT NULL,
            title           TEXT NOT NULL,
            description     TEXT NOT NULL,
            links           TEXT NOT NULL,
            tags            TEXT NOT NULL,
            source          TEXT,
            channel         TEXT,
            group_name      TEXT,
            bot             TEXT,
            created_at      TEXT NOT NULL,
            netdisk_types   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages (timestamp DESC);

        CREATE TABLE IF NOT EXISTS channels (
            id       INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS credentials (
            id       INTEGER PRIMARY KEY AUTOINCREMENT,
            api_id   TEXT NOT NULL,
            api_hash TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS dedup_stats (
            id       INTEGER PRIMARY KEY AUTOINCREMENT,
            run_time TEXT NOT NULL,
            inserted INTEGER NOT NULL,
            deleted  INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_dedup_stats_run_time ON dedup_stats (run_time DESC);

        CREATE TABLE IF NOT EXISTS link_check_stats (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            check_time        TEXT NOT NULL,
            total_messages    INTEGER NOT NULL,
            total_links       INTEGER NOT NULL,
            valid_links       INTEGER NOT NULL,
            invalid_links     INTEGER NOT NULL,
            deleted_messages  INTEGER NOT NULL DEFAULT 0,
            updated_messages  INTEGER NOT NULL DEFAULT 0,
            netdisk_stats     TEXT NOT NULL,
            check_duration    REAL NOT NULL,
            status            TEXT NOT NULL,
            created_at        TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_link_check_stats_check_time ON link_check_stats (check_time DESC);

        CREATE TABLE IF NOT EXISTS link_check_details (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            check_time    TEXT NOT NULL,
            message_id    INTEGER NOT NULL DEFAULT 0,
            netdisk_type  TEXT NOT NULL,
            url           TEXT NOT NULL,
            is_valid      INTEGER NOT NULL,
            response_time REAL,
            error_reason  TEXT,
            action_taken  TEXT NOT NULL DEFAULT 'none',
            created_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_link_check_details_check_time ON link_check_details (check_time);
        ",
    )
    .map_err(|e| AppError::Store(format!("initialize schema: {e}")))?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(|e| AppError::Store(format!("set user_version: {e}")))?;
    Ok(())
}

/// `NaiveDateTime` <-> the `TEXT` storage format used by every timestamp
/// column (`"%Y-%m-%d %H:%M:%S"`, sortable lexicographically like the
/// timestamp it represents).
pub(crate) fn dt_to_text(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub(crate) fn dt_from_text(s: &str) -> Result<NaiveDateTime, AppError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| AppError::Store(format!("parse timestamp {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn open_creates_parent_dir_and_applies_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("tg.db");
        let store = Store::open(&db_path).unwrap();
        let conn = store.conn().unwrap();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn dt_roundtrips_through_text() {
        let dt = NaiveDateTime::parse_from_str("2026-03-01 08:15:30", "%Y-%m-%d %H:%M:%S").unwrap();
        let text = dt_to_text(&dt);
        assert_eq!(dt_from_text(&text).unwrap(), dt);
    }
}

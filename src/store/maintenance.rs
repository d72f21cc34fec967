//! Maintenance operations (§4.5 supplement), grounded on
//! `examples/original_source/app/services/maintenance_service.py`'s
//! `fix_tags`, `clear_link_check_data`, and `clear_old_link_check_data`.

use rusqlite::{params, Connection};

use crate::error::AppError;

use super::{dt_to_text, Store};

impl Store {
    /// Rewrite any `Message.tags` that is not already a clean, deduplicated,
    /// order-preserving sequence. Idempotent: a Message whose tags are
    /// already clean is left untouched (§8).
    pub fn fix_tags(&self) -> Result<i64, AppError> {
        let conn = self.conn()?;
        fix_tags(&conn)
    }

    pub fn clear_link_check_data(&self) -> Result<(), AppError> {
        let conn = self.conn()?;
        clear_link_check_data(&conn)
    }

    pub fn clear_old_link_check_data(&self, days: i64, now: chrono::NaiveDateTime) -> Result<i64, AppError> {
        let conn = self.conn()?;
        clear_old_link_check_data(&conn, days, now)
    }
}

fn fix_tags(conn: &Connection) -> Result<i64, AppError> {
    let mut stmt = conn
        .prepare("SELECT id, tags FROM messages")
        .map_err(|e| AppError::Store(format!("prepare fix_tags scan: {e}")))?;
    let mut rows = stmt.query([]).map_err(|e| AppError::Store(format!("run fix_tags scan: {e}")))?;

    let mut updates: Vec<(i64, String)> = Vec::new();
    while let Some(row) = rows.next().map_err(|e| AppError::Store(e.to_string()))? {
        let id: i64 = row.get(0).map_err(|e| AppError::Store(e.to_string()))?;
        let tags_json: String = row.get(1).map_err(|e| AppError::Store(e.to_string()))?;
        let tags: Vec<String> = serde_json::from_str(&tags_json)
            .map_err(|e| AppError::Store(format!("decode tags for message {id}: {e}")))?;

        let mut seen = std::collections::HashSet::new();
        let cleaned: Vec<String> = tags.into_iter().filter(|t| !t.trim().is_empty()).filter(|t| seen.insert(t.clone())).collect();
        let cleaned_json = serde_json::to_string(&cleaned).map_err(|e| AppError::Store(e.to_string()))?;
        if cleaned_json != tags_json {
            updates.push((id, cleaned_json));
        }
    }
    drop(rows);
    drop(stmt);

    let updated = updates.len() as i64;
    for (id, cleaned_json) in updates {
        conn.execute("UPDATE messages SET tags = ?1 WHERE id = ?2", params![cleaned_json, id])
            .map_err(|e| AppError::Store(format!("update tags for message {id}: {e}")))?;
    }
    Ok(updated)
}

fn clear_link_check_data(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch("DELETE FROM link_check_details; DELETE FROM link_check_stats;")
        .map_err(|e| AppError::Store(format!("clear link check data: {e}")))
}

fn clear_old_link_check_data(conn: &Connection, days: i64, now: chrono::NaiveDateTime) -> Result<i64, AppError> {
    let cutoff = now - chrono::Duration::days(days);
    let cutoff_text = dt_to_text(&cutoff);
    conn.execute("DELETE FROM link_check_details WHERE check_time < ?1", params![cutoff_text])
        .map_err(|e| AppError::Store(format!("clear old link_check_details: {e}")))?;
    let deleted = conn
        .execute("DELETE FROM link_check_stats WHERE check_time < ?1", params![cutoff_text])
        .map_err(|e| AppError::Store(format!("clear old link_check_stats: {e}")))?;
    Ok(deleted as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn_with_schema() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        super::super::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn fix_tags_dedupes_and_drops_blanks() {
        let conn = conn_with_schema();
        conn.execute(
            "INSERT INTO messages (timestamp, title, description, links, tags, created_at, netdisk_types)
             VALUES ('2026-01-01 00:00:00', 't', 'd', '{}', '[\"a\",\"\",\"a\",\"b\"]', '2026-01-01 00:00:00', '[]')",
            [],
        )
        .unwrap();
        let updated = fix_tags(&conn).unwrap();
        assert_eq!(updated, 1);
        let tags_json: String = conn.query_row("SELECT tags FROM messages", [], |r| r.get(0)).unwrap();
        assert_eq!(tags_json, "[\"a\",\"b\"]");
    }

    #[test]
    fn fix_tags_is_idempotent_on_clean_rows() {
        let conn = conn_with_schema();
        conn.execute(
            "INSERT INTO messages (timestamp, title, description, links, tags, created_at, netdisk_types)
             VALUES ('2026-01-01 00:00:00', 't', 'd', '{}', '[\"a\",\"b\"]', '2026-01-01 00:00:00', '[]')",
            [],
        )
        .unwrap();
        let updated = fix_tags(&conn).unwrap();
        assert_eq!(updated, 0);
    }

    #[test]
    fn clear_link_check_data_truncates_both_tables() {
        let conn = conn_with_schema();
        conn.execute(
            "INSERT INTO link_check_stats (check_time, total_messages, total_links, valid_links, invalid_links, netdisk_stats, check_duration, status, created_at)
             VALUES ('2026-01-01 00:00:00', 1, 1, 1, 0, '{}', 1.0, 'completed', '2026-01-01 00:00:00')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO link_check_details (check_time, netdisk_type, url, is_valid, created_at)
             VALUES ('2026-01-01 00:00:00', '夸克网盘', 'https://x', 1, '2026-01-01 00:00:00')",
            [],
        )
        .unwrap();
        clear_link_check_data(&conn).unwrap();
        let stats: i64 = conn.query_row("SELECT COUNT(*) FROM link_check_stats", [], |r| r.get(0)).unwrap();
        let details: i64 = conn.query_row("SELECT COUNT(*) FROM link_check_details", [], |r| r.get(0)).unwrap();
        assert_eq!((stats, details), (0, 0));
    }

    #[test]
    fn clear_old_link_check_data_respects_cutoff() {
        let conn = conn_with_schema();
        conn.execute(
            "INSERT INTO link_check_stats (check_time, total_messages, total_links, valid_links, invalid_links, netdisk_stats, check_duration, status, created_at)
             VALUES ('2025-01-01 00:00:00', 1, 1, 1, 0, '{}', 1.0, 'completed', '2025-01-01 00:00:00')",
            [],
        )
        .unwrap();
        let now = chrono::NaiveDateTime::parse_from_str("2026-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let deleted = clear_old_link_check_data(&conn, 30, now).unwrap();
        assert_eq!(deleted, 1);
    }
}

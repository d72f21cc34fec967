//! Deduplication Engine (§4.5), grounded on
//! `examples/original_source/app/services/maintenance_service.py::dedup_links`.
//!
//! Both modes append a `DedupStats` row after the delete step even though
//! the Python original's `dedup_links` does not — spec.md §4.5 requires one
//! unconditionally, so this is built to the specified contract rather than
//! copied verbatim from the gap in the source.

use std::collections::HashMap;

use chrono::Duration;
use rusqlite::{params, Connection};

use crate::domain::DedupStats;
use crate::error::AppError;

use super::{dt_from_text, dt_to_text, Store};

const STRICT_WINDOW_SECONDS: i64 = 300;
const DEDUP_STATS_RETENTION_HOURS: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupMode {
    /// "dedup-links": richer-wins inside the 300s window, else keep-newer.
    Strict,
    /// "dedup-links-fast": always keep the newer message, no time window.
    Streaming,
}

#[derive(Debug, Clone, Default)]
pub struct DedupRunOutcome {
    pub inserted: i64,
    pub deleted: i64,
}

impl Store {
    pub fn dedup(&self, mode: DedupMode, now: chrono::NaiveDateTime) -> Result<DedupRunOutcome, AppError> {
        let mut conn = self.conn()?;
        dedup(&mut conn, mode, now)
    }
}

struct Candidate {
    id: i64,
    timestamp: chrono::NaiveDateTime,
    total_urls: usize,
}

pub(crate) fn dedup(conn: &mut Connection, mode: DedupMode, now: chrono::NaiveDateTime) -> Result<DedupRunOutcome, AppError> {
    let mut url_map: HashMap<String, Candidate> = HashMap::new();
    let mut to_delete: Vec<i64> = Vec::new();

    {
        let mut stmt = conn
            .prepare("SELECT id, timestamp, links FROM messages ORDER BY timestamp DESC, id DESC")
            .map_err(|e| AppError::Store(format!("prepare dedup scan: {e}")))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| AppError::Store(format!("run dedup scan: {e}")))?;

        while let Some(row) = rows.next().map_err(|e| AppError::Store(format!("fetch dedup row: {e}")))? {
            let id: i64 = row.get(0).map_err(|e| AppError::Store(e.to_string()))?;
            let ts_text: String = row.get(1).map_err(|e| AppError::Store(e.to_string()))?;
            let links_json: String = row.get(2).map_err(|e| AppError::Store(e.to_string()))?;
            let timestamp = dt_from_text(&ts_text)?;
            let links: std::collections::BTreeMap<String, Vec<crate::domain::LinkEntry>> =
                serde_json::from_str(&links_json).map_err(|e| AppError::Store(format!("decode links for {id}: {e}")))?;
            let total_urls: usize = links.values().map(Vec::len).sum();
            let urls: Vec<String> = links.values().flatten().map(|e| e.url.trim().to_ascii_lowercase()).collect();

            let mut delete_current = false;
            for url in &urls {
                match url_map.get(url) {
                    None => {}
                    Some(existing) => {
                        let keep_current = match mode {
                            DedupMode::Streaming => false,
                            DedupMode::Strict => {
                                let diff = (existing.timestamp - timestamp).num_seconds().abs();
                                if diff < STRICT_WINDOW_SECONDS {
                                    total_urls > existing.total_urls
                                } else {
                                    false
                                }
                            }
                        };
                        if keep_current {
                            to_delete.push(existing.id);
                        } else {
                            delete_current = true;
                        }
                    }
                }
            }

            if delete_current {
                to_delete.push(id);
                continue;
            }
            for url in urls {
                url_map.insert(url, Candidate { id, timestamp, total_urls });
            }
        }
    }

    to_delete.sort_unstable();
    to_delete.dedup();
    // spec.md §9 Open Question (c): `inserted` is the size of the surviving
    // URL map, not a count of newly-inserted rows — matches the source.
    let inserted = url_map.len() as i64;

    let tx = conn.transaction().map_err(|e| AppError::Store(format!("begin dedup tx: {e}")))?;
    for id in &to_delete {
        tx.execute("DELETE FROM messages WHERE id = ?1", params![id])
            .map_err(|e| AppError::Store(format!("delete message {id}: {e}")))?;
    }
    tx.execute(
        "INSERT INTO dedup_stats (run_time, inserted, deleted) VALUES (?1, ?2, ?3)",
        params![dt_to_text(&now), inserted, to_delete.len() as i64],
    )
    .map_err(|e| AppError::Store(format!("insert dedup_stats: {e}")))?;

    let cutoff = now - Duration::hours(DEDUP_STATS_RETENTION_HOURS);
    tx.execute("DELETE FROM dedup_stats WHERE run_time < ?1", params![dt_to_text(&cutoff)])
        .map_err(|e| AppError::Store(format!("purge old dedup_stats: {e}")))?;
    tx.commit().map_err(|e| AppError::Store(format!("commit dedup tx: {e}")))?;

    Ok(DedupRunOutcome { inserted, deleted: to_delete.len() as i64 })
}

/// Fetch recent `DedupStats` rows, newest first — used by the maintenance
/// admin surface and by `stats::dedup_stats` (§4.7).
pub(crate) fn recent_dedup_stats(conn: &Connection, since: chrono::NaiveDateTime) -> Result<Vec<DedupStats>, AppError> {
    let mut stmt = conn
        .prepare("SELECT id, run_time, inserted, deleted FROM dedup_stats WHERE run_time >= ?1 ORDER BY run_time ASC")
        .map_err(|e| AppError::Store(format!("prepare dedup_stats query: {e}")))?;
    let rows = stmt
        .query_map(params![dt_to_text(&since)], |row| {
            Ok(DedupStats {
                id: row.get(0)?,
                run_time: dt_from_text(&row.get::<_, String>(1)?).unwrap_or(since),
                inserted: row.get(2)?,
                deleted: row.get(3)?,
            })
        })
        .map_err(|e| AppError::Store(format!("run dedup_stats query: {e}")))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|e| AppError::Store(format!("decode dedup_stats row: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LinkEntry;
    use crate::store::messages::insert_message;
    use std::collections::BTreeMap;

    fn conn_with_schema() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        super::super::init_schema(&conn).unwrap();
        conn
    }

    fn msg(ts: &str, url: &str, extra_urls: usize) -> Message {
        let dt = chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S").unwrap();
        let mut links = BTreeMap::new();
        let mut entries = vec![LinkEntry { label: None, url: url.to_string() }];
        for i in 0..extra_urls {
            entries.push(LinkEntry { label: None, url: format!("https://other.example/{i}") });
        }
        links.insert("夸克网盘".to_string(), entries);
        let mut m = Message {
            id: 0,
            timestamp: dt,
            title: "t".into(),
            description: "d".into(),
            links,
            tags: vec![],
            source: None,
            channel: None,
            group_name: None,
            bot: None,
            netdisk_types: vec![],
            created_at: dt,
        };
        m.sync_netdisk_types();
        m
    }

    #[test]
    fn strict_mode_within_window_keeps_richer_message() {
        let mut conn = conn_with_schema();
        // Older message has 2 total URLs, newer has 1; 4 minutes apart (<300s).
        insert_message(&conn, &msg("2026-01-01 10:00:00", "https://pan.baidu.com/s/xyz", 1)).unwrap();
        insert_message(&conn, &msg("2026-01-01 10:04:00", "https://pan.baidu.com/s/xyz", 0)).unwrap();

        let now = chrono::NaiveDateTime::parse_from_str("2026-01-01 11:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let outcome = dedup(&mut conn, DedupMode::Strict, now).unwrap();
        assert_eq!(outcome.deleted, 1);

        let remaining: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0)).unwrap();
        assert_eq!(remaining, 1);
        let survivor_ts: String = conn.query_row("SELECT timestamp FROM messages", [], |r| r.get(0)).unwrap();
        assert_eq!(survivor_ts, "2026-01-01 10:00:00");
    }

    #[test]
    fn strict_mode_outside_window_keeps_newer() {
        let mut conn = conn_with_schema();
        insert_message(&conn, &msg("2026-01-01 09:00:00", "https://pan.baidu.com/s/xyz", 5)).unwrap();
        insert_message(&conn, &msg("2026-01-01 09:30:00", "https://pan.baidu.com/s/xyz", 0)).unwrap();

        let now = chrono::NaiveDateTime::parse_from_str("2026-01-01 11:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        dedup(&mut conn, DedupMode::Strict, now).unwrap();

        let survivor_ts: String = conn.query_row("SELECT timestamp FROM messages", [], |r| r.get(0)).unwrap();
        assert_eq!(survivor_ts, "2026-01-01 09:30:00");
    }

    #[test]
    fn streaming_mode_always_keeps_newer() {
        let mut conn = conn_with_schema();
        insert_message(&conn, &msg("2026-01-01 09:00:00", "https://pan.baidu.com/s/xyz", 10)).unwrap();
        insert_message(&conn, &msg("2026-01-01 09:05:00", "https://pan.baidu.com/s/xyz", 0)).unwrap();

        let now = chrono::NaiveDateTime::parse_from_str("2026-01-01 11:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        dedup(&mut conn, DedupMode::Streaming, now).unwrap();

        let survivor_ts: String = conn.query_row("SELECT timestamp FROM messages", [], |r| r.get(0)).unwrap();
        assert_eq!(survivor_ts, "2026-01-01 09:05:00");
    }

    #[test]
    fn running_strict_twice_yields_zero_deletions_second_time() {
        let mut conn = conn_with_schema();
        insert_message(&conn, &msg("2026-01-01 09:00:00", "https://pan.baidu.com/s/xyz", 1)).unwrap();
        insert_message(&conn, &msg("2026-01-01 09:01:00", "https://pan.baidu.com/s/xyz", 0)).unwrap();

        let now = chrono::NaiveDateTime::parse_from_str("2026-01-01 11:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        dedup(&mut conn, DedupMode::Strict, now).unwrap();
        let second = dedup(&mut conn, DedupMode::Strict, now).unwrap();
        assert_eq!(second.deleted, 0);
    }

    #[test]
    fn dedup_stats_row_is_always_appended() {
        let mut conn = conn_with_schema();
        insert_message(&conn, &msg("2026-01-01 09:00:00", "https://pan.baidu.com/s/unique", 0)).unwrap();
        let now = chrono::NaiveDateTime::parse_from_str("2026-01-01 11:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        dedup(&mut conn, DedupMode::Strict, now).unwrap();
        let rows: i64 = conn.query_row("SELECT COUNT(*) FROM dedup_stats", [], |r| r.get(0)).unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn old_dedup_stats_rows_are_purged() {
        let mut conn = conn_with_schema();
        conn.execute(
            "INSERT INTO dedup_stats (run_time, inserted, deleted) VALUES ('2025-01-01 00:00:00', 1, 0)",
            [],
        )
        .unwrap();
        let now = chrono::NaiveDateTime::parse_from_str("2026-01-01 11:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        dedup(&mut conn, DedupMode::Strict, now).unwrap();
        let rows: i64 = conn.query_row("SELECT COUNT(*) FROM dedup_stats", [], |r| r.get(0)).unwrap();
        assert_eq!(rows, 1); // only the fresh row from this run survives
    }
}

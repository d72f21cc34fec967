//! Persistence for validation task runs (§4.6.4): one `link_check_stats`
//! row plus its `link_check_details` rows, written atomically.

use std::collections::BTreeMap;

use rusqlite::{params, Connection};

use crate::domain::{LinkCheckDetails, LinkCheckStats, ProviderTally, TaskStatus};
use crate::error::AppError;

use super::{dt_from_text, dt_to_text, Store};

impl Store {
    pub fn record_link_check(
        &self,
        stats: &LinkCheckStats,
        details: &[LinkCheckDetails],
    ) -> Result<i64, AppError> {
        let mut conn = self.conn()?;
        record_link_check(&mut conn, stats, details)
    }

    pub fn recent_link_check_stats(&self, limit: i64) -> Result<Vec<LinkCheckStats>, AppError> {
        let conn = self.conn()?;
        recent_link_check_stats(&conn, limit)
    }
}

fn status_to_text(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Running => "running",
        TaskStatus::Completed => "completed",
        TaskStatus::Interrupted => "interrupted",
        TaskStatus::Failed => "failed",
    }
}

fn status_from_text(s: &str) -> TaskStatus {
    match s {
        "running" => TaskStatus::Running,
        "interrupted" => TaskStatus::Interrupted,
        "failed" => TaskStatus::Failed,
        _ => TaskStatus::Completed,
    }
}

pub(crate) fn record_link_check(
    conn: &mut Connection,
    stats: &LinkCheckStats,
    details: &[LinkCheckDetails],
) -> Result<i64, AppError> {
    let tx = conn.transaction().map_err(|e| AppError::Store(format!("begin tx: {e}")))?;

    let netdisk_json = serde_json::to_string(&stats.netdisk_stats)
        .map_err(|e| AppError::Store(format!("serialize netdisk_stats: {e}")))?;

    tx.execute(
        "INSERT INTO link_check_stats
            (check_time, total_messages, total_links, valid_links, invalid_links,
             deleted_messages, updated_messages, netdisk_stats, check_duration, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            dt_to_text(&stats.check_time),
            stats.total_messages,
            stats.total_links,
            stats.valid_links,
            stats.invalid_links,
            stats.deleted_messages,
            stats.updated_messages,
            netdisk_json,
            stats.check_duration,
            status_to_text(stats.status),
            dt_to_text(&stats.created_at),
        ],
    )
    .map_err(|e| AppError::Store(format!("insert link_check_stats: {e}")))?;
    let stats_id = tx.last_insert_rowid();

    {
        let mut stmt = tx
            .prepare(
                "INSERT INTO link_check_details
                    (check_time, message_id, netdisk_type, url, is_valid, response_time, error_reason, action_taken, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .map_err(|e| AppError::Store(format!("prepare detail insert: {e}")))?;
        for detail in details {
            stmt.execute(params![
                dt_to_text(&detail.check_time),
                detail.message_id,
                detail.netdisk_type,
                detail.url,
                detail.is_valid,
                detail.response_time,
                detail.error_reason,
                detail.action_taken,
                dt_to_text(&detail.created_at),
            ])
            .map_err(|e| AppError::Store(format!("insert link_check_details: {e}")))?;
        }
    }

    tx.commit().map_err(|e| AppError::Store(format!("commit tx: {e}")))?;
    Ok(stats_id)
}

pub(crate) fn recent_link_check_stats(conn: &Connection, limit: i64) -> Result<Vec<LinkCheckStats>, AppError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, check_time, total_messages, total_links, valid_links, invalid_links,
                    deleted_messages, updated_messages, netdisk_stats, check_duration, status, created_at
             FROM link_check_stats ORDER BY check_time DESC LIMIT ?1",
        )
        .map_err(|e| AppError::Store(format!("prepare recent link_check_stats: {e}")))?;

    let rows = stmt
        .query_map(params![limit], |row| {
            let check_time_text: String = row.get(1)?;
            let netdisk_json: String = row.get(8)?;
            let status_text: String = row.get(10)?;
            let created_at_text: String = row.get(11)?;
            let netdisk_stats: BTreeMap<String, ProviderTally> = serde_json::from_str(&netdisk_json)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e)))?;
            Ok(LinkCheckStats {
                id: row.get(0)?,
                check_time: dt_from_text(&check_time_text)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e)))?,
                total_messages: row.get(2)?,
                total_links: row.get(3)?,
                valid_links: row.get(4)?,
                invalid_links: row.get(5)?,
                deleted_messages: row.get(6)?,
                updated_messages: row.get(7)?,
                netdisk_stats,
                check_duration: row.get(9)?,
                status: status_from_text(&status_text),
                created_at: dt_from_text(&created_at_text)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e)))?,
            })
        })
        .map_err(|e| AppError::Store(format!("run recent link_check_stats: {e}")))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| AppError::Store(format!("decode link_check_stats row: {e}")))?);
    }
    Ok(out)
}

//! Messages table — insert, point lookup, and the filtered pagination query
//! (§4.7), grounded on
//! `examples/original_source/app/services/message_service.py::get_filtered_messages`.

use std::collections::BTreeMap;

use rusqlite::{params, params_from_iter, Connection, Row};
use serde::Serialize;

use crate::domain::{LinkEntry, Message};
use crate::error::AppError;

use super::{dt_from_text, dt_to_text, Store};

impl Store {
    /// Persist `message`, ignoring its (not-yet-assigned) `id`, and return
    /// the row id assigned by the store.
    pub fn insert_message(&self, message: &Message) -> Result<i64, AppError> {
        let conn = self.conn()?;
        insert_message(&conn, message)
    }

    pub fn get_message_by_id(&self, id: i64) -> Result<Option<Message>, AppError> {
        let conn = self.conn()?;
        get_message_by_id(&conn, id)
    }

    pub fn get_filtered_messages(&self, filter: &MessageFilter) -> Result<Page, AppError> {
        let conn = self.conn()?;
        get_filtered_messages(&conn, filter)
    }
}

pub(crate) fn insert_message(conn: &Connection, message: &Message) -> Result<i64, AppError> {
    let links_json = serde_json::to_string(&message.links)
        .map_err(|e| AppError::Store(format!("serialize links: {e}")))?;
    let tags_json = serde_json::to_string(&message.tags)
        .map_err(|e| AppError::Store(format!("serialize tags: {e}")))?;
    let netdisk_json = serde_json::to_string(&message.netdisk_types)
        .map_err(|e| AppError::Store(format!("serialize netdisk_types: {e}")))?;

    conn.execute(
        "INSERT INTO messages
            (timestamp, title, description, links, tags, source, channel, group_name, bot, created_at, netdisk_types)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            dt_to_text(&message.timestamp),
            message.title,
            message.description,
            links_json,
            tags_json,
            message.source,
            message.channel,
            message.group_name,
            message.bot,
            dt_to_text(&message.created_at),
            netdisk_json,
        ],
    )
    .map_err(|e| AppError::Store(format!("insert message: {e}")))?;

    Ok(conn.last_insert_rowid())
}

pub(crate) fn get_message_by_id(conn: &Connection, id: i64) -> Result<Option<Message>, AppError> {
    conn.query_row(
        "SELECT id, timestamp, title, description, links, tags, source, channel, group_name, bot, created_at, netdisk_types
         FROM messages WHERE id = ?1",
        params![id],
        row_to_message,
    )
    .map(Some)
    .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        e => Err(AppError::Store(format!("get message {id}: {e}"))),
    })
}

fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
    let links_json: String = row.get(4)?;
    let tags_json: String = row.get(5)?;
    let netdisk_json: String = row.get(11)?;

    let links: BTreeMap<String, Vec<LinkEntry>> = serde_json::from_str(&links_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e)))?;
    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e)))?;
    let netdisk_types: Vec<String> = serde_json::from_str(&netdisk_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e)))?;

    let timestamp_text: String = row.get(1)?;
    let created_at_text: String = row.get(10)?;

    Ok(Message {
        id: row.get(0)?,
        timestamp: dt_from_text(&timestamp_text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e)))?,
        title: row.get(2)?,
        description: row.get(3)?,
        links,
        tags,
        source: row.get(6)?,
        channel: row.get(7)?,
        group_name: row.get(8)?,
        bot: row.get(9)?,
        netdisk_types,
        created_at: dt_from_text(&created_at_text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e)))?,
    })
}

/// Accepted `time_range` values (§4.7); anything else is treated as `All`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRange {
    LastHour,
    Last24Hours,
    Last7Days,
    Last30Days,
    #[default]
    All,
}

impl TimeRange {
    pub fn parse(s: &str) -> Self {
        match s {
            "最近1小时" => TimeRange::LastHour,
            "最近24小时" => TimeRange::Last24Hours,
            "最近7天" => TimeRange::Last7Days,
            "最近30天" => TimeRange::Last30Days,
            _ => TimeRange::All,
        }
    }

    fn since(self, now: chrono::NaiveDateTime) -> Option<chrono::NaiveDateTime> {
        match self {
            TimeRange::LastHour => Some(now - chrono::Duration::hours(1)),
            TimeRange::Last24Hours => Some(now - chrono::Duration::hours(24)),
            TimeRange::Last7Days => Some(now - chrono::Duration::days(7)),
            TimeRange::Last30Days => Some(now - chrono::Duration::days(30)),
            TimeRange::All => None,
        }
    }
}

/// Filter parameters accepted by `GET /api/messages` (§4.7). Guest mode
/// (§6) coerces an instance of this to `time_range = Last24Hours` and clears
/// every other filter field before this function ever sees it.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub query: Option<String>,
    pub time_range: TimeRange,
    pub tags: Vec<String>,
    pub providers: Vec<String>,
    pub min_combined_length: Option<i64>,
    pub links_only: bool,
    pub page: i64,
    pub page_size: i64,
}

impl MessageFilter {
    /// Clamp `page` (>=1) and `page_size` (1..=200, default 100) per §8.
    pub fn normalize(mut self) -> Self {
        if self.page < 1 {
            self.page = 1;
        }
        if self.page_size <= 0 {
            self.page_size = 100;
        }
        self.page_size = self.page_size.clamp(1, 200);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Page {
    pub messages: Vec<Message>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub max_page: Option<i64>,
}

pub(crate) fn get_filtered_messages(conn: &Connection, filter: &MessageFilter) -> Result<Page, AppError> {
    let filter = filter.clone().normalize();
    let mut conditions: Vec<String> = Vec::new();
    let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(since) = filter.time_range.since(crate::time::now_local()) {
        conditions.push("timestamp >= ?".to_string());
        args.push(Box::new(dt_to_text(&since)));
    }

    if let Some(query) = filter.query.as_ref().filter(|q| !q.trim().is_empty()) {
        for token in query.split_whitespace() {
            let like = format!("%{token}%");
            conditions.push(
                "(title LIKE ? ESCAPE '\\' OR description LIKE ? ESCAPE '\\' OR \
                 EXISTS (SELECT 1 FROM json_each(tags) WHERE value LIKE ? ESCAPE '\\'))"
                    .to_string(),
            );
            args.push(Box::new(like.clone()));
            args.push(Box::new(like.clone()));
            args.push(Box::new(like));
        }
    }

    if !filter.tags.is_empty() {
        let placeholders = vec!["?"; filter.tags.len()].join(", ");
        conditions.push(format!(
            "EXISTS (SELECT 1 FROM json_each(tags) WHERE value IN ({placeholders}))"
        ));
        for tag in &filter.tags {
            args.push(Box::new(tag.clone()));
        }
    }

    if !filter.providers.is_empty() {
        let placeholders = vec!["?"; filter.providers.len()].join(", ");
        conditions.push(format!(
            "EXISTS (SELECT 1 FROM json_each(netdisk_types) WHERE value IN ({placeholders}))"
        ));
        for provider in &filter.providers {
            args.push(Box::new(provider.clone()));
        }
    }

    if let Some(min_len) = filter.min_combined_length {
        conditions.push("(length(title) + length(description)) >= ?".to_string());
        args.push(Box::new(min_len));
    }

    if filter.links_only {
        conditions.push("EXISTS (SELECT 1 FROM json_each(links))".to_string());
    }

    let where_clause =
        if conditions.is_empty() { String::new() } else { format!("WHERE {}", conditions.join(" AND ")) };

    let offset = (filter.page - 1) * filter.page_size;
    let fetch_limit = filter.page_size + 1;

    let select_sql = format!(
        "SELECT id, timestamp, title, description, links, tags, source, channel, group_name, bot, created_at, netdisk_types
         FROM messages {where_clause} ORDER BY timestamp DESC LIMIT ? OFFSET ?"
    );

    let mut select_args = args;
    select_args.push(Box::new(fetch_limit));
    select_args.push(Box::new(offset));

    let mut stmt = conn
        .prepare(&select_sql)
        .map_err(|e| AppError::Store(format!("prepare filtered query: {e}")))?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = select_args.iter().map(|b| b.as_ref()).collect();
    let mut rows = stmt
        .query(params_from_iter(param_refs))
        .map_err(|e| AppError::Store(format!("run filtered query: {e}")))?;

    let mut messages = Vec::new();
    while let Some(row) = rows.next().map_err(|e| AppError::Store(format!("fetch row: {e}")))? {
        messages.push(row_to_message(row).map_err(|e| AppError::Store(format!("decode message row: {e}")))?);
    }
    drop(rows);
    drop(stmt);

    let has_extra = messages.len() as i64 > filter.page_size;
    if has_extra {
        messages.truncate(filter.page_size as usize);
    }

    let (total, max_page) = if has_extra {
        let count_sql = format!("SELECT COUNT(*) FROM messages {where_clause}");
        let mut count_stmt = conn
            .prepare(&count_sql)
            .map_err(|e| AppError::Store(format!("prepare count query: {e}")))?;
        let count_args: Vec<&dyn rusqlite::ToSql> =
            select_args[..select_args.len() - 2].iter().map(|b| b.as_ref()).collect();
        let total: i64 = count_stmt
            .query_row(params_from_iter(count_args), |r| r.get(0))
            .map_err(|e| AppError::Store(format!("run count query: {e}")))?;
        let max_page = (total + filter.page_size - 1) / filter.page_size;
        (total, Some(max_page.max(1)))
    } else {
        (offset + messages.len() as i64, None)
    };

    // Silently reset to page 1 when the requested page exceeds max_page (§4.7).
    if let Some(max_page) = max_page {
        if filter.page > max_page {
            let mut reset_filter = filter.clone();
            reset_filter.page = 1;
            return get_filtered_messages(conn, &reset_filter);
        }
    }

    Ok(Page { messages, page: filter.page, page_size: filter.page_size, total, max_page })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn sample_message(title: &str, ts: &str, provider: &str, tags: &[&str]) -> Message {
        let dt = NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S").unwrap();
        let mut links = BTreeMap::new();
        links.insert(provider.to_string(), vec![LinkEntry { label: None, url: format!("https://{provider}.example/x") }]);
        let mut m = Message {
            id: 0,
            timestamp: dt,
            title: title.to_string(),
            description: "desc text".to_string(),
            links,
            tags: tags.iter().map(|s| s.to_string()).collect(),
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

    fn open_test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        super::super::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn insert_and_get_roundtrips() {
        let conn = open_test_conn();
        let msg = sample_message("标题", "2026-01-01 10:00:00", "夸克网盘", &["a", "b"]);
        let id = insert_message(&conn, &msg).unwrap();
        let fetched = get_message_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(fetched.title, "标题");
        assert_eq!(fetched.netdisk_types, vec!["夸克网盘".to_string()]);
        assert_eq!(fetched.tags, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn filter_by_provider_and_tag() {
        let conn = open_test_conn();
        insert_message(&conn, &sample_message("t1", "2026-01-01 10:00:00", "夸克网盘", &["剧集"])).unwrap();
        insert_message(&conn, &sample_message("t2", "2026-01-01 11:00:00", "百度网盘", &["电影"])).unwrap();

        let filter = MessageFilter {
            providers: vec!["百度网盘".to_string()],
            page: 1,
            page_size: 10,
            ..Default::default()
        };
        let page = get_filtered_messages(&conn, &filter).unwrap();
        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].title, "t2");
    }

    #[test]
    fn pagination_exposes_max_page_only_when_extra_row_exists() {
        let conn = open_test_conn();
        for i in 0..5 {
            insert_message(
                &conn,
                &sample_message(&format!("t{i}"), &format!("2026-01-01 10:0{i}:00"), "夸克网盘", &[]),
            )
            .unwrap();
        }
        let filter = MessageFilter { page: 1, page_size: 2, ..Default::default() };
        let page = get_filtered_messages(&conn, &filter).unwrap();
        assert_eq!(page.messages.len(), 2);
        assert_eq!(page.max_page, Some(3));
    }

    #[test]
    fn out_of_range_page_resets_to_first_page() {
        let conn = open_test_conn();
        for i in 0..3 {
            insert_message(
                &conn,
                &sample_message(&format!("t{i}"), &format!("2026-01-01 10:0{i}:00"), "夸克网盘", &[]),
            )
            .unwrap();
        }
        let filter = MessageFilter { page: 99, page_size: 2, ..Default::default() };
        let page = get_filtered_messages(&conn, &filter).unwrap();
        assert_eq!(page.page, 1);
    }

    #[test]
    fn page_size_clamps_to_bounds() {
        let filter = MessageFilter { page_size: 10_000, ..Default::default() }.normalize();
        assert_eq!(filter.page_size, 200);
        let filter = MessageFilter { page_size: 0, ..Default::default() }.normalize();
        assert_eq!(filter.page_size, 100);
    }
}

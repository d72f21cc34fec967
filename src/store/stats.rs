//! Query & Statistics Layer aggregates (§4.7), grounded on
//! `examples/original_source/app/services/statistics_service.py` and
//! `message_service.py::get_tag_stats`. None of these materialize the
//! messages table into memory — every aggregate is computed in SQL.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::domain::labels::PROVIDER_SHORT_NAMES;
use crate::error::AppError;

use super::{dt_to_text, Store};

#[derive(Debug, Clone, Serialize, Default)]
pub struct Overview {
    pub total: i64,
    pub today: i64,
    pub total_links: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyPoint {
    pub date: String,
    pub message_count: i64,
    pub link_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HourlyDedup {
    pub hour: String,
    pub deleted: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetdiskShare {
    pub provider: String,
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
}

impl Store {
    pub fn overview(&self, now: NaiveDateTime) -> Result<Overview, AppError> {
        overview(&self.conn()?, now)
    }

    pub fn daily_trend(&self, days: i64, now: NaiveDateTime) -> Result<Vec<DailyPoint>, AppError> {
        daily_trend(&self.conn()?, days.clamp(1, 30), now)
    }

    pub fn dedup_stats_by_hour(&self, hours: i64, now: NaiveDateTime) -> Result<Vec<HourlyDedup>, AppError> {
        dedup_stats_by_hour(&self.conn()?, hours.clamp(1, 24), now)
    }

    pub fn netdisk_distribution(&self, hours: i64, now: NaiveDateTime) -> Result<Vec<NetdiskShare>, AppError> {
        netdisk_distribution(&self.conn()?, hours.clamp(1, 168), now)
    }

    pub fn tag_stats(&self, limit: i64) -> Result<Vec<TagCount>, AppError> {
        tag_stats(&self.conn()?, limit.clamp(1, 100))
    }
}

fn overview(conn: &Connection, now: NaiveDateTime) -> Result<Overview, AppError> {
    let total: i64 = conn
        .query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))
        .map_err(|e| AppError::Store(format!("overview total: {e}")))?;

    let day_start = dt_to_text(&now.date().and_hms_opt(0, 0, 0).unwrap());
    let today: i64 = conn
        .query_row("SELECT COUNT(*) FROM messages WHERE timestamp >= ?1", params![day_start], |r| r.get(0))
        .map_err(|e| AppError::Store(format!("overview today: {e}")))?;

    // sum over messages of the count of keys in `links` (a JSON object).
    let total_links: i64 = conn
        .query_row(
            "SELECT COALESCE(SUM((SELECT COUNT(*) FROM json_each(links))), 0) FROM messages",
            [],
            |r| r.get(0),
        )
        .map_err(|e| AppError::Store(format!("overview total_links: {e}")))?;

    Ok(Overview { total, today, total_links })
}

fn daily_trend(conn: &Connection, days: i64, now: NaiveDateTime) -> Result<Vec<DailyPoint>, AppError> {
    let start_date = now.date() - Duration::days(days - 1);

    let mut stmt = conn
        .prepare(
            "SELECT substr(timestamp, 1, 10) AS day, COUNT(*), \
             COALESCE(SUM((SELECT COUNT(*) FROM json_each(links))), 0) \
             FROM messages WHERE timestamp >= ?1 GROUP BY day",
        )
        .map_err(|e| AppError::Store(format!("prepare daily_trend: {e}")))?;
    let rows = stmt
        .query_map(params![dt_to_text(&start_date.and_hms_opt(0, 0, 0).unwrap())], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
        })
        .map_err(|e| AppError::Store(format!("run daily_trend: {e}")))?;

    let mut by_day: BTreeMap<String, (i64, i64)> = BTreeMap::new();
    for row in rows {
        let (day, count, links) = row.map_err(|e| AppError::Store(e.to_string()))?;
        by_day.insert(day, (count, links));
    }

    let mut points = Vec::with_capacity(days as usize);
    for offset in 0..days {
        let date = start_date + Duration::days(offset);
        let key = date.format("%Y-%m-%d").to_string();
        let (count, links) = by_day.get(&key).copied().unwrap_or((0, 0));
        points.push(DailyPoint { date: date.format("%m-%d").to_string(), message_count: count, link_count: links });
    }
    Ok(points)
}

fn dedup_stats_by_hour(conn: &Connection, hours: i64, now: NaiveDateTime) -> Result<Vec<HourlyDedup>, AppError> {
    let start = crate::time::truncate_hour(now) - Duration::hours(hours - 1);
    let rows = super::dedup::recent_dedup_stats(conn, start)?;

    let mut by_hour: BTreeMap<String, i64> = BTreeMap::new();
    for row in &rows {
        let hour_key = crate::time::truncate_hour(row.run_time).format("%Y-%m-%d %H:00:00").to_string();
        *by_hour.entry(hour_key).or_insert(0) += row.deleted;
    }

    let mut points = Vec::with_capacity(hours as usize);
    for offset in 0..hours {
        let hour = crate::time::truncate_hour(now) - Duration::hours(hours - 1 - offset);
        let key = hour.format("%Y-%m-%d %H:00:00").to_string();
        points.push(HourlyDedup { hour: hour.format("%m-%d %H:00").to_string(), deleted: by_hour.get(&key).copied().unwrap_or(0) });
    }
    Ok(points)
}

fn netdisk_distribution(conn: &Connection, hours: i64, now: NaiveDateTime) -> Result<Vec<NetdiskShare>, AppError> {
    let since = now - Duration::hours(hours);

    let mut stmt = conn
        .prepare(
            "SELECT value FROM messages, json_each(netdisk_types) WHERE messages.timestamp >= ?1",
        )
        .map_err(|e| AppError::Store(format!("prepare netdisk_distribution: {e}")))?;
    let rows = stmt
        .query_map(params![dt_to_text(&since)], |row| row.get::<_, String>(0))
        .map_err(|e| AppError::Store(format!("run netdisk_distribution: {e}")))?;

    let mut counts: BTreeMap<String, i64> = BTreeMap::new();
    for row in rows {
        let provider = row.map_err(|e| AppError::Store(e.to_string()))?;
        let brand = collapse_to_brand(&provider);
        *counts.entry(brand).or_insert(0) += 1;
    }

    let total: i64 = counts.values().sum();
    let mut shares: Vec<NetdiskShare> = counts
        .into_iter()
        .map(|(provider, count)| NetdiskShare {
            provider,
            count,
            percentage: if total == 0 { 0.0 } else { (count as f64) * 100.0 / (total as f64) },
        })
        .collect();
    shares.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.provider.cmp(&b.provider)));
    Ok(shares)
}

/// Collapse a full provider tag to its short brand name (§3's stripping
/// list), e.g. `"夸克网盘"` → `"夸克"`. Falls back to the original tag when
/// no short name is a prefix of it.
fn collapse_to_brand(provider: &str) -> String {
    PROVIDER_SHORT_NAMES
        .iter()
        .find(|short| provider.starts_with(**short))
        .map(|short| short.to_string())
        .unwrap_or_else(|| provider.to_string())
}

fn tag_stats(conn: &Connection, limit: i64) -> Result<Vec<TagCount>, AppError> {
    let mut stmt = conn
        .prepare("SELECT value FROM messages, json_each(tags)")
        .map_err(|e| AppError::Store(format!("prepare tag_stats: {e}")))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| AppError::Store(format!("run tag_stats: {e}")))?;

    let mut counts: BTreeMap<String, i64> = BTreeMap::new();
    for row in rows {
        let tag = row.map_err(|e| AppError::Store(e.to_string()))?;
        *counts.entry(tag).or_insert(0) += 1;
    }

    let mut tags: Vec<TagCount> = counts.into_iter().map(|(tag, count)| TagCount { tag, count }).collect();
    tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    tags.truncate(limit as usize);
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LinkEntry, Message};
    use crate::store::messages::insert_message;
    use std::collections::BTreeMap as Map;

    fn conn_with_schema() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        super::super::init_schema(&conn).unwrap();
        conn
    }

    fn msg(ts: &str, provider: &str, tags: &[&str]) -> Message {
        let dt = NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S").unwrap();
        let mut links = Map::new();
        links.insert(provider.to_string(), vec![LinkEntry { label: None, url: format!("https://{provider}/x") }]);
        let mut m = Message {
            id: 0,
            timestamp: dt,
            title: "t".into(),
            description: "d".into(),
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

    #[test]
    fn overview_counts_total_today_and_links() {
        let conn = conn_with_schema();
        insert_message(&conn, &msg("2026-01-01 08:00:00", "夸克网盘", &[])).unwrap();
        insert_message(&conn, &msg("2026-01-02 08:00:00", "百度网盘", &[])).unwrap();
        let now = NaiveDateTime::parse_from_str("2026-01-02 20:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let result = overview(&conn, now).unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.today, 1);
        assert_eq!(result.total_links, 2);
    }

    #[test]
    fn daily_trend_fills_missing_days_with_zero() {
        let conn = conn_with_schema();
        insert_message(&conn, &msg("2026-01-01 08:00:00", "夸克网盘", &[])).unwrap();
        let now = NaiveDateTime::parse_from_str("2026-01-03 08:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let points = daily_trend(&conn, 3, now).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].message_count, 1);
        assert_eq!(points[1].message_count, 0);
        assert_eq!(points[2].message_count, 0);
    }

    #[test]
    fn netdisk_distribution_collapses_to_brand_and_sums_to_100() {
        let conn = conn_with_schema();
        insert_message(&conn, &msg("2026-01-01 08:00:00", "夸克网盘", &[])).unwrap();
        insert_message(&conn, &msg("2026-01-01 09:00:00", "夸克网盘", &[])).unwrap();
        insert_message(&conn, &msg("2026-01-01 10:00:00", "百度网盘", &[])).unwrap();
        let now = NaiveDateTime::parse_from_str("2026-01-01 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let shares = netdisk_distribution(&conn, 24, now).unwrap();
        let total_pct: f64 = shares.iter().map(|s| s.percentage).sum();
        assert!((total_pct - 100.0).abs() < 1e-6);
        assert_eq!(shares[0].provider, "夸克");
        assert_eq!(shares[0].count, 2);
    }

    #[test]
    fn tag_stats_orders_by_count_desc_and_respects_limit() {
        let conn = conn_with_schema();
        insert_message(&conn, &msg("2026-01-01 08:00:00", "夸克网盘", &["a", "b"])).unwrap();
        insert_message(&conn, &msg("2026-01-01 09:00:00", "夸克网盘", &["a"])).unwrap();
        let tags = tag_stats(&conn, 1).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].tag, "a");
        assert_eq!(tags[0].count, 2);
    }
}

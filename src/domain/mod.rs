//! Shared domain types persisted by the store and served by the REST API.

pub mod labels;
pub mod provider;

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A single classified link inside a `Message`, optionally annotated with a
/// quality/variant label drawn from the controlled vocabulary (§4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEntry {
    pub label: Option<String>,
    pub url: String,
}

/// The canonical ingestion record (§3 DATA MODEL).
///
/// Invariant: a `Message` is only ever persisted when `links` is non-empty,
/// and `netdisk_types == sort(unique(keys(links)))`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub timestamp: NaiveDateTime,
    pub title: String,
    pub description: String,
    pub links: BTreeMap<String, Vec<LinkEntry>>,
    pub tags: Vec<String>,
    pub source: Option<String>,
    pub channel: Option<String>,
    pub group_name: Option<String>,
    pub bot: Option<String>,
    pub netdisk_types: Vec<String>,
    pub created_at: NaiveDateTime,
}

impl Message {
    /// Recompute `netdisk_types` from `links`, matching the invariant in §3.
    pub fn sync_netdisk_types(&mut self) {
        let mut types: Vec<String> = self.links.keys().cloned().collect();
        types.sort();
        types.dedup();
        self.netdisk_types = types;
    }

    pub fn total_url_count(&self) -> usize {
        self.links.values().map(Vec::len).sum()
    }
}

/// `{id, username}` — either a channel handle or an invite-hash string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub username: String,
}

/// `{id, api_id, api_hash}` — at most a few rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: i64,
    pub api_id: String,
    pub api_hash: String,
}

/// One row per deduplication run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupStats {
    pub id: i64,
    pub run_time: NaiveDateTime,
    pub inserted: i64,
    pub deleted: i64,
}

/// Per-provider tally embedded in a `LinkCheckStats` row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderTally {
    pub total: i64,
    pub valid: i64,
    pub invalid: i64,
}

/// One row per validation run (§4.6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkCheckStats {
    pub id: i64,
    pub check_time: NaiveDateTime,
    pub total_messages: i64,
    pub total_links: i64,
    pub valid_links: i64,
    pub invalid_links: i64,
    pub deleted_messages: i64,
    pub updated_messages: i64,
    pub netdisk_stats: BTreeMap<String, ProviderTally>,
    pub check_duration: f64,
    pub status: TaskStatus,
    pub created_at: NaiveDateTime,
}

/// Task lifecycle state machine (§4.6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Interrupted => "interrupted",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One row per probed URL in a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkCheckDetails {
    pub id: i64,
    pub check_time: NaiveDateTime,
    /// Always `0` — no code path threads the originating message id through
    /// to the validator (see DESIGN.md Open Question resolutions).
    pub message_id: i64,
    pub netdisk_type: String,
    pub url: String,
    pub is_valid: bool,
    pub response_time: Option<f64>,
    pub error_reason: Option<String>,
    /// Always `"none"` (see DESIGN.md Open Question resolutions).
    pub action_taken: String,
    pub created_at: NaiveDateTime,
}

/// User role. Only `Admin` may reach `/api/admin/*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

/// `{username, password, name, email, role}`, stored outside the relational
/// schema in a single JSON document protected by a file lock (§6).
#[derive(Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// Bcrypt hash. Never serialized back out over the REST surface.
    #[serde(skip_serializing)]
    pub password: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_netdisk_types_matches_keys() {
        let mut m = Message {
            id: 1,
            timestamp: NaiveDateTime::parse_from_str("2026-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
            title: "t".into(),
            description: "d".into(),
            links: BTreeMap::new(),
            tags: vec![],
            source: None,
            channel: None,
            group_name: None,
            bot: None,
            netdisk_types: vec![],
            created_at: NaiveDateTime::parse_from_str("2026-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
        };
        m.links.insert("百度网盘".into(), vec![LinkEntry { label: None, url: "https://pan.baidu.com/s/x".into() }]);
        m.links.insert("夸克网盘".into(), vec![LinkEntry { label: None, url: "https://pan.quark.cn/s/y".into() }]);
        m.sync_netdisk_types();
        assert_eq!(m.netdisk_types, vec!["夸克网盘".to_string(), "百度网盘".to_string()]);
    }

    #[test]
    fn user_debug_redacts_password() {
        let u = User {
            username: "admin".into(),
            password: "secret-hash".into(),
            name: "Admin".into(),
            email: "".into(),
            role: Role::Admin,
        };
        let debug = format!("{u:?}");
        assert!(!debug.contains("secret-hash"));
    }
}

//! Configuration loading from environment variables.
//!
//! Reads the variables recognized by the system (see `SPEC_FULL.md` §6), with
//! `dotenvy::dotenv()` already applied by the caller in `main.rs`. Required
//! variables missing at startup are a fatal `AppError::Config`.

use std::env;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_api_id: Option<i64>,
    pub telegram_api_hash: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub database_url: String,
    pub default_channels: Vec<String>,
    pub log_level: String,
    pub secret_salt: String,
    pub public_dashboard_enabled: bool,
    pub frontend_url: Option<String>,
    pub db_path: PathBuf,
    pub bind_addr: String,
    pub failed_messages_log_path: PathBuf,
    pub error_messages_log_path: PathBuf,
    /// Path to the `.env` file the admin config endpoint rewrites when
    /// toggling `PUBLIC_DASHBOARD_ENABLED`.
    pub env_file_path: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        let telegram_api_id = env::var("TELEGRAM_API_ID")
            .ok()
            .map(|v| v.parse::<i64>())
            .transpose()
            .map_err(|e| AppError::Config(format!("TELEGRAM_API_ID must be an integer: {e}")))?;

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL is required".into()))?;

        let secret_salt = env::var("SECRET_SALT")
            .map_err(|_| AppError::Config("SECRET_SALT is required".into()))?;

        let default_channels = env::var("DEFAULT_CHANNELS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let public_dashboard_enabled = env::var("PUBLIC_DASHBOARD_ENABLED")
            .ok()
            .map(|v| parse_bool(&v))
            .transpose()
            .map_err(|e| AppError::Config(format!("PUBLIC_DASHBOARD_ENABLED: {e}")))?
            .unwrap_or(false);

        let db_path = env::var("DB_PATH")
            .unwrap_or_else(|_| "data/tgmonitor.db".to_string())
            .into();

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        Ok(Config {
            telegram_api_id,
            telegram_api_hash: env::var("TELEGRAM_API_HASH").ok(),
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok(),
            database_url,
            default_channels,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            secret_salt,
            public_dashboard_enabled,
            frontend_url: env::var("FRONTEND_URL").ok(),
            db_path,
            bind_addr,
            failed_messages_log_path: env::var("FAILED_MESSAGES_LOG_PATH")
                .unwrap_or_else(|_| "data/failed_messages.log".to_string())
                .into(),
            error_messages_log_path: env::var("ERROR_MESSAGES_LOG_PATH")
                .unwrap_or_else(|_| "data/error_messages.log".to_string())
                .into(),
            env_file_path: env::var("ENV_FILE_PATH").unwrap_or_else(|_| ".env".to_string()).into(),
        })
    }
}

fn parse_bool(v: &str) -> Result<bool, AppError> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AppError::Config(format!("not a boolean: '{other}'"))),
    }
}

/// Rewrite `PUBLIC_DASHBOARD_ENABLED` inside the env file, preserving every
/// other key and ensuring a trailing newline. Writes to a temp file in the
/// same directory then renames over the original, so readers never observe a
/// partially-written document.
pub fn set_public_dashboard_enabled(env_file_path: &Path, enabled: bool) -> Result<(), AppError> {
    let existing = std::fs::read_to_string(env_file_path).unwrap_or_default();
    let mut found = false;
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            if line.trim_start().starts_with("PUBLIC_DASHBOARD_ENABLED=") {
                found = true;
                format!("PUBLIC_DASHBOARD_ENABLED={enabled}")
            } else {
                line.to_string()
            }
        })
        .collect();
    if !found {
        lines.push(format!("PUBLIC_DASHBOARD_ENABLED={enabled}"));
    }

    let dir = env_file_path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_path = dir.join(format!(
        ".{}.tmp",
        env_file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".env".to_string())
    ));

    {
        let mut tmp = std::fs::File::create(&tmp_path)?;
        for line in &lines {
            writeln!(tmp, "{line}")?;
        }
        tmp.flush()?;
    }
    std::fs::rename(&tmp_path, env_file_path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_forms() {
        assert!(parse_bool("true").unwrap());
        assert!(parse_bool("1").unwrap());
        assert!(!parse_bool("false").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("yes").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn set_public_dashboard_enabled_preserves_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "SECRET_SALT=abc\nPUBLIC_DASHBOARD_ENABLED=false\nFOO=bar\n").unwrap();

        set_public_dashboard_enabled(&path, true).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("SECRET_SALT=abc"));
        assert!(content.contains("PUBLIC_DASHBOARD_ENABLED=true"));
        assert!(content.contains("FOO=bar"));
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn set_public_dashboard_enabled_appends_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "SECRET_SALT=abc\n").unwrap();

        set_public_dashboard_enabled(&path, true).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("SECRET_SALT=abc"));
        assert!(content.contains("PUBLIC_DASHBOARD_ENABLED=true"));
    }
}

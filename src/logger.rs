//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after configuration is loaded.

use std::path::Path;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Initialise the global tracing subscriber.
///
/// `level` takes precedence over `RUST_LOG`; if `level` fails to parse, falls
/// back to `RUST_LOG`.
pub fn init(level: &str, log_file: Option<&Path>) -> Result<(), AppError> {
    let filter = EnvFilter::try_new(level).or_else(|_| EnvFilter::try_from_default_env())
        .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")))?;

    let writer = if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                AppError::Logger(format!("failed to open log file '{}': {e}", path.display()))
            })?;
        BoxMakeWriter::new(file)
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_info_succeeds_or_already_init() {
        let result = init("info", None);
        match result {
            Ok(()) => {}
            Err(AppError::Logger(msg)) if msg.contains("set subscriber") => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn invalid_level_falls_back_to_rust_log() {
        // "" is invalid for EnvFilter::try_new but RUST_LOG may be unset too;
        // either branch must not panic.
        let _ = init("", None);
    }
}

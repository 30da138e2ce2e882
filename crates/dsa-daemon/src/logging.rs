//! Tracing initialisation.

use std::fs::{File, OpenOptions};
use std::path::Path;

use anyhow::{Context, Result};
use dsa_core::config::LogConfig;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Builds the subscriber described by `config` without installing it.
///
/// An invalid filter directive falls back to `info`. When a log file is
/// configured it is opened in append mode and ANSI colours are disabled.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened.
pub fn build_subscriber(config: &LogConfig) -> Result<Box<dyn Subscriber + Send + Sync>> {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(log_file) = &config.file {
        let file = open_log_file(log_file)?;
        Ok(Box::new(
            tracing_subscriber::registry().with(filter).with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            ),
        ))
    } else {
        Ok(Box::new(
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer()),
        ))
    }
}

/// Installs the subscriber described by `config` as the global default.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a global subscriber
/// is already installed.
pub fn init_tracing(config: &LogConfig) -> Result<()> {
    build_subscriber(config)?
        .try_init()
        .context("failed to install tracing subscriber")
}

fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_logging_appends_without_ansi() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dsa.log");
        std::fs::write(&path, "existing line\n").unwrap();

        let config = LogConfig {
            level: "debug".into(),
            file: Some(path.clone()),
        };
        let subscriber = build_subscriber(&config).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(connection_id = "c1", "DSP connection closed");
            tracing::trace!("filtered out");
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("existing line\n"));
        assert!(contents.contains("DSP connection closed"));
        assert!(contents.contains("connection_id=\"c1\""));
        assert!(!contents.contains("filtered out"));
        assert!(!contents.contains('\u{1b}'));
    }

    #[test]
    fn bad_directive_falls_back_to_info() {
        let config = LogConfig {
            level: "not a [valid directive".into(),
            file: None,
        };
        assert!(build_subscriber(&config).is_ok());
    }

    #[test]
    fn unopenable_log_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            level: "info".into(),
            file: Some(dir.path().join("missing").join("dsa.log")),
        };
        let err = build_subscriber(&config).err().unwrap();
        assert!(err.to_string().contains("failed to open log file"));
    }
}

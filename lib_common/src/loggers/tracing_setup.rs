use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter, Layer};

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("invalid log filter directive: {0}")]
    Filter(#[from] ParseError),

    #[error("failed to create log directory {path}: {source}")]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open rolling log file: {0}")]
    Appender(#[from] InitError),

    #[error("a global tracing subscriber is already installed: {0}")]
    Init(#[from] TryInitError),
}

/// # Logger Options
///
/// Controls where and how the service logs.
#[derive(Debug, Clone)]
pub struct LoggerOptions {
    /// Filter used when `RUST_LOG` is not set (e.g. `info` or `lib_common=debug`).
    pub default_directive: String,
    /// Emit console output as JSON lines instead of human-readable text.
    pub json: bool,
    /// When set, also write daily-rolling files into this directory.
    pub log_dir: Option<PathBuf>,
    /// File name prefix for rolling files, usually the binary name.
    pub file_prefix: String,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            default_directive: "info".to_string(),
            json: false,
            log_dir: None,
            file_prefix: "server_slides".to_string(),
        }
    }
}

/// # Initialize Tracing
///
/// Installs the global subscriber: an `EnvFilter` (from `RUST_LOG`, falling
/// back to `default_directive`), a console layer and an optional rolling file
/// layer.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// lifetime of the process.
pub fn init_tracing(options: &LoggerOptions) -> Result<Option<WorkerGuard>, LoggerError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&options.default_directive)?,
    };

    let console = if options.json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let (file_layer, guard) = match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|source| LoggerError::LogDir {
                path: dir.clone(),
                source,
            })?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(&options.file_prefix)
                .filename_suffix("log")
                .build(dir)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .with(filter)
        .try_init()?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_rolling_file_and_refuses_second_install() {
        let dir = tempfile::tempdir().expect("Failed to create temporary directory");
        let options = LoggerOptions {
            default_directive: "debug".to_string(),
            log_dir: Some(dir.path().join("logs")),
            file_prefix: "test_app".to_string(),
            ..LoggerOptions::default()
        };

        let guard = init_tracing(&options).expect("first install succeeds");
        tracing::warn!(code = 101, "This is a warning message");
        drop(guard);

        let files: Vec<_> = std::fs::read_dir(dir.path().join("logs"))
            .expect("log directory exists")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect();
        assert_eq!(files.len(), 1, "expected one rolling file, found {files:?}");

        let name = files[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("test_app"));
        assert!(name.ends_with(".log"));

        let contents = std::fs::read_to_string(&files[0]).unwrap();
        assert!(contents.contains("This is a warning message"));
        assert!(contents.contains("code=101"));

        assert!(matches!(
            init_tracing(&LoggerOptions::default()),
            Err(LoggerError::Init(_))
        ));
    }
}

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::engine::IndexPolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("heartbeat interval must be greater than zero")]
    ZeroHeartbeat,

    #[error("slides pattern must not be empty")]
    EmptyPattern,
}

/// # Sync Service Configuration
///
/// Parsed from command-line arguments with environment variable fallbacks.
/// The binary loads a `.env` file with `dotenvy` before parsing.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[clap(
    author,
    version,
    about = "Keeps a presentation's position in sync across every connected viewer."
)]
#[clap(long_about = None)]
pub struct SyncConfig {
    /// HTTP server port.
    #[clap(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Heartbeat resync period in milliseconds.
    #[clap(long, env = "HEARTBEAT_MS", default_value_t = 1000)]
    pub heartbeat_ms: u64,

    /// Directory holding the slide files that bound the presentation.
    #[clap(long, env = "SLIDES_DIR", default_value = "public/slides")]
    pub slides_dir: PathBuf,

    /// Glob pattern, relative to `slides_dir`, selecting slide files.
    #[clap(long, env = "SLIDES_PATTERN", default_value = "*.*")]
    pub slides_pattern: String,

    /// Directory served as static files.
    #[clap(long, env = "PUBLIC_DIR", default_value = "public")]
    pub public_dir: PathBuf,

    /// Keep the slide index within `[0, max]`.
    #[clap(long, env = "CLAMP_INDEX")]
    pub clamp_index: bool,

    /// Default log filter when `RUST_LOG` is not set.
    #[clap(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit console logs as JSON lines.
    #[clap(long, env = "LOG_JSON")]
    pub log_json: bool,

    /// Also write daily-rolling log files into this directory.
    #[clap(long, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_ms == 0 {
            return Err(ConfigError::ZeroHeartbeat);
        }
        if self.slides_pattern.trim().is_empty() {
            return Err(ConfigError::EmptyPattern);
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn index_policy(&self) -> IndexPolicy {
        if self.clamp_index {
            IndexPolicy::Clamped
        } else {
            IndexPolicy::Unclamped
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            heartbeat_ms: 1000,
            slides_dir: PathBuf::from("public/slides"),
            slides_pattern: "*.*".to_string(),
            public_dir: PathBuf::from("public"),
            clamp_index: false,
            log_level: "info".to_string(),
            log_json: false,
            log_dir: None,
        }
    }
}

//! # Configuration Modules
//!
//! Runtime configuration for the sync service: command-line arguments with
//! environment variable fallbacks, validated before anything starts.

/// Command line / environment configuration and its validation.
pub mod sync_config;

pub use sync_config::{ConfigError, SyncConfig};

//! HopLink Settings
//!
//! File-backed configuration for the tunnel service and the CLI.
//!
//! ## Features
//!
//! - Hop range, idle timeout and simulated jitter
//! - Custom relay catalog (empty means the built-in catalog)
//! - Default log filter
//! - JSON serialization
//!
//! ## Usage
//!
//! ```no_run
//! use hoplink_settings::Settings;
//!
//! // Load or create default settings
//! let mut settings = Settings::load_or_default()?;
//!
//! // Modify settings
//! settings.tunnel.max_hops = 3;
//! settings.validate()?;
//!
//! // Save settings
//! settings.save()?;
//! # Ok::<(), hoplink_settings::SettingsError>(())
//! ```

mod config;

pub use config::{LoggingSettings, Settings, TunnelSettings};

use std::path::PathBuf;

use thiserror::Error;

/// Environment variable that overrides the settings file location
pub const CONFIG_ENV_VAR: &str = "HOPLINK_CONFIG";

/// Settings file name used when no override is given
pub const DEFAULT_CONFIG_FILE: &str = "hoplink.json";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    ReadError(std::io::Error),

    #[error("Failed to write settings: {0}")]
    WriteError(std::io::Error),

    #[error("Failed to parse settings: {0}")]
    ParseError(serde_json::Error),

    #[error("Failed to create config directory: {0}")]
    CreateDirError(std::io::Error),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Get the default settings file path
///
/// `$HOPLINK_CONFIG` if set, otherwise `hoplink.json` in the working directory.
pub fn default_settings_path() -> PathBuf {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_CONFIG_FILE),
    }
}

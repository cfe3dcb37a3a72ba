//! Configuration types

use std::path::{Path, PathBuf};

use hoplink_core::{Relay, RelayCatalog, MAX_HOPS, MIN_HOPS};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{default_settings_path, Result, SettingsError};

/// Main settings structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Tunnel behaviour
    #[serde(default)]
    pub tunnel: TunnelSettings,

    /// Relay catalog. Empty means the built-in catalog.
    #[serde(default)]
    pub relays: Vec<Relay>,

    /// Logging
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Custom settings file path (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tunnel: TunnelSettings::default(),
            relays: Vec::new(),
            logging: LoggingSettings::default(),
            config_path: None,
        }
    }
}

impl Settings {
    /// Load settings from the default path, or create defaults
    pub fn load_or_default() -> Result<Self> {
        Self::load_from(&default_settings_path())
    }

    /// Load settings from a specific path, or create defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(SettingsError::ReadError)?;
            let mut settings: Settings =
                serde_json::from_str(&content).map_err(SettingsError::ParseError)?;
            settings.config_path = Some(path.to_path_buf());
            info!("Loaded settings from {:?}", path);
            Ok(settings)
        } else {
            let mut settings = Self::default();
            settings.config_path = Some(path.to_path_buf());
            Ok(settings)
        }
    }

    /// Path these settings were loaded from, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Save settings to the configured path
    pub fn save(&self) -> Result<()> {
        let path = self.config_path.clone().unwrap_or_else(default_settings_path);
        self.save_to(&path)
    }

    /// Save settings to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(SettingsError::CreateDirError)?;
            }
        }

        let content = serde_json::to_string_pretty(self).map_err(SettingsError::ParseError)?;
        std::fs::write(path, content).map_err(SettingsError::WriteError)?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Check ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        let t = &self.tunnel;
        if t.min_hops < MIN_HOPS {
            return Err(SettingsError::Invalid(format!(
                "min_hops must be at least {}, got {}",
                MIN_HOPS, t.min_hops
            )));
        }
        if t.max_hops > MAX_HOPS {
            return Err(SettingsError::Invalid(format!(
                "max_hops must be at most {}, got {}",
                MAX_HOPS, t.max_hops
            )));
        }
        if t.min_hops > t.max_hops {
            return Err(SettingsError::Invalid(format!(
                "min_hops ({}) exceeds max_hops ({})",
                t.min_hops, t.max_hops
            )));
        }
        if t.jitter_min_ms < 0.0 || t.jitter_min_ms > t.jitter_max_ms {
            return Err(SettingsError::Invalid(format!(
                "invalid jitter range [{}, {})",
                t.jitter_min_ms, t.jitter_max_ms
            )));
        }
        Ok(())
    }

    /// Relay catalog described by these settings. Must hold at least 4 relays.
    pub fn catalog(&self) -> Result<RelayCatalog> {
        if self.relays.is_empty() {
            return Ok(RelayCatalog::default());
        }
        let catalog = RelayCatalog::new(self.relays.clone())
            .map_err(|e| SettingsError::Invalid(e.to_string()))?;
        catalog
            .validate_for(MAX_HOPS)
            .map_err(|e| SettingsError::Invalid(e.to_string()))?;
        Ok(catalog)
    }
}

/// Tunnel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelSettings {
    /// Fewest hops in a route (never below 2)
    #[serde(default = "default_min_hops")]
    pub min_hops: usize,

    /// Most hops in a route
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,

    /// Idle seconds before a tunnel reports unhealthy
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Simulated per-hop processing delay, lower bound (ms)
    #[serde(default = "default_jitter_min")]
    pub jitter_min_ms: f64,

    /// Simulated per-hop processing delay, upper bound (ms, exclusive)
    #[serde(default = "default_jitter_max")]
    pub jitter_max_ms: f64,

    /// Lifecycle events buffered per subscriber
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_min_hops() -> usize {
    2
}

fn default_max_hops() -> usize {
    4
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_jitter_min() -> f64 {
    2.0
}

fn default_jitter_max() -> f64 {
    7.0
}

fn default_event_capacity() -> usize {
    64
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            min_hops: default_min_hops(),
            max_hops: default_max_hops(),
            idle_timeout_secs: default_idle_timeout(),
            jitter_min_ms: default_jitter_min(),
            jitter_max_ms: default_jitter_max(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl TunnelSettings {
    pub fn idle_timeout_ms(&self) -> u64 {
        self.idle_timeout_secs.saturating_mul(1000)
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is unset
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info,hoplink=debug".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("hoplink-settings-{}-{}", std::process::id(), name))
            .join("hoplink.json")
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.tunnel.min_hops, 2);
        assert_eq!(settings.tunnel.max_hops, 4);
        assert_eq!(settings.tunnel.idle_timeout_ms(), 300_000);
        assert!(settings.relays.is_empty());
        assert_eq!(settings.logging.filter, "info,hoplink=debug");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"tunnel":{"max_hops":3}}"#).unwrap();
        assert_eq!(settings.tunnel.max_hops, 3);
        assert_eq!(settings.tunnel.min_hops, 2);
        assert_eq!(settings.tunnel.jitter_max_ms, 7.0);
        assert_eq!(settings.logging.filter, "info,hoplink=debug");
    }

    #[test]
    fn test_settings_serialization() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.tunnel.max_hops, settings.tunnel.max_hops);
        assert!(!json.contains("config_path"));
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let mut settings = Settings::default();
        settings.tunnel.min_hops = 1;
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));

        let mut settings = Settings::default();
        settings.tunnel.min_hops = 4;
        settings.tunnel.max_hops = 3;
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));

        let mut settings = Settings::default();
        settings.tunnel.max_hops = 8;
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));

        let settings: Settings =
            serde_json::from_str(r#"{"tunnel":{"min_hops":8,"max_hops":8}}"#).unwrap();
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));

        let mut settings = Settings::default();
        settings.tunnel.jitter_min_ms = 9.0;
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn test_empty_relays_uses_builtin_catalog() {
        let catalog = Settings::default().catalog().unwrap();
        assert_eq!(catalog.len(), 8);
        assert!(catalog.get("vpn-us-east").is_some());
    }

    #[test]
    fn test_custom_relays() {
        let json = r#"{
            "relays": [
                {"id": "a", "name": "A", "location": "X", "address": "10.0.0.1", "latency_ms": 5},
                {"id": "b", "name": "B", "location": "Y", "address": "10.0.0.2", "latency_ms": 6},
                {"id": "c", "name": "C", "location": "Z", "address": "10.0.0.3", "latency_ms": 7},
                {"id": "d", "name": "D", "location": "W", "address": "10.0.0.4", "latency_ms": 8}
            ]
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        let catalog = settings.catalog().unwrap();
        assert_eq!(catalog.len(), 4);

        let mut dup = settings.clone();
        dup.relays.push(dup.relays[0].clone());
        assert!(matches!(dup.catalog(), Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn test_catalog_below_four_relays_rejected() {
        let mut settings = Settings::default();
        settings.tunnel.min_hops = 2;
        settings.tunnel.max_hops = 2;
        settings.relays = vec![
            Relay::new("a", "A", "X", "10.0.0.1", 1),
            Relay::new("b", "B", "Y", "10.0.0.2", 2),
        ];

        assert!(settings.validate().is_ok());
        assert!(matches!(settings.catalog(), Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = temp_path("missing");
        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.tunnel.max_hops, 4);
        assert_eq!(settings.config_path(), Some(path.as_path()));
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("roundtrip");
        let mut settings = Settings::default();
        settings.tunnel.max_hops = 3;
        settings.logging.filter = "warn".to_string();

        settings.save_to(&path).unwrap();
        let loaded = Settings::load_from(&path).unwrap();

        assert_eq!(loaded.tunnel.max_hops, 3);
        assert_eq!(loaded.logging.filter, "warn");

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_malformed_file() {
        let path = temp_path("malformed");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(Settings::load_from(&path), Err(SettingsError::ParseError(_))));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}

//! Layered configuration.
//!
//! Loaded with `figment` in three layers, each overriding the previous one:
//!
//! 1. built-in defaults ([`UnicamConfig::default`]);
//! 2. the TOML file (`unicam.toml` unless a path is given);
//! 3. environment variables prefixed with `UNICAM_`, nested keys separated by
//!    `__` (`UNICAM_ACQUISITION__QUEUE_DEPTH=16`).
//!
//! ```toml
//! [log]
//! level = "debug"
//! format = "json"
//!
//! [plugins]
//! search_paths = ["/opt/cameras/lib"]
//! include_default_paths = false
//!
//! [acquisition]
//! queue_depth = 4
//! buffer_count = 8
//!
//! [[cameras]]
//! id = "bench"
//! backend = "mock"
//! args = { width = 512, height = 512 }
//! properties = { exposure_time = 0.001, trigger_source = "software" }
//! ```

use crate::acquisition::AcquisitionConfig;
use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "unicam.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "UNICAM_";

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];
const LOG_FORMATS: &[&str] = &["pretty", "compact", "json"];

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnicamConfig {
    /// Logging
    #[serde(default)]
    pub log: LogSettings,
    /// Plugin discovery
    #[serde(default)]
    pub plugins: PluginSettings,
    /// Acquisition engine sizing and timeouts
    #[serde(default)]
    pub acquisition: AcquisitionSettings,
    /// Named camera presets
    #[serde(default)]
    pub cameras: Vec<CameraPreset>,
}

/// `[log]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSettings {
    /// Minimum level when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty`, `compact` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// `[plugins]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Extra directories scanned for camera plugins
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
    /// Also scan the system plugin directories
    #[serde(default = "default_true")]
    pub include_default_paths: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            include_default_paths: true,
        }
    }
}

/// `[acquisition]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    /// Frame channel capacity
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Pooled frame buffers per session
    #[serde(default = "default_buffer_count")]
    pub buffer_count: usize,
    /// Default grab timeout
    #[serde(default = "default_grab_timeout_ms")]
    pub grab_timeout_ms: u64,
    /// Minimum trigger timeout
    #[serde(default = "default_trigger_timeout_ms")]
    pub trigger_timeout_ms: u64,
    /// Grace period for the capture task on stop
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

fn default_queue_depth() -> usize {
    4
}
fn default_buffer_count() -> usize {
    8
}
fn default_grab_timeout_ms() -> u64 {
    5000
}
fn default_trigger_timeout_ms() -> u64 {
    1000
}
fn default_stop_timeout_ms() -> u64 {
    2000
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
            buffer_count: default_buffer_count(),
            grab_timeout_ms: default_grab_timeout_ms(),
            trigger_timeout_ms: default_trigger_timeout_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl AcquisitionSettings {
    /// Engine configuration with durations.
    pub fn to_config(&self) -> AcquisitionConfig {
        AcquisitionConfig {
            queue_depth: self.queue_depth,
            buffer_count: self.buffer_count,
            grab_timeout: Duration::from_millis(self.grab_timeout_ms),
            trigger_timeout: Duration::from_millis(self.trigger_timeout_ms),
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
        }
    }
}

/// A named camera configuration (`[[cameras]]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraPreset {
    /// Preset id, usable wherever a backend name is
    pub id: String,
    /// Registered backend name
    pub backend: String,
    /// Constructor arguments passed to the backend factory
    #[serde(default = "empty_table")]
    pub args: toml::Value,
    /// Property values applied after creation
    #[serde(default)]
    pub properties: BTreeMap<String, toml::Value>,
}

fn empty_table() -> toml::Value {
    toml::Value::Table(toml::Table::new())
}

impl CameraPreset {
    /// Property values rendered as text for `Camera::set_from_str`.
    pub fn property_strings(&self) -> Vec<(String, String)> {
        self.properties
            .iter()
            .map(|(name, value)| {
                let text = match value {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (name.clone(), text)
            })
            .collect()
    }
}

impl UnicamConfig {
    /// Load from `path` (or `unicam.toml`), then the environment, and validate.
    ///
    /// An explicitly given file must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(UnicamConfig::default()));

        match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                figment = figment.merge(Toml::file(path));
            }
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    figment = figment.merge(Toml::file(default));
                }
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
    }

    /// Parse a TOML string (no environment layer), then validate.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(UnicamConfig::default()))
            .merge(Toml::string(text));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: UnicamConfig = figment
            .extract()
            .context("Failed to extract configuration")?;
        config
            .validate()
            .map_err(anyhow::Error::msg)
            .context("Configuration validation failed")?;
        Ok(config)
    }

    /// Check value ranges and cross-field rules.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !LOG_LEVELS.contains(&self.log.level.to_ascii_lowercase().as_str()) {
            return Err(format!(
                "log.level '{}' must be one of {}",
                self.log.level,
                LOG_LEVELS.join(", ")
            ));
        }
        if !LOG_FORMATS.contains(&self.log.format.as_str()) {
            return Err(format!(
                "log.format '{}' must be one of {}",
                self.log.format,
                LOG_FORMATS.join(", ")
            ));
        }

        let acq = &self.acquisition;
        if acq.queue_depth == 0 {
            return Err("acquisition.queue_depth must be at least 1".into());
        }
        if acq.buffer_count <= acq.queue_depth {
            return Err(format!(
                "acquisition.buffer_count ({}) must exceed queue_depth ({})",
                acq.buffer_count, acq.queue_depth
            ));
        }
        for (name, value) in [
            ("grab_timeout_ms", acq.grab_timeout_ms),
            ("trigger_timeout_ms", acq.trigger_timeout_ms),
            ("stop_timeout_ms", acq.stop_timeout_ms),
        ] {
            if value == 0 {
                return Err(format!("acquisition.{} must be non-zero", name));
            }
        }

        let mut ids = HashSet::new();
        for preset in &self.cameras {
            if preset.id.is_empty() || preset.backend.is_empty() {
                return Err("camera presets need both id and backend".into());
            }
            if !ids.insert(preset.id.as_str()) {
                return Err(format!("duplicate camera preset id '{}'", preset.id));
            }
            if !preset.args.is_table() {
                return Err(format!("camera preset '{}': args must be a table", preset.id));
            }
        }
        Ok(())
    }

    /// Preset by id.
    pub fn preset(&self, id: &str) -> Option<&CameraPreset> {
        self.cameras.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults_are_valid() {
        let config = UnicamConfig::default();
        config.validate().unwrap();
        let acq = config.acquisition.to_config();
        assert_eq!(acq, AcquisitionConfig::default());
    }

    #[test]
    fn test_parse_presets() {
        let config = UnicamConfig::from_toml_str(
            r#"
            [acquisition]
            queue_depth = 2
            buffer_count = 3

            [[cameras]]
            id = "bench"
            backend = "mock"
            args = { width = 64, height = 32 }
            properties = { exposure_time = 0.001, trigger_source = "software" }
            "#,
        )
        .unwrap();

        assert_eq!(config.acquisition.queue_depth, 2);
        assert_eq!(config.acquisition.grab_timeout_ms, 5000);
        let preset = config.preset("bench").unwrap();
        assert_eq!(preset.args.get("width").and_then(|v| v.as_integer()), Some(64));
        let props = preset.property_strings();
        assert!(props.contains(&("exposure_time".into(), "0.001".into())));
        assert!(props.contains(&("trigger_source".into(), "software".into())));
    }

    #[test]
    fn test_validation_failures() {
        for text in [
            "[log]\nlevel = \"loud\"",
            "[log]\nformat = \"xml\"",
            "[acquisition]\nqueue_depth = 8\nbuffer_count = 8",
            "[acquisition]\ngrab_timeout_ms = 0",
            "[[cameras]]\nid = \"a\"\nbackend = \"mock\"\n[[cameras]]\nid = \"a\"\nbackend = \"file\"",
        ] {
            assert!(UnicamConfig::from_toml_str(text).is_err(), "accepted: {text}");
        }
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(UnicamConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unicam.toml");
        std::fs::write(&path, "[acquisition]\nqueue_depth = 2\nbuffer_count = 16\n").unwrap();

        std::env::set_var("UNICAM_ACQUISITION__QUEUE_DEPTH", "6");
        let config = UnicamConfig::load(Some(&path));
        std::env::remove_var("UNICAM_ACQUISITION__QUEUE_DEPTH");

        let config = config.unwrap();
        assert_eq!(config.acquisition.queue_depth, 6);
        assert_eq!(config.acquisition.buffer_count, 16);
    }
}

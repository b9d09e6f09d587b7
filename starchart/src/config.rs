//! User configuration file.
//!
//! Settings live in an INI file at `{config_dir}/starchart/config.ini`:
//!
//! ```ini
//! [remote]
//! base_url = https://api.spacetraders.io/v2
//! token =
//! page_size = 20
//! timeout_secs = 30
//!
//! [sync]
//! transient_backoff_ms = 1000
//! on_demand_attempts = 3
//! coalesce_lookups = false
//!
//! [store]
//! directory = ~/.cache/starchart/systems
//!
//! [viewport]
//! min_zoom = 0.05
//! max_zoom = 20
//! locate_duration_ms = 800
//!
//! [logging]
//! file =
//! ```
//!
//! Missing keys take their defaults. Every key is addressable as
//! `section.key` through [`ConfigKey`], which backs both file parsing and the
//! CLI's `config get|set|list` commands.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::Ini;
use thiserror::Error;

use crate::remote::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
use crate::sync::{DEFAULT_ON_DEMAND_ATTEMPTS, DEFAULT_PAGE_SIZE, DEFAULT_TRANSIENT_BACKOFF_MS};
use crate::viewport::{DEFAULT_LOCATE_DURATION_MS, DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM};

/// Application directory name under the platform config and cache roots.
const APP_DIR: &str = "starchart";

/// Configuration file name.
const CONFIG_FILE: &str = "config.ini";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// Directory holding the configuration file.
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Full path of the configuration file.
pub fn config_file_path() -> PathBuf {
    config_directory().join(CONFIG_FILE)
}

/// Default directory for persisted entities.
pub fn default_store_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("systems")
}

/// Format a byte count with a binary unit.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSettings {
    pub base_url: String,
    pub token: Option<String>,
    pub page_size: u32,
    pub timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            page_size: DEFAULT_PAGE_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub transient_backoff_ms: u64,
    pub on_demand_attempts: u32,
    pub coalesce_lookups: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            transient_backoff_ms: DEFAULT_TRANSIENT_BACKOFF_MS,
            on_demand_attempts: DEFAULT_ON_DEMAND_ATTEMPTS,
            coalesce_lookups: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreSettings {
    pub directory: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            directory: default_store_directory(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewportSettings {
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub locate_duration_ms: u64,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self {
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            locate_duration_ms: DEFAULT_LOCATE_DURATION_MS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoggingSettings {
    /// Log file; stderr only when unset.
    pub file: Option<PathBuf>,
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub remote: RemoteSettings,
    pub sync: SyncSettings,
    pub store: StoreSettings,
    pub viewport: ViewportSettings,
    pub logging: LoggingSettings,
}

impl ConfigFile {
    /// Load from the default location. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    /// Build from parsed INI content.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|props| props.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Render as INI, one section per group.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            ini.with_section(Some(key.section()))
                .set(key.key_name(), key.get(self));
        }
        ini
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        self.to_ini().write_to_file(path).map_err(write_err)
    }
}

/// Addressable configuration keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    RemoteBaseUrl,
    RemoteToken,
    RemotePageSize,
    RemoteTimeoutSecs,
    SyncTransientBackoffMs,
    SyncOnDemandAttempts,
    SyncCoalesceLookups,
    StoreDirectory,
    ViewportMinZoom,
    ViewportMaxZoom,
    ViewportLocateDurationMs,
    LoggingFile,
}

fn parse<T: FromStr>(key: ConfigKey, value: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.name(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn parse_positive(key: ConfigKey, value: &str) -> Result<f64, ConfigError> {
    let parsed: f64 = parse(key, value)?;
    if parsed.is_finite() && parsed > 0.0 {
        Ok(parsed)
    } else {
        Err(ConfigError::InvalidValue {
            key: key.name(),
            value: value.to_string(),
            reason: "must be a positive number".to_string(),
        })
    }
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl ConfigKey {
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::RemoteBaseUrl,
            ConfigKey::RemoteToken,
            ConfigKey::RemotePageSize,
            ConfigKey::RemoteTimeoutSecs,
            ConfigKey::SyncTransientBackoffMs,
            ConfigKey::SyncOnDemandAttempts,
            ConfigKey::SyncCoalesceLookups,
            ConfigKey::StoreDirectory,
            ConfigKey::ViewportMinZoom,
            ConfigKey::ViewportMaxZoom,
            ConfigKey::ViewportLocateDurationMs,
            ConfigKey::LoggingFile,
        ]
    }

    /// Full `section.key` name.
    pub fn name(&self) -> &'static str {
        match self {
            ConfigKey::RemoteBaseUrl => "remote.base_url",
            ConfigKey::RemoteToken => "remote.token",
            ConfigKey::RemotePageSize => "remote.page_size",
            ConfigKey::RemoteTimeoutSecs => "remote.timeout_secs",
            ConfigKey::SyncTransientBackoffMs => "sync.transient_backoff_ms",
            ConfigKey::SyncOnDemandAttempts => "sync.on_demand_attempts",
            ConfigKey::SyncCoalesceLookups => "sync.coalesce_lookups",
            ConfigKey::StoreDirectory => "store.directory",
            ConfigKey::ViewportMinZoom => "viewport.min_zoom",
            ConfigKey::ViewportMaxZoom => "viewport.max_zoom",
            ConfigKey::ViewportLocateDurationMs => "viewport.locate_duration_ms",
            ConfigKey::LoggingFile => "logging.file",
        }
    }

    pub fn section(&self) -> &'static str {
        self.name().split_once('.').map_or("", |(section, _)| section)
    }

    pub fn key_name(&self) -> &'static str {
        self.name().split_once('.').map_or("", |(_, key)| key)
    }

    /// Whether the value should be masked when listed.
    pub fn is_secret(&self) -> bool {
        matches!(self, ConfigKey::RemoteToken)
    }

    /// Current value as a string; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::RemoteBaseUrl => config.remote.base_url.clone(),
            ConfigKey::RemoteToken => config.remote.token.clone().unwrap_or_default(),
            ConfigKey::RemotePageSize => config.remote.page_size.to_string(),
            ConfigKey::RemoteTimeoutSecs => config.remote.timeout_secs.to_string(),
            ConfigKey::SyncTransientBackoffMs => config.sync.transient_backoff_ms.to_string(),
            ConfigKey::SyncOnDemandAttempts => config.sync.on_demand_attempts.to_string(),
            ConfigKey::SyncCoalesceLookups => config.sync.coalesce_lookups.to_string(),
            ConfigKey::StoreDirectory => config.store.directory.display().to_string(),
            ConfigKey::ViewportMinZoom => config.viewport.min_zoom.to_string(),
            ConfigKey::ViewportMaxZoom => config.viewport.max_zoom.to_string(),
            ConfigKey::ViewportLocateDurationMs => config.viewport.locate_duration_ms.to_string(),
            ConfigKey::LoggingFile => config
                .logging
                .file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Parse and store `value`.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let key = *self;
        match key {
            ConfigKey::RemoteBaseUrl => {
                config.remote.base_url = optional(value).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
            }
            ConfigKey::RemoteToken => config.remote.token = optional(value),
            ConfigKey::RemotePageSize => {
                let size: u32 = parse(key, value)?;
                if size == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: key.name(),
                        value: value.to_string(),
                        reason: "must be at least 1".to_string(),
                    });
                }
                config.remote.page_size = size;
            }
            ConfigKey::RemoteTimeoutSecs => config.remote.timeout_secs = parse(key, value)?,
            ConfigKey::SyncTransientBackoffMs => config.sync.transient_backoff_ms = parse(key, value)?,
            ConfigKey::SyncOnDemandAttempts => {
                config.sync.on_demand_attempts = parse::<u32>(key, value)?.max(1);
            }
            ConfigKey::SyncCoalesceLookups => config.sync.coalesce_lookups = parse(key, value)?,
            ConfigKey::StoreDirectory => {
                config.store.directory = optional(value)
                    .map(PathBuf::from)
                    .unwrap_or_else(default_store_directory);
            }
            ConfigKey::ViewportMinZoom => config.viewport.min_zoom = parse_positive(key, value)?,
            ConfigKey::ViewportMaxZoom => config.viewport.max_zoom = parse_positive(key, value)?,
            ConfigKey::ViewportLocateDurationMs => {
                config.viewport.locate_duration_ms = parse(key, value)?;
            }
            ConfigKey::LoggingFile => config.logging.file = optional(value).map(PathBuf::from),
        }
        Ok(())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_parse_and_parts() {
        let key: ConfigKey = "sync.coalesce_lookups".parse().unwrap();
        assert_eq!(key, ConfigKey::SyncCoalesceLookups);
        assert_eq!(key.section(), "sync");
        assert_eq!(key.key_name(), "coalesce_lookups");
        assert!("sync.nope".parse::<ConfigKey>().is_err());
    }

    #[test]
    fn test_every_key_round_trips_default() {
        let config = ConfigFile::default();
        for key in ConfigKey::all() {
            let mut copy = ConfigFile::default();
            key.set(&mut copy, &key.get(&config)).unwrap();
            assert_eq!(copy, config, "{}", key);
        }
    }

    #[test]
    fn test_set_rejects_invalid_values() {
        let mut config = ConfigFile::default();
        assert!(ConfigKey::RemotePageSize.set(&mut config, "0").is_err());
        assert!(ConfigKey::RemotePageSize.set(&mut config, "lots").is_err());
        assert!(ConfigKey::ViewportMinZoom.set(&mut config, "-1").is_err());
        assert!(ConfigKey::SyncCoalesceLookups.set(&mut config, "maybe").is_err());
    }

    #[test]
    fn test_empty_token_is_unset() {
        let mut config = ConfigFile::default();
        ConfigKey::RemoteToken.set(&mut config, "abc").unwrap();
        assert_eq!(config.remote.token.as_deref(), Some("abc"));
        ConfigKey::RemoteToken.set(&mut config, "  ").unwrap();
        assert_eq!(config.remote.token, None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = ConfigFile::default();
        config.remote.page_size = 10;
        config.remote.token = Some("secret".to_string());
        config.sync.coalesce_lookups = true;
        config.viewport.max_zoom = 4.5;
        config.logging.file = Some(dir.path().join("starchart.log"));
        config.save_to(&path).unwrap();

        assert_eq!(ConfigFile::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_and_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.ini");
        assert_eq!(ConfigFile::load_from(&missing).unwrap(), ConfigFile::default());

        let partial = dir.path().join(CONFIG_FILE);
        std::fs::write(&partial, "[sync]\non_demand_attempts = 5\n").unwrap();
        let config = ConfigFile::load_from(&partial).unwrap();
        assert_eq!(config.sync.on_demand_attempts, 5);
        assert_eq!(config.remote, RemoteSettings::default());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}

//! Application configuration for StarchartApp.
//!
//! `AppConfig` gathers the per-component configs so the bootstrap can build
//! every component consistently from one value.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{default_store_directory, ConfigFile};
use crate::remote::HttpRemoteConfig;
use crate::sync::SyncConfig;
use crate::viewport::ViewportConfig;

/// Where the entity store persists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreLocation {
    /// Volatile; nothing survives the process.
    Memory,
    /// One JSON document per entity under a directory.
    Disk(PathBuf),
}

/// Application configuration combining all component configs.
#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub remote: HttpRemoteConfig,
    pub sync: SyncConfig,
    pub viewport: ViewportConfig,
    pub store: StoreLocation,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            remote: HttpRemoteConfig::default(),
            sync: SyncConfig::default(),
            viewport: ViewportConfig::default(),
            store: StoreLocation::Disk(default_store_directory()),
        }
    }
}

impl AppConfig {
    /// Create application config from the user's configuration file.
    pub fn from_config_file(config: &ConfigFile) -> Self {
        Self {
            remote: HttpRemoteConfig::default()
                .with_base_url(config.remote.base_url.clone())
                .with_token(config.remote.token.clone())
                .with_timeout(Duration::from_secs(config.remote.timeout_secs)),
            sync: SyncConfig::default()
                .with_page_size(config.remote.page_size)
                .with_transient_backoff(Duration::from_millis(config.sync.transient_backoff_ms))
                .with_on_demand_attempts(config.sync.on_demand_attempts)
                .with_coalesce_lookups(config.sync.coalesce_lookups),
            viewport: ViewportConfig::default()
                .with_zoom_bounds(config.viewport.min_zoom, config.viewport.max_zoom)
                .with_locate_duration(Duration::from_millis(config.viewport.locate_duration_ms)),
            store: StoreLocation::Disk(config.store.directory.clone()),
        }
    }

    /// Keep the store in memory only.
    pub fn with_memory_store(mut self) -> Self {
        self.store = StoreLocation::Memory;
        self
    }

    pub fn with_store_directory(mut self, directory: PathBuf) -> Self {
        self.store = StoreLocation::Disk(directory);
        self
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_file_translates_sections() {
        let mut file = ConfigFile::default();
        file.remote.page_size = 7;
        file.remote.token = Some("t0k3n".to_string());
        file.sync.transient_backoff_ms = 250;
        file.sync.coalesce_lookups = true;
        file.store.directory = PathBuf::from("/data/systems");
        file.viewport.max_zoom = 3.0;

        let config = AppConfig::from_config_file(&file);

        assert_eq!(config.sync.page_size, 7);
        assert_eq!(config.sync.transient_backoff, Duration::from_millis(250));
        assert!(config.sync.coalesce_lookups);
        assert_eq!(config.remote.token.as_deref(), Some("t0k3n"));
        assert_eq!(config.viewport.max_zoom, 3.0);
        assert_eq!(config.store, StoreLocation::Disk(PathBuf::from("/data/systems")));
    }

    #[test]
    fn test_with_memory_store() {
        let config = AppConfig::default().with_memory_store();
        assert_eq!(config.store, StoreLocation::Memory);
    }
}

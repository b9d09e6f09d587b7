//! Common types and utilities shared across CLI commands.

use std::sync::Arc;

use starchart::app::{AppConfig, StarchartApp};
use starchart::config::ConfigFile;
use tokio::runtime::Runtime;

use crate::error::CliError;

/// Options shared by every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalOptions {
    /// Keep the store in memory instead of the configured directory.
    pub no_persist: bool,
}

/// Create the multi-threaded runtime used by async commands.
pub fn runtime() -> Result<Runtime, CliError> {
    Runtime::new().map_err(|e| CliError::Runtime(e.to_string()))
}

/// Translate the configuration file and flags into an app config.
pub fn app_config(config: &ConfigFile, options: GlobalOptions) -> AppConfig {
    let app_config = AppConfig::from_config_file(config);
    if options.no_persist {
        app_config.with_memory_store()
    } else {
        app_config
    }
}

/// Start the application against the configured remote.
pub async fn start_app(options: GlobalOptions) -> Result<Arc<StarchartApp>, CliError> {
    let config = ConfigFile::load()?;
    let app = StarchartApp::start(app_config(&config, options)).await?;
    Ok(Arc::new(app))
}

#[cfg(test)]
mod tests {
    use super::*;
    use starchart::app::StoreLocation;

    #[test]
    fn test_no_persist_selects_memory_store() {
        let config = ConfigFile::default();
        let app = app_config(&config, GlobalOptions { no_persist: true });
        assert_eq!(app.store, StoreLocation::Memory);

        let app = app_config(&config, GlobalOptions::default());
        assert_eq!(app.store, StoreLocation::Disk(config.store.directory.clone()));
    }
}

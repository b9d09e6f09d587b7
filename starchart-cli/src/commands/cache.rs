//! Cache management CLI commands.

use clap::Subcommand;
use starchart::config::{format_size, ConfigFile};
use starchart::store::{DiskBackend, EntityStore};

use super::common::runtime;
use crate::error::CliError;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Remove every cached system
    Clear,
    /// Show store statistics
    Stats,
}

/// Run a cache subcommand.
pub fn run(action: CacheAction) -> Result<(), CliError> {
    let config = ConfigFile::load().unwrap_or_default();
    let directory = config.store.directory;
    let runtime = runtime()?;

    runtime.block_on(async {
        let backend = DiskBackend::open(directory.clone()).await?;
        match action {
            CacheAction::Clear => {
                println!("Clearing store at: {}", directory.display());
                let store = EntityStore::open(std::sync::Arc::new(backend)).await?;
                let removed = store.clear().await?;
                println!("Deleted {} systems", removed);
            }
            CacheAction::Stats => {
                println!("Store: {}", directory.display());
                let (files, bytes) = backend.stats().await?;
                println!("  Systems: {}", files);
                println!("  Size:    {}", format_size(bytes));
            }
        }
        Ok(())
    })
}

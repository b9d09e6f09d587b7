//! Configuration management CLI commands.
//!
//! Provides `config get`, `config set`, `config list`, and `config path` commands
//! for viewing and modifying configuration settings from the command line.

use clap::Subcommand;
use starchart::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Configuration key in format section.key (e.g., remote.page_size)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key in format section.key (e.g., remote.page_size)
        key: String,

        /// Value to set
        value: String,
    },

    /// List all configuration settings
    List,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => run_get(&key),
        ConfigCommands::Set { key, value } => run_set(&key, &value),
        ConfigCommands::List => run_list(),
        ConfigCommands::Path => run_path(),
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'starchart config list' to see available keys.",
            key
        ))
    })
}

fn display_value(key: ConfigKey, value: String) -> String {
    if value.is_empty() {
        "(not set)".to_string()
    } else if key.is_secret() {
        "********".to_string()
    } else {
        value
    }
}

fn run_get(key: &str) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let value = key.get(&ConfigFile::load().unwrap_or_default());
    println!("{}", if value.is_empty() { "(not set)" } else { value.as_str() });
    Ok(())
}

fn run_set(key: &str, value: &str) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let mut config = ConfigFile::load().unwrap_or_default();
    key.set(&mut config, value)?;
    config.save()?;

    // Report the value as stored, after normalization by the setter
    println!("Set {} = {}", key.name(), display_value(key, key.get(&config)));
    Ok(())
}

fn run_list() -> Result<(), CliError> {
    print!("{}", render_settings(&ConfigFile::load().unwrap_or_default()));
    Ok(())
}

/// Settings grouped under `[section]` headers, secrets masked.
fn render_settings(config: &ConfigFile) -> String {
    let mut out = String::from("Configuration Settings\n======================\n");
    let mut section = None;

    for key in ConfigKey::all() {
        if section != Some(key.section()) {
            section = Some(key.section());
            out.push_str(&format!("\n[{}]\n", key.section()));
        }
        out.push_str(&format!(
            "  {} = {}\n",
            key.key_name(),
            display_value(*key, key.get(config))
        ));
    }
    out
}

fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}

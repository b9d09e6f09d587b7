//! CLI subcommands.

pub mod cache;
pub mod common;
pub mod config;
pub mod get;
pub mod query;
pub mod sync;

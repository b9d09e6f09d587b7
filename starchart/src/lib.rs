//! Starchart - spatial entity cache and viewport-driven sync engine
//!
//! This library keeps a local, coordinate-indexed copy of a large paginated
//! remote catalogue of star systems, synchronizes it in the background under
//! rate limits, and reconciles range queries against a pool of rendered
//! objects driven by an interactive camera.
//!
//! # Modules
//!
//! - [`store`]: persistent keyed and coordinate-indexed entity store
//! - [`sync`]: background pagination and cache-first lookups
//! - [`query`]: range queries over the store
//! - [`viewport`]: camera transform, pan/zoom/animated moves
//! - [`render`]: incremental reconciliation into pooled visuals
//! - [`bus`]: typed select/locate/settled messaging
//! - [`session`]: wiring of viewport, query and render pool
//! - [`app`]: component bootstrap and lifecycle

pub mod app;
pub mod bus;
pub mod config;
pub mod entity;
pub mod geometry;
pub mod logging;
pub mod query;
pub mod remote;
pub mod render;
pub mod session;
pub mod store;
pub mod sync;
pub mod viewport;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Terroir: resolve a place to coordinates and derive a soil profile for it.

pub mod config;
pub mod location;
pub mod server;
pub mod session;
pub mod soil;

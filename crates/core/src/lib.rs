//! droidctl core - configuration and shared paths
//!
//! This crate holds the pieces every other droidctl crate agrees on:
//! where the library keeps its files, how the bridge is configured, and
//! the error type for loading and saving that configuration.

pub mod config;
pub mod error;
pub mod paths;

pub use config::BridgeConfig;
pub use error::{CoreError, Result};
pub use paths::LibraryDirs;

/// droidctl version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const APP_NAME: &str = "droidctl";

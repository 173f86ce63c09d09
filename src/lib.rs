// costpatch - mass running-cost patcher for NML train set sources
//
// This is the library crate containing the core services and data structures.
// The binary crate (main.rs) provides the CLI entry point.

pub mod config;
pub mod logging;
pub mod models;
pub mod services;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use models::{CategoryMatcher, CategorySpec, PatchConfig, PatchSettings, RunReport};
pub use services::{PrepareService, RuleEngine, TransformEngine};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

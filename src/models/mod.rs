//! Data models for the costpatch application.
//!
//! This module contains the core data structures used throughout the patcher:
//! - [`PatchConfig`]: Settings and train category definitions loaded from `costpatch.yaml`
//! - [`CategorySpec`] / [`CategoryMatcher`]: Configurable category recognition for the rewrite rules
//! - [`RunReport`]: Aggregate statistics accumulated over a transform pass
//!
//! # Architecture Note
//!
//! The config structs derive `Serialize`/`Deserialize` for YAML persistence.
//! [`RunReport`] is plain process-scoped state: one instance per run, mutated
//! only by the single-threaded transform pass, consumed once for the summary.

pub mod config;
pub mod report;

pub use config::{CategoryMatcher, CategorySpec, PatchConfig, PatchSettings};
pub use report::RunReport;

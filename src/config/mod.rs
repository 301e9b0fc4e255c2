//! Configuration module for curio
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, including the per-archive selector and column maps consumed by the
//! extraction adapters.

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ArchiveConfig, ArchiveKind, ColumnMap, Config, HarvesterConfig, OutputConfig, SelectorMap,
    UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};

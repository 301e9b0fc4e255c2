//! Curio: a polite archive harvester
//!
//! This crate collects structured metadata and maximum-resolution images from
//! heterogeneous digital archives (tabular exports, gallery sites, paginated
//! blogs) and normalizes them into one dataset, respecting per-host rate
//! limits and resuming interrupted runs without duplicating work.

pub mod archives;
pub mod config;
pub mod fetch;
pub mod model;
pub mod pipeline;
pub mod resolve;
pub mod storage;

use thiserror::Error;

/// Main error type for curio operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Seed error for archive '{archive}': {message}")]
    Seed { archive: String, message: String },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid image transition: {from:?} -> {to:?}")]
    InvalidImageTransition {
        from: model::ImageStatus,
        to: model::ImageStatus,
    },

    #[error("Run cancelled before completion")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for curio operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use model::{FetchTask, ImageRef, ImageStatus, Record};
pub use pipeline::{run_harvest, RunSummary};

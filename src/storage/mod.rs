//! Storage module for persisting harvest output
//!
//! This module owns everything the run writes to disk:
//! - The JSONL dataset, one normalized record per line
//! - Content-addressed image files
//! - The SQLite index used for dedup and resume
//!
//! All writes go through [`Persistence`]; no other component touches the
//! output directory.

mod dataset;
mod images;
mod index;
mod persistence;
mod schema;

pub use dataset::{DatasetLine, DatasetWriter};
pub use images::ImageStore;
pub use index::{HarvestIndex, IndexStatistics};
pub use persistence::Persistence;

use crate::model::ImageStatus;
use thiserror::Error;

/// Errors that can occur during storage operations
///
/// Storage failures are fatal to the run: partial output is ambiguous, so
/// the orchestrator aborts rather than continuing past one.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image in state {0} cannot be stored")]
    ImageState(ImageStatus),

    #[error("Image hash {0} not present in index")]
    ImageNotIndexed(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of writing a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// First time this `(archive, source_id)` was seen
    Inserted,

    /// The key already existed; the entry was merged/overwritten
    Updated,
}

/// Outcome of storing image bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    /// A new file was written
    Stored,

    /// Identical bytes were already on disk; nothing written
    Deduplicated,
}

/// Final status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Interrupted,
            RunStatus::Failed,
        ] {
            let db_str = status.to_db_string();
            assert_eq!(RunStatus::from_db_string(db_str), Some(*status));
        }
    }

    #[test]
    fn test_run_status_invalid() {
        assert_eq!(RunStatus::from_db_string("invalid"), None);
    }
}

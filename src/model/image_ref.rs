use crate::{HarvestError, Result};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle status of an image reference
///
/// Transitions are strictly monotonic: Pending -> Resolved -> Downloaded,
/// or -> Failed from any non-terminal state. A status never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageStatus {
    /// Candidate URLs known, nothing confirmed yet
    Pending,

    /// A servable URL has been selected by the resolver
    Resolved,

    /// Bytes fetched, hashed, and stored
    Downloaded,

    /// Neither resolution nor download will be attempted again
    Failed,
}

impl ImageStatus {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Downloaded | Self::Failed)
    }
}

impl fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Downloaded => "downloaded",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One image belonging to a record
#[derive(Debug, Clone)]
pub struct ImageRef {
    /// Known size/quality variants, lowest to highest confidence
    pub candidate_urls: Vec<String>,

    /// URL selected by the resolver, set at most once
    pub resolved_url: Option<String>,

    /// True when resolution fell back to the lowest-confidence candidate
    pub degraded: bool,

    /// SHA-256 of the downloaded bytes (hex)
    pub content_hash: Option<String>,

    /// Storage location, derived from `content_hash`
    pub local_path: Option<PathBuf>,

    /// Current lifecycle status
    pub status: ImageStatus,
}

impl ImageRef {
    /// Creates a pending ref from candidate URLs (lowest -> highest confidence)
    pub fn new(candidate_urls: Vec<String>) -> Self {
        Self {
            candidate_urls,
            resolved_url: None,
            degraded: false,
            content_hash: None,
            local_path: None,
            status: ImageStatus::Pending,
        }
    }

    /// The highest-confidence candidate, if any
    pub fn best_candidate(&self) -> Option<&str> {
        self.candidate_urls.last().map(String::as_str)
    }

    /// The lowest-confidence candidate, used as the degraded fallback
    pub fn fallback_candidate(&self) -> Option<&str> {
        self.candidate_urls.first().map(String::as_str)
    }

    /// Marks the ref resolved with the selected URL
    pub fn mark_resolved(&mut self, url: String, degraded: bool) -> Result<()> {
        if self.status != ImageStatus::Pending {
            return Err(self.invalid_transition(ImageStatus::Resolved));
        }
        self.resolved_url = Some(url);
        self.degraded = degraded;
        self.status = ImageStatus::Resolved;
        Ok(())
    }

    /// Marks the ref downloaded with its content hash and storage path
    pub fn mark_downloaded(&mut self, content_hash: String, local_path: PathBuf) -> Result<()> {
        if self.status != ImageStatus::Resolved {
            return Err(self.invalid_transition(ImageStatus::Downloaded));
        }
        self.content_hash = Some(content_hash);
        self.local_path = Some(local_path);
        self.status = ImageStatus::Downloaded;
        Ok(())
    }

    /// Marks the ref failed; valid from any non-terminal state
    pub fn mark_failed(&mut self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.invalid_transition(ImageStatus::Failed));
        }
        self.status = ImageStatus::Failed;
        Ok(())
    }

    fn invalid_transition(&self, to: ImageStatus) -> HarvestError {
        HarvestError::InvalidImageTransition {
            from: self.status,
            to,
        }
    }
}

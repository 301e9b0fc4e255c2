//! Extraction adapters, one variant per archive shape
//!
//! Adapters turn fetched bytes into normalized records, image references,
//! and follow-up fetch tasks. They are pure with respect to their input:
//! no adapter performs network I/O, so every variant is testable against
//! canned fixtures. Site-specific structure (CSS selectors, column names)
//! comes from the archive's configuration, not from code.

mod blog;
mod csv_export;
mod gallery;

pub use blog::BlogAdapter;
pub use csv_export::CsvExportAdapter;
pub use gallery::GalleryAdapter;

use crate::config::{ArchiveConfig, ArchiveKind};
use crate::fetch::FetchedPage;
use crate::model::{FetchTask, Record, TaskRole};
use scraper::Selector;
use thiserror::Error;
use url::Url;

/// Errors raised while extracting structure from a fetched page
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Page structure mismatch at {url}: {message}")]
    Mismatch { url: String, message: String },

    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("Tabular parse error: {0}")]
    Tabular(#[from] csv::Error),
}

/// Result type for adapter operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Context handed to an adapter alongside the fetched bytes
pub struct ParseContext<'a> {
    /// The archive this page belongs to, including its selector/column maps
    pub archive: &'a ArchiveConfig,

    /// URL the page was fetched from; base for resolving relative links
    pub url: Url,

    /// Whether this page was fetched as a listing or a detail page
    pub role: TaskRole,
}

/// Everything one parsed page produced
#[derive(Debug, Default)]
pub struct ParseOutput {
    /// Normalized records, image refs attached
    pub records: Vec<Record>,

    /// Further pages to fetch (pagination, detail pages)
    pub follow_ups: Vec<FetchTask>,

    /// Input rows/items skipped for missing essentials (counted, not fatal)
    pub skipped: u32,
}

/// The polymorphic adapter interface
///
/// Implementations must not perform I/O; the orchestrator mediates all
/// fetching through the scheduler.
pub trait Adapter: Send + Sync {
    fn parse(&self, page: &FetchedPage, ctx: &ParseContext<'_>) -> ParseResult<ParseOutput>;
}

/// Dispatches an archive kind to its adapter variant
pub fn adapter_for(kind: ArchiveKind) -> Box<dyn Adapter> {
    match kind {
        ArchiveKind::CsvExport => Box::new(CsvExportAdapter),
        ArchiveKind::Gallery => Box::new(GalleryAdapter),
        ArchiveKind::Blog => Box::new(BlogAdapter),
    }
}

/// Parses a configured CSS selector, mapping failures to a typed error
pub(crate) fn parse_selector(selector: &str) -> ParseResult<Selector> {
    Selector::parse(selector).map_err(|e| ParseError::Selector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

/// Builds a stable, filesystem-safe slug from free text
///
/// Lowercases, keeps alphanumerics and dots, folds everything else into
/// single hyphens, and truncates to 100 characters.
pub fn slug(text: &str) -> String {
    let mut out = String::new();
    let mut last_was_hyphen = true; // suppress leading hyphens
    for c in text.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || c == '.' {
            out.push(c);
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            out.push('-');
            last_was_hyphen = true;
        }
        if out.len() >= 100 {
            break;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Resolves a possibly-relative href against a base, keeping only http(s)
pub(crate) fn resolve_link(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("data:")
    {
        return None;
    }
    let resolved = base.join(href).ok()?;
    if resolved.scheme() == "http" || resolved.scheme() == "https" {
        Some(resolved)
    } else {
        None
    }
}

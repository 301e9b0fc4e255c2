use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for curio
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub harvester: HarvesterConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "archive")]
    pub archives: Vec<ArchiveConfig>,
}

/// Harvester behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HarvesterConfig {
    /// Maximum number of simultaneous in-flight requests across all hosts
    #[serde(rename = "concurrency-limit")]
    pub concurrency_limit: u32,

    /// Minimum time between requests to the same host (milliseconds)
    #[serde(rename = "per-host-min-interval")]
    pub per_host_min_interval: u64,

    /// Maximum number of retries for a failed fetch
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff (milliseconds)
    #[serde(rename = "backoff-base", default = "default_backoff_base")]
    pub backoff_base: u64,

    /// Ceiling on the backoff delay (milliseconds)
    #[serde(rename = "backoff-cap", default = "default_backoff_cap")]
    pub backoff_cap: u64,

    /// How long in-flight tasks may finish after cancellation (milliseconds)
    #[serde(rename = "grace-period", default = "default_grace_period")]
    pub grace_period: u64,

    /// Optional wall-clock deadline for the whole run (seconds)
    #[serde(default)]
    pub deadline: Option<u64>,
}

fn default_backoff_base() -> u64 {
    500
}

fn default_backoff_cap() -> u64 {
    30_000
}

fn default_grace_period() -> u64 {
    5_000
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the harvester
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the harvester
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the harvester
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for harvester-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving the dataset, image store and index
    #[serde(rename = "output-dir")]
    pub output_dir: String,
}

/// One configured archive source
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Archive name, used as the record namespace
    pub name: String,

    /// Which adapter variant handles this archive
    pub kind: ArchiveKind,

    /// Base URL of the archive site
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Seed: a listing URL, or a local tabular file path for csv-export
    pub seed: String,

    /// Declarative page structure (gallery and blog kinds)
    #[serde(default)]
    pub selectors: SelectorMap,

    /// Declarative column mapping (csv-export kind)
    #[serde(default)]
    pub columns: Option<ColumnMap>,
}

/// Adapter variant selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveKind {
    /// Rows of a downloaded tabular export (CSV)
    CsvExport,
    /// Category index fanning out to gallery pages of captioned images
    Gallery,
    /// Paginated blog with per-post detail pages
    Blog,
}

impl ArchiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CsvExport => "csv-export",
            Self::Gallery => "gallery",
            Self::Blog => "blog",
        }
    }
}

/// CSS selectors describing an archive's page structure
///
/// Which fields are required depends on the archive kind; validation
/// enforces the per-kind minimum.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectorMap {
    /// Gallery: one gallery item
    #[serde(default)]
    pub item: Option<String>,

    /// Gallery: anchor wrapping the full-resolution image inside an item
    #[serde(rename = "image-link", default)]
    pub image_link: Option<String>,

    /// Gallery/blog: caption element
    #[serde(default)]
    pub caption: Option<String>,

    /// Gallery: path fragments excluded when collecting category links
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Blog: anchor linking a listing entry to its post page
    #[serde(rename = "post-link", default)]
    pub post_link: Option<String>,

    /// Blog: anchor to the next (older) listing page
    #[serde(rename = "next-page", default)]
    pub next_page: Option<String>,

    /// Blog: post title element
    #[serde(default)]
    pub title: Option<String>,

    /// Blog: post body container
    #[serde(default)]
    pub body: Option<String>,

    /// Blog: image elements inside the body
    #[serde(default)]
    pub image: Option<String>,

    /// Blog: tag anchors
    #[serde(default)]
    pub tag: Option<String>,
}

/// Column mapping for tabular exports
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnMap {
    /// Column holding the archive-native identifier
    pub id: String,

    /// Column holding the title
    #[serde(default)]
    pub title: Option<String>,

    /// Column holding the description
    #[serde(default)]
    pub description: Option<String>,

    /// Column holding the image URL
    pub image: String,

    /// Further columns carried over as attributes: column name -> attribute key
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

use url::Url;

/// What a fetch task is retrieving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// An archive page (listing or detail), fetched with GET
    Page,

    /// An image-service information descriptor (info.json), fetched with GET
    Descriptor,

    /// A lightweight existence probe, fetched with HEAD
    Probe,

    /// Image bytes, fetched with GET
    Image,
}

/// How the adapter should interpret a fetched page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskRole {
    /// A listing/index page that fans out to further pages
    Listing,

    /// A detail page (or row set) that yields records
    Detail,
}

/// A unit of scheduled network work
#[derive(Debug, Clone)]
pub struct FetchTask {
    /// Target URL
    pub url: Url,

    /// Rate-limit key derived from the URL authority
    pub host: String,

    /// Number of retries performed so far (0 on the first try)
    pub attempt: u32,

    /// Dispatch priority, lower is sooner
    pub priority: u32,

    /// Name of the archive this task belongs to
    pub archive: String,

    pub kind: TaskKind,
    pub role: TaskRole,
}

impl FetchTask {
    /// Creates a task with the default priority for its kind and role
    pub fn new(url: Url, archive: impl Into<String>, kind: TaskKind, role: TaskRole) -> Self {
        let priority = match (kind, role) {
            (TaskKind::Page, TaskRole::Listing) => 0,
            (TaskKind::Descriptor, _) | (TaskKind::Probe, _) => 5,
            (TaskKind::Page, TaskRole::Detail) => 10,
            (TaskKind::Image, _) => 20,
        };
        let host = host_key(&url);
        Self {
            url,
            host,
            attempt: 0,
            priority,
            archive: archive.into(),
            kind,
            role,
        }
    }
}

/// Derives the rate-limit key for a URL: host, plus port when non-default
pub fn host_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}
